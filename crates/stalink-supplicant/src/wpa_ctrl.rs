//! [`SessionChannel`] over the wpa_supplicant control sockets.
//!
//! Interface commands go to `<ctrl_dir>/<iface>`, interface lifecycle and
//! liveness to the global control socket. Socket errors are reported as
//! [`ChannelError::Transport`]; `FAIL` answers as [`ChannelError::Rejected`].

use std::fs;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{distributions::Alphanumeric, Rng};
use stalink_logging::targets::T_SUPPLICANT;
use tracing::{debug, warn};

use crate::channel::{
    ChannelError, ChannelResult, DeathRecipient, InterfaceHandle, SessionChannel, SimAuthResponse,
    STATUS_UNSUPPORTED,
};
use crate::events::{BssidChangeReason, DaemonCallback, StaState, EAP_ERROR_NONE};
use crate::qos::{MscsParams, QosPolicyScsData, QosPolicyStatus};
use crate::records::{SecurityType, Ssid, WifiConfig, SUPPLICANT_BSSID_ANY};

pub const DEFAULT_CTRL_DIR: &str = "/run/wpa_supplicant";
pub const DEFAULT_GLOBAL_CTRL: &str = "/run/wpa_supplicant-global";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status code carried by `FAIL` answers.
pub const STATUS_FAILURE: i32 = 1;

const RECV_BUF_LEN: usize = 65535;
const MAX_UNSOLICITED: usize = 5;

struct LocalSocketCleanup {
    path: PathBuf,
}

impl Drop for LocalSocketCleanup {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn build_local_socket_path(label: &str) -> PathBuf {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let label: String = label.chars().take(16).collect();
    std::env::temp_dir().join(format!("stalink_wpa_{label}_{suffix}"))
}

/// Bind a private datagram socket and connect it to `target`.
fn open_socket(
    op: &'static str,
    label: &str,
    target: &Path,
    timeout: Duration,
) -> ChannelResult<(UnixDatagram, LocalSocketCleanup)> {
    if !target.exists() {
        return Err(ChannelError::transport(
            op,
            format!("control socket {} not found", target.display()),
        ));
    }
    let local_path = build_local_socket_path(label);
    if local_path.exists() {
        let _ = fs::remove_file(&local_path);
    }
    let socket = UnixDatagram::bind(&local_path)
        .map_err(|e| ChannelError::transport(op, format!("bind {}: {e}", local_path.display())))?;
    let cleanup = LocalSocketCleanup { path: local_path };

    socket
        .connect(target)
        .map_err(|e| ChannelError::transport(op, format!("connect {}: {e}", target.display())))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| ChannelError::transport(op, format!("read timeout: {e}")))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| ChannelError::transport(op, format!("write timeout: {e}")))?;
    Ok((socket, cleanup))
}

fn send_on(socket: &UnixDatagram, op: &'static str, command: &str) -> ChannelResult<String> {
    let sent = socket
        .send(command.as_bytes())
        .map_err(|e| ChannelError::transport(op, format!("send: {e}")))?;
    if sent != command.len() {
        return Err(ChannelError::transport(
            op,
            format!("short write ({sent} of {} bytes)", command.len()),
        ));
    }

    let mut buf = vec![0u8; RECV_BUF_LEN];
    for _ in 0..MAX_UNSOLICITED {
        let n = socket
            .recv(&mut buf)
            .map_err(|e| ChannelError::transport(op, format!("recv: {e}")))?;
        if n == 0 {
            continue;
        }
        let response = String::from_utf8_lossy(&buf[..n]).trim().to_string();
        // Unsolicited event on an attached socket.
        if response.starts_with('<') {
            continue;
        }
        if response.starts_with("UNKNOWN COMMAND") {
            return Err(ChannelError::rejected(op, STATUS_UNSUPPORTED));
        }
        if response.starts_with("FAIL") {
            return Err(ChannelError::rejected(op, STATUS_FAILURE));
        }
        return Ok(response);
    }
    Err(ChannelError::transport(op, "no response"))
}

fn expect_ok(op: &'static str, response: String) -> ChannelResult<()> {
    if response == "OK" {
        Ok(())
    } else {
        Err(ChannelError::transport(op, format!("unexpected answer '{response}'")))
    }
}

/// Scan entry from `SCAN_RESULTS`.
#[derive(Debug, Clone, PartialEq)]
pub struct BssEntry {
    pub bssid: String,
    pub frequency_mhz: u32,
    pub level_dbm: i32,
    pub flags: String,
    pub ssid: String,
}

impl BssEntry {
    /// Strongest security advertised in the flags column.
    pub fn security(&self) -> SecurityType {
        security_from_flags(&self.flags)
    }
}

pub fn security_from_flags(flags: &str) -> SecurityType {
    if flags.contains("EAP-SUITE-B-192") {
        SecurityType::EapSuiteB192
    } else if flags.contains("EAP") {
        SecurityType::Eap
    } else if flags.contains("SAE") {
        SecurityType::Sae
    } else if flags.contains("PSK") {
        SecurityType::Psk
    } else if flags.contains("OWE") {
        SecurityType::Owe
    } else if flags.contains("WEP") {
        SecurityType::Wep
    } else {
        SecurityType::Open
    }
}

pub struct WpaCtrlChannel {
    ctrl_dir: PathBuf,
    global_path: PathBuf,
    timeout: Duration,
    next_ref: AtomicU64,
    death: Mutex<Option<(u64, Arc<dyn DeathRecipient>)>>,
}

impl WpaCtrlChannel {
    pub fn new(ctrl_dir: impl Into<PathBuf>, global_path: impl Into<PathBuf>) -> Self {
        Self {
            ctrl_dir: ctrl_dir.into(),
            global_path: global_path.into(),
            timeout: DEFAULT_TIMEOUT,
            next_ref: AtomicU64::new(1),
            death: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn iface_path(&self, iface: &str) -> PathBuf {
        self.ctrl_dir.join(iface)
    }

    fn iface_command(&self, op: &'static str, iface: &str, command: &str) -> ChannelResult<String> {
        let (socket, _cleanup) = open_socket(op, iface, &self.iface_path(iface), self.timeout)?;
        send_on(&socket, op, command)
    }

    fn iface_ok(&self, op: &'static str, iface: &str, command: &str) -> ChannelResult<()> {
        let response = self.iface_command(op, iface, command)?;
        expect_ok(op, response)
    }

    fn global_command(&self, op: &'static str, command: &str) -> ChannelResult<String> {
        let (socket, _cleanup) = open_socket(op, "global", &self.global_path, self.timeout)?;
        send_on(&socket, op, command)
    }

    /// Ping the global socket; on transport failure the linked recipient is
    /// notified once.
    pub fn check_liveness(&self) -> bool {
        match self.global_command("ping", "PING") {
            Ok(response) if response == "PONG" => true,
            Ok(response) => {
                debug!(target: T_SUPPLICANT, response = %response, "wpa_ping_unexpected");
                true
            }
            Err(err) if err.is_transport() => {
                warn!(target: T_SUPPLICANT, error = %err, "wpa_supplicant_unreachable");
                let linked = self.death.lock().map(|mut slot| slot.take()).unwrap_or(None);
                if let Some((generation, recipient)) = linked {
                    recipient.channel_died(generation);
                }
                false
            }
            Err(_) => true,
        }
    }

    /// Trigger a scan. An empty `frequencies` list scans every channel.
    pub fn scan(&self, iface: &str, frequencies: &[u32]) -> ChannelResult<()> {
        self.iface_ok("scan", iface, &scan_command(frequencies))
    }

    pub fn scan_results(&self, iface: &str) -> ChannelResult<Vec<BssEntry>> {
        let response = self.iface_command("scanResults", iface, "SCAN_RESULTS")?;
        Ok(parse_scan_results(&response))
    }

    fn set_network(&self, iface: &str, id: i32, var: &str, value: &str) -> ChannelResult<()> {
        debug!(target: T_SUPPLICANT, iface = %iface, net_id = id, var, "wpa_set_network");
        self.iface_ok("setNetwork", iface, &format!("SET_NETWORK {id} {var} {value}"))
    }
}

pub fn scan_command(frequencies: &[u32]) -> String {
    if frequencies.is_empty() {
        return "SCAN".to_string();
    }
    let list: Vec<String> = frequencies.iter().map(u32::to_string).collect();
    format!("SCAN freq={}", list.join(","))
}

pub fn parse_scan_results(response: &str) -> Vec<BssEntry> {
    response
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                return None;
            }
            Some(BssEntry {
                bssid: fields[0].to_string(),
                frequency_mhz: fields[1].parse().ok()?,
                level_dbm: fields[2].parse().ok()?,
                flags: fields[3].to_string(),
                ssid: fields[4].to_string(),
            })
        })
        .collect()
}

fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

fn ssid_value(ssid: &Ssid) -> String {
    let printable = ssid
        .as_bytes()
        .iter()
        .all(|b| b.is_ascii_graphic() || *b == b' ')
        && !ssid.as_bytes().contains(&b'"');
    if printable {
        quoted(&ssid.to_string())
    } else {
        ssid.to_hex()
    }
}

fn psk_value(psk: &str) -> String {
    if psk.len() == 64 && psk.chars().all(|c| c.is_ascii_hexdigit()) {
        psk.to_string()
    } else {
        quoted(psk)
    }
}

/// `SET_NETWORK` variables for `config`, advertised as `ssid`.
pub fn network_commands(config: &WifiConfig, ssid: &Ssid) -> Vec<(&'static str, String)> {
    let security = config.effective_security().unwrap_or(SecurityType::Open);
    let creds = &config.credentials;
    let mut vars = vec![("ssid", ssid_value(ssid))];
    if config.hidden {
        vars.push(("scan_ssid", "1".to_string()));
    }
    vars.push(("key_mgmt", security.key_mgmt().to_string()));

    match security {
        SecurityType::Psk | SecurityType::WapiPsk => {
            if let Some(psk) = &creds.psk {
                vars.push(("psk", psk_value(psk)));
            }
        }
        SecurityType::Sae => {
            if let Some(password) = creds.sae_password.as_ref().or(creds.psk.as_ref()) {
                vars.push(("sae_password", quoted(password)));
            }
            vars.push(("ieee80211w", "2".to_string()));
        }
        SecurityType::Owe => vars.push(("ieee80211w", "2".to_string())),
        SecurityType::Wep => {
            for (idx, key) in creds.wep_keys.iter().enumerate().take(4) {
                let name = match idx {
                    0 => "wep_key0",
                    1 => "wep_key1",
                    2 => "wep_key2",
                    _ => "wep_key3",
                };
                vars.push((name, quoted(key)));
            }
            if !creds.wep_keys.is_empty() {
                vars.push(("wep_tx_keyidx", "0".to_string()));
            }
        }
        _ => {}
    }

    if let Some(eap) = &creds.eap {
        vars.push(("eap", eap.method.as_str().to_string()));
        if let Some(identity) = &eap.identity {
            vars.push(("identity", quoted(identity)));
        }
        if let Some(anonymous) = &eap.anonymous_identity {
            vars.push(("anonymous_identity", quoted(anonymous)));
        }
        if let Some(password) = &eap.password {
            vars.push(("password", quoted(password)));
        }
        if let Some(ca_cert) = &eap.ca_cert {
            vars.push(("ca_cert", quoted(ca_cert)));
        }
    }

    if let Some(bssid) = &config.selection_bssid {
        if bssid != SUPPLICANT_BSSID_ANY {
            vars.push(("bssid", bssid.clone()));
        }
    }
    vars
}

fn parse_version(response: &str) -> u32 {
    let mut parts = response.trim().split('.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts
        .next()
        .and_then(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>().parse().ok())
        .unwrap_or(0);
    major * 100 + minor
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl SessionChannel for WpaCtrlChannel {
    fn negotiate_version(&self) -> ChannelResult<u32> {
        let pong = self.global_command("negotiateVersion", "PING")?;
        if pong != "PONG" {
            return Err(ChannelError::transport(
                "negotiateVersion",
                format!("unexpected ping answer '{pong}'"),
            ));
        }
        match self.global_command("negotiateVersion", "GET version") {
            Ok(version) => Ok(parse_version(&version)),
            Err(ChannelError::Rejected { .. }) => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn link_to_death(&self, generation: u64, recipient: Arc<dyn DeathRecipient>) -> ChannelResult<()> {
        let mut slot = self
            .death
            .lock()
            .map_err(|_| ChannelError::transport("linkToDeath", "death slot poisoned"))?;
        *slot = Some((generation, recipient));
        Ok(())
    }

    fn add_sta_interface(&self, name: &str) -> ChannelResult<Option<InterfaceHandle>> {
        let command = format!(
            "INTERFACE_ADD {name}\t\tnl80211\t{}",
            self.ctrl_dir.display()
        );
        match self.global_command("addStaInterface", &command) {
            Ok(_) => {}
            // Already managed by the daemon.
            Err(ChannelError::Rejected { .. }) => {
                let list = self.global_command("addStaInterface", "INTERFACE_LIST")?;
                if !list.lines().any(|line| line.trim() == name) {
                    return Ok(None);
                }
            }
            Err(err) => return Err(err),
        }
        Ok(Some(InterfaceHandle {
            name: name.to_string(),
            remote_ref: self.next_ref.fetch_add(1, Ordering::Relaxed),
        }))
    }

    fn remove_interface(&self, name: &str) -> ChannelResult<()> {
        let response = self.global_command("removeInterface", &format!("INTERFACE_REMOVE {name}"))?;
        expect_ok("removeInterface", response)
    }

    fn register_callback(&self, iface: &InterfaceHandle) -> ChannelResult<()> {
        let response = self.iface_command("registerCallback", &iface.name, "PING")?;
        if response == "PONG" {
            Ok(())
        } else {
            Err(ChannelError::transport("registerCallback", format!("unexpected answer '{response}'")))
        }
    }

    fn list_networks(&self, iface: &str) -> ChannelResult<Vec<i32>> {
        let response = self.iface_command("listNetworks", iface, "LIST_NETWORKS")?;
        Ok(response
            .lines()
            .skip(1)
            .filter_map(|line| line.split('\t').next()?.trim().parse().ok())
            .collect())
    }

    fn add_network(&self, iface: &str) -> ChannelResult<Option<i32>> {
        let response = self.iface_command("addNetwork", iface, "ADD_NETWORK")?;
        Ok(response.trim().parse().ok())
    }

    fn remove_network(&self, iface: &str, network_id: i32) -> ChannelResult<()> {
        self.iface_ok("removeNetwork", iface, &format!("REMOVE_NETWORK {network_id}"))
    }

    fn save_network(
        &self,
        iface: &str,
        network_id: i32,
        config: &WifiConfig,
        ssid: &Ssid,
    ) -> ChannelResult<()> {
        for (var, value) in network_commands(config, ssid) {
            self.set_network(iface, network_id, var, &value)?;
        }
        Ok(())
    }

    fn select_network(&self, iface: &str, network_id: i32) -> ChannelResult<()> {
        self.iface_ok("select", iface, &format!("SELECT_NETWORK {network_id}"))
    }

    fn enable_network(&self, iface: &str, network_id: i32, no_connect: bool) -> ChannelResult<()> {
        let command = if no_connect {
            format!("ENABLE_NETWORK {network_id} no-connect")
        } else {
            format!("ENABLE_NETWORK {network_id}")
        };
        self.iface_ok("enableNetwork", iface, &command)
    }

    fn disable_network(&self, iface: &str, network_id: i32) -> ChannelResult<()> {
        self.iface_ok("disableNetwork", iface, &format!("DISABLE_NETWORK {network_id}"))
    }

    fn set_bssid(&self, iface: &str, network_id: i32, bssid: &str) -> ChannelResult<()> {
        let bssid = if bssid == SUPPLICANT_BSSID_ANY {
            "00:00:00:00:00:00"
        } else {
            bssid
        };
        self.iface_ok("setBssid", iface, &format!("BSSID {network_id} {bssid}"))
    }

    /// `blob` holds the `PMKSA_ADD` arguments that follow the network id.
    fn set_pmk_cache(&self, iface: &str, network_id: i32, blob: &[u8]) -> ChannelResult<()> {
        let entry = String::from_utf8_lossy(blob);
        self.iface_ok("setPmkCache", iface, &format!("PMKSA_ADD {network_id} {entry}"))
    }

    fn set_anonymous_identity(&self, iface: &str, network_id: i32, identity: &str) -> ChannelResult<()> {
        self.set_network(iface, network_id, "anonymous_identity", &quoted(identity))
    }

    fn reassociate(&self, iface: &str) -> ChannelResult<()> {
        self.iface_ok("reassociate", iface, "REASSOCIATE")
    }

    fn reconnect(&self, iface: &str) -> ChannelResult<()> {
        self.iface_ok("reconnect", iface, "RECONNECT")
    }

    fn disconnect(&self, iface: &str) -> ChannelResult<()> {
        self.iface_ok("disconnect", iface, "DISCONNECT")
    }

    fn cancel_wps(&self, iface: &str) -> ChannelResult<()> {
        self.iface_ok("cancelWps", iface, "WPS_CANCEL")
    }

    fn send_eap_identity_response(
        &self,
        iface: &str,
        network_id: i32,
        identity: &str,
        _encrypted_identity: Option<&[u8]>,
    ) -> ChannelResult<()> {
        self.iface_ok(
            "identityResponse",
            iface,
            &format!("CTRL-RSP-IDENTITY-{network_id}:{identity}"),
        )
    }

    fn send_sim_auth_response(
        &self,
        iface: &str,
        network_id: i32,
        response: &SimAuthResponse,
    ) -> ChannelResult<()> {
        let body = match response {
            SimAuthResponse::Gsm { kc_sres } => {
                let pairs: Vec<String> = kc_sres
                    .iter()
                    .map(|(kc, sres)| format!("{}:{}", hex(kc), hex(sres)))
                    .collect();
                format!("GSM-AUTH:{}", pairs.join(":"))
            }
            SimAuthResponse::UmtsAuth { ik, ck, res } => {
                format!("UMTS-AUTH:{}:{}:{}", hex(ik), hex(ck), hex(res))
            }
            SimAuthResponse::UmtsAuts { auts } => format!("UMTS-AUTS:{}", hex(auts)),
            SimAuthResponse::UmtsFailure => "UMTS-FAIL".to_string(),
        };
        self.iface_ok("simResponse", iface, &format!("CTRL-RSP-SIM-{network_id}:{body}"))
    }

    fn add_qos_policies(&self, _iface: &str, _policies: &[QosPolicyScsData]) -> ChannelResult<Vec<QosPolicyStatus>> {
        Err(ChannelError::rejected("addQosPolicies", STATUS_UNSUPPORTED))
    }

    fn remove_qos_policies(&self, _iface: &str, _policy_ids: &[u8]) -> ChannelResult<Vec<QosPolicyStatus>> {
        Err(ChannelError::rejected("removeQosPolicies", STATUS_UNSUPPORTED))
    }

    fn remove_all_qos_policies(&self, _iface: &str) -> ChannelResult<()> {
        Err(ChannelError::rejected("removeAllQosPolicies", STATUS_UNSUPPORTED))
    }

    fn send_qos_policy_response(
        &self,
        _iface: &str,
        _request_id: i32,
        _more_policies: bool,
        _statuses: &[QosPolicyStatus],
    ) -> ChannelResult<()> {
        Err(ChannelError::rejected("qosPolicyResponse", STATUS_UNSUPPORTED))
    }

    fn configure_mscs(&self, iface: &str, params: &MscsParams) -> ChannelResult<()> {
        let command = format!(
            "MSCS add up_bitmap={:02x} up_limit={} stream_timeout={} frame_classifier=04{:02x}",
            params.user_priority_bitmap,
            params.user_priority_limit,
            params.stream_timeout_us,
            params.frame_classifier_mask
        );
        self.iface_ok("configureMscs", iface, &command)
    }

    fn disable_mscs(&self, iface: &str) -> ChannelResult<()> {
        self.iface_ok("disableMscs", iface, "MSCS remove")
    }
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_whitespace()
        .find_map(|token| token.strip_prefix(key)?.strip_prefix('='))
}

fn strip_level(line: &str) -> &str {
    match line.strip_prefix('<').and_then(|rest| rest.split_once('>')) {
        Some((_, rest)) => rest,
        None => line,
    }
}

/// Decode one unsolicited control-socket line.
pub fn parse_event(line: &str) -> Option<DaemonCallback> {
    let line = strip_level(line.trim());

    if let Some(rest) = line.strip_prefix("CTRL-EVENT-DISCONNECTED") {
        return Some(DaemonCallback::Disconnected {
            bssid: field(rest, "bssid").map(str::to_string),
            locally_generated: field(rest, "locally_generated") == Some("1"),
            reason: field(rest, "reason")?.parse().ok()?,
        });
    }
    if let Some(rest) = line.strip_prefix("CTRL-EVENT-ASSOC-REJECT") {
        return Some(DaemonCallback::AssociationRejected {
            ssid: Ssid::default(),
            bssid: field(rest, "bssid").map(str::to_string),
            status_code: field(rest, "status_code")?.parse().ok()?,
            timed_out: rest.split_whitespace().any(|t| t == "timeout"),
            oce_rssi_reject: None,
            mbo_disallowed: None,
        });
    }
    if let Some(rest) = line.strip_prefix("CTRL-EVENT-STATE-CHANGE") {
        let code: u8 = field(rest, "state")?.parse().ok()?;
        return Some(DaemonCallback::StateChanged {
            state: StaState::from_wpa_code(code)?,
            bssid: field(rest, "BSSID")
                .filter(|b| *b != "00:00:00:00:00:00")
                .map(str::to_string),
            remote_network_id: field(rest, "id").and_then(|id| id.parse().ok()).unwrap_or(-1),
            ssid: field(rest, "SSID").map(Ssid::from).unwrap_or_default(),
        });
    }
    if let Some(rest) = line.strip_prefix("CTRL-EVENT-NETWORK-NOT-FOUND") {
        return Some(DaemonCallback::NetworkNotFound {
            ssid: field(rest, "ssid").map(Ssid::from).unwrap_or_default(),
        });
    }
    if line.starts_with("CTRL-EVENT-EAP-FAILURE") {
        return Some(DaemonCallback::EapFailure {
            bssid: None,
            error_code: EAP_ERROR_NONE,
        });
    }
    if let Some(rest) = line.strip_prefix("CTRL-EVENT-NETWORK-REMOVED") {
        return Some(DaemonCallback::NetworkRemoved {
            remote_network_id: rest.trim().parse().ok()?,
        });
    }
    if let Some(rest) = line.strip_prefix("CTRL-EVENT-CHANNEL-SWITCH") {
        return Some(DaemonCallback::BssFrequencyChanged {
            frequency_mhz: field(rest, "freq")?.parse().ok()?,
        });
    }
    if let Some(rest) = line.strip_prefix("CTRL-EVENT-CONNECTED - Connection to ") {
        return Some(DaemonCallback::BssidChanged {
            reason: BssidChangeReason::AssocComplete,
            bssid: rest.split_whitespace().next()?.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("Trying to associate with ") {
        return Some(DaemonCallback::BssidChanged {
            reason: BssidChangeReason::AssocStart,
            bssid: rest.split_whitespace().next()?.to_string(),
        });
    }
    if let Some(rest) = line.strip_prefix("Authentication with ") {
        if rest.ends_with("timed out.") {
            return Some(DaemonCallback::AuthenticationTimeout {
                bssid: rest.split_whitespace().next().map(str::to_string),
            });
        }
    }
    if let Some(rest) = line.strip_prefix("CTRL-REQ-IDENTITY-") {
        let (id, _) = rest.split_once(':')?;
        return Some(DaemonCallback::EapIdentityRequest {
            remote_network_id: id.parse().ok()?,
        });
    }
    None
}

/// Attached monitor socket for one interface.
pub struct WpaEventMonitor {
    socket: UnixDatagram,
    _cleanup: LocalSocketCleanup,
}

impl WpaEventMonitor {
    /// `poll` bounds each blocking receive.
    pub fn attach(ctrl_dir: &Path, iface: &str, poll: Duration) -> ChannelResult<Self> {
        let (socket, cleanup) = open_socket("attach", iface, &ctrl_dir.join(iface), poll)?;
        let response = send_on(&socket, "attach", "ATTACH")?;
        expect_ok("attach", response)?;
        Ok(Self {
            socket,
            _cleanup: cleanup,
        })
    }

    /// Next decoded callback. `Ok(None)` on poll timeout or an event we do
    /// not translate.
    pub fn next_event(&self) -> ChannelResult<Option<DaemonCallback>> {
        let mut buf = vec![0u8; RECV_BUF_LEN];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                let line = String::from_utf8_lossy(&buf[..n]);
                Ok(parse_event(&line))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(ChannelError::transport("monitor", err.to_string())),
        }
    }
}

impl Drop for WpaEventMonitor {
    fn drop(&mut self) {
        let _ = self.socket.send(b"DETACH");
    }
}
