use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stalink_connectivity::pno::PnoRequest;
use stalink_connectivity::{ConfigStore, ScanData, ScanProvider, ScanRequest, ScanResult};
use stalink_daemon::store::JsonConfigStore;
use stalink_daemon::{Daemon, DaemonConfig, DaemonEvent};
use stalink_supplicant::channel::{ChannelResult, SimAuthResponse};
use stalink_supplicant::qos::{MscsParams, QosPolicyScsData, QosPolicyStatus};
use stalink_supplicant::{
    AuthFailureReason, ChannelError, Clock, DaemonCallback, DeathRecipient, InterfaceHandle,
    SecurityType, SessionChannel, Ssid, StaState, SupplicantEvent, WifiConfig,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};

#[derive(Default)]
struct FakeClock(AtomicU64);

impl Clock for FakeClock {
    fn elapsed_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ChannelState {
    calls: Vec<String>,
    networks: Vec<i32>,
    next_id: i32,
    fail_version: bool,
}

#[derive(Default)]
struct FakeChannel {
    state: Mutex<ChannelState>,
}

impl FakeChannel {
    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl SessionChannel for FakeChannel {
    fn negotiate_version(&self) -> ChannelResult<u32> {
        self.record("negotiateVersion".into());
        if self.state.lock().unwrap().fail_version {
            return Err(ChannelError::transport("negotiateVersion", "no socket"));
        }
        Ok(2)
    }

    fn link_to_death(&self, generation: u64, _recipient: Arc<dyn DeathRecipient>) -> ChannelResult<()> {
        self.record(format!("linkToDeath:{generation}"));
        Ok(())
    }

    fn add_sta_interface(&self, name: &str) -> ChannelResult<Option<InterfaceHandle>> {
        self.record(format!("addStaInterface:{name}"));
        Ok(Some(InterfaceHandle {
            name: name.to_string(),
            remote_ref: 1,
        }))
    }

    fn remove_interface(&self, name: &str) -> ChannelResult<()> {
        self.record(format!("removeInterface:{name}"));
        Ok(())
    }

    fn register_callback(&self, iface: &InterfaceHandle) -> ChannelResult<()> {
        self.record(format!("registerCallback:{}", iface.name));
        Ok(())
    }

    fn list_networks(&self, _iface: &str) -> ChannelResult<Vec<i32>> {
        Ok(self.state.lock().unwrap().networks.clone())
    }

    fn add_network(&self, _iface: &str) -> ChannelResult<Option<i32>> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.networks.push(id);
        state.calls.push(format!("addNetwork:{id}"));
        Ok(Some(id))
    }

    fn remove_network(&self, _iface: &str, network_id: i32) -> ChannelResult<()> {
        let mut state = self.state.lock().unwrap();
        state.networks.retain(|id| *id != network_id);
        state.calls.push(format!("removeNetwork:{network_id}"));
        Ok(())
    }

    fn save_network(&self, _iface: &str, network_id: i32, _config: &WifiConfig, ssid: &Ssid) -> ChannelResult<()> {
        self.record(format!("saveNetwork:{network_id}:{ssid}"));
        Ok(())
    }

    fn select_network(&self, _iface: &str, network_id: i32) -> ChannelResult<()> {
        self.record(format!("selectNetwork:{network_id}"));
        Ok(())
    }

    fn enable_network(&self, _iface: &str, network_id: i32, _no_connect: bool) -> ChannelResult<()> {
        self.record(format!("enableNetwork:{network_id}"));
        Ok(())
    }

    fn disable_network(&self, _iface: &str, network_id: i32) -> ChannelResult<()> {
        self.record(format!("disableNetwork:{network_id}"));
        Ok(())
    }

    fn set_bssid(&self, _iface: &str, network_id: i32, bssid: &str) -> ChannelResult<()> {
        self.record(format!("setBssid:{network_id}:{bssid}"));
        Ok(())
    }

    fn set_pmk_cache(&self, _iface: &str, network_id: i32, _blob: &[u8]) -> ChannelResult<()> {
        self.record(format!("setPmkCache:{network_id}"));
        Ok(())
    }

    fn set_anonymous_identity(&self, _iface: &str, network_id: i32, _identity: &str) -> ChannelResult<()> {
        self.record(format!("setAnonymousIdentity:{network_id}"));
        Ok(())
    }

    fn reassociate(&self, _iface: &str) -> ChannelResult<()> {
        self.record("reassociate".into());
        Ok(())
    }

    fn reconnect(&self, _iface: &str) -> ChannelResult<()> {
        self.record("reconnect".into());
        Ok(())
    }

    fn disconnect(&self, _iface: &str) -> ChannelResult<()> {
        self.record("disconnect".into());
        Ok(())
    }

    fn cancel_wps(&self, _iface: &str) -> ChannelResult<()> {
        Ok(())
    }

    fn send_eap_identity_response(
        &self,
        _iface: &str,
        _network_id: i32,
        _identity: &str,
        _encrypted_identity: Option<&[u8]>,
    ) -> ChannelResult<()> {
        Ok(())
    }

    fn send_sim_auth_response(&self, _iface: &str, _network_id: i32, _response: &SimAuthResponse) -> ChannelResult<()> {
        Ok(())
    }

    fn add_qos_policies(&self, _iface: &str, _policies: &[QosPolicyScsData]) -> ChannelResult<Vec<QosPolicyStatus>> {
        Ok(Vec::new())
    }

    fn remove_qos_policies(&self, _iface: &str, _policy_ids: &[u8]) -> ChannelResult<Vec<QosPolicyStatus>> {
        Ok(Vec::new())
    }

    fn remove_all_qos_policies(&self, _iface: &str) -> ChannelResult<()> {
        Ok(())
    }

    fn send_qos_policy_response(
        &self,
        _iface: &str,
        _request_id: i32,
        _more_policies: bool,
        _statuses: &[QosPolicyStatus],
    ) -> ChannelResult<()> {
        Ok(())
    }

    fn configure_mscs(&self, _iface: &str, _params: &MscsParams) -> ChannelResult<()> {
        Ok(())
    }

    fn disable_mscs(&self, _iface: &str) -> ChannelResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeScanner {
    requests: Mutex<Vec<ScanRequest>>,
}

impl ScanProvider for FakeScanner {
    fn start_scan(&self, request: &ScanRequest) -> stalink_connectivity::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn start_pno_scan(&self, _request: &PnoRequest) -> stalink_connectivity::Result<()> {
        Ok(())
    }

    fn stop_pno_scan(&self) {}
}

struct Harness {
    daemon: Daemon,
    rx: UnboundedReceiver<DaemonEvent>,
    channel: Arc<FakeChannel>,
    scanner: Arc<FakeScanner>,
    clock: Arc<FakeClock>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_network(WifiConfig::new(1, "home", SecurityType::Psk))
    }

    fn with_network(network: WifiConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DaemonConfig::from_env();
        config.root_path = dir.path().to_path_buf();
        config.iface = "wlan0".into();
        config.screen_on = true;
        config.reinit_delay = Duration::from_millis(500);
        config.engine.partial_initial_scan = false;
        config.engine.set_target_bssid = true;

        let clock = Arc::new(FakeClock::default());
        let store = Arc::new(JsonConfigStore::load(config.networks_path(), clock.clone()).unwrap());
        store.upsert_network(network);

        let channel = Arc::new(FakeChannel::default());
        let scanner = Arc::new(FakeScanner::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon = Daemon::build(
            config,
            channel.clone(),
            scanner.clone(),
            store,
            clock.clone(),
            Handle::current(),
            tx,
        );
        Self {
            daemon,
            rx,
            channel,
            scanner,
            clock,
            _dir: dir,
        }
    }

    /// Applies every queued event, including those the handlers post.
    fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            assert!(self.daemon.handle_event(event));
        }
    }

    fn scan(&mut self, results: Vec<ScanResult>) {
        assert!(self.daemon.handle_event(DaemonEvent::ScanResults(ScanData {
            results,
            full_band: true,
        })));
        self.drain();
    }

    /// Waits for the next [`DaemonEvent::Reinitialize`], applying anything
    /// queued ahead of it.
    async fn reinitialize_when_due(&mut self) {
        loop {
            match self.rx.recv().await {
                Some(DaemonEvent::Reinitialize) => break,
                Some(other) => {
                    self.daemon.handle_event(other);
                }
                None => panic!("event queue closed"),
            }
        }
        assert!(self.daemon.handle_event(DaemonEvent::Reinitialize));
        self.drain();
    }

    fn callback(&mut self, callback: DaemonCallback) {
        assert!(self.daemon.handle_event(DaemonEvent::Callback {
            iface: "wlan0".into(),
            callback,
        }));
        self.drain();
    }
}

fn home(bssid: &str, rssi: i32) -> ScanResult {
    ScanResult {
        ssid: Ssid::from("home"),
        bssid: bssid.into(),
        frequency_mhz: 5180,
        rssi_dbm: rssi,
        security: vec![SecurityType::Psk],
    }
}

#[tokio::test]
async fn bring_up_scans_and_connects_to_best_candidate() {
    let mut h = Harness::new();
    assert!(h.daemon.handle_event(DaemonEvent::Reinitialize));
    h.drain();

    assert!(h.daemon.session().has_iface("wlan0"));
    assert!(h.daemon.engine().is_running());
    assert!(!h.scanner.requests.lock().unwrap().is_empty());

    h.scan(vec![home("aa:00:00:00:00:01", -70), home("aa:00:00:00:00:02", -50)]);
    assert_eq!(h.channel.count("addNetwork"), 1);
    assert!(h.channel.calls().contains(&"saveNetwork:0:home".to_string()));
    let client = h.daemon.clients().get("wlan0").unwrap();
    assert_eq!(client.connecting.map(|c| c.network_id), Some(1));

    h.callback(DaemonCallback::StateChanged {
        state: StaState::Completed,
        bssid: Some("aa:00:00:00:00:02".into()),
        remote_network_id: 0,
        ssid: Ssid::from("home"),
    });
    let client = h.daemon.clients().get("wlan0").unwrap();
    assert_eq!(client.connected.map(|c| c.network_id), Some(1));
    assert_eq!(client.connected_bssid.as_deref(), Some("aa:00:00:00:00:02"));
    assert!(client.connecting.is_none());
}

#[tokio::test]
async fn auth_failure_blocks_bssid_and_retries_next_candidate() {
    let mut h = Harness::new();
    h.daemon.handle_event(DaemonEvent::Reinitialize);
    h.drain();
    h.scan(vec![home("aa:00:00:00:00:01", -70), home("aa:00:00:00:00:02", -50)]);
    assert_eq!(h.channel.count("addNetwork"), 1);

    assert!(h.daemon.handle_event(DaemonEvent::Supplicant(
        SupplicantEvent::AuthenticationFailure {
            iface: "wlan0".into(),
            network_id: 1,
            reason: AuthFailureReason::Timeout,
            error_code: -1,
            bssid: Some("aa:00:00:00:00:02".into()),
        }
    )));
    h.drain();
    let now = h.clock.elapsed_ms();
    assert!(h.daemon.engine().blocklist().is_blocked("aa:00:00:00:00:02", now));
    // A timeout does not walk the candidate list.
    assert_eq!(h.channel.count("addNetwork"), 1);

    h.daemon.handle_event(DaemonEvent::Supplicant(SupplicantEvent::AssociationRejection {
        iface: "wlan0".into(),
        network_id: 1,
        info: stalink_supplicant::events::AssocRejectInfo {
            ssid: "home".into(),
            bssid: Some("aa:00:00:00:00:01".into()),
            status_code: 17,
            timed_out: false,
            oce_rssi_reject: None,
            mbo_disallowed: None,
        },
    }));
    h.drain();
    assert!(h.daemon.engine().blocklist().is_blocked("aa:00:00:00:00:01", now));
}

#[tokio::test]
async fn not_found_after_fallback_ssids_ends_the_attempt() {
    let mut network = WifiConfig::new(1, "home", SecurityType::Psk);
    network.alternate_ssids = vec![Ssid::from("home-alt")];
    let mut h = Harness::with_network(network);
    h.daemon.handle_event(DaemonEvent::Reinitialize);
    h.drain();
    h.scan(vec![home("aa:00:00:00:00:01", -50)]);
    assert_eq!(h.channel.count("addNetwork"), 1);

    let not_found = || DaemonCallback::NetworkNotFound {
        ssid: Ssid::from("home"),
    };
    h.clock.0.fetch_add(2_000, Ordering::SeqCst);
    h.callback(not_found());
    assert!(h
        .channel
        .calls()
        .contains(&"saveNetwork:1:home-alt".to_string()));
    assert!(h.daemon.clients().get("wlan0").unwrap().connecting.is_some());

    // The list wraps back to the first SSID and the failure is reported.
    h.clock.0.fetch_add(2_000, Ordering::SeqCst);
    h.callback(not_found());
    assert_eq!(h.channel.count("addNetwork"), 3);
    assert!(h.daemon.clients().get("wlan0").unwrap().connecting.is_none());
}

#[tokio::test(start_paused = true)]
async fn supplicant_death_disables_then_reinitializes() {
    let mut h = Harness::new();
    h.daemon.handle_event(DaemonEvent::Reinitialize);
    h.drain();
    let generation = h.daemon.session().generation();

    h.daemon.handle_event(DaemonEvent::ChannelDied { generation });
    h.drain();
    assert!(!h.daemon.session().is_initialization_complete());
    assert!(!h.daemon.engine().is_running());

    // A stale report for the old generation changes nothing.
    h.daemon.handle_event(DaemonEvent::ChannelDied { generation });
    h.drain();

    h.reinitialize_when_due().await;
    assert!(h.daemon.session().is_initialization_complete());
    assert_eq!(h.daemon.session().generation(), generation + 1);
    assert!(h.daemon.engine().is_running());
    assert_eq!(h.channel.count("addStaInterface"), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_bring_up_is_retried() {
    let mut h = Harness::new();
    h.channel.state.lock().unwrap().fail_version = true;
    h.daemon.handle_event(DaemonEvent::Reinitialize);
    assert!(!h.daemon.engine().is_running());

    h.channel.state.lock().unwrap().fail_version = false;
    h.reinitialize_when_due().await;
    assert!(h.daemon.engine().is_running());
}

#[tokio::test]
async fn shutdown_stops_the_loop_and_tears_down() {
    let mut h = Harness::new();
    h.daemon.handle_event(DaemonEvent::Reinitialize);
    h.drain();

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(DaemonEvent::Shutdown).unwrap();
    let channel = h.channel.clone();
    let daemon = h.daemon;
    tokio::task::spawn_blocking(move || daemon.run_blocking(rx))
        .await
        .unwrap();
    assert_eq!(channel.count("removeInterface:wlan0"), 1);
}

#[test]
fn store_is_visible_to_engine_adapters() {
    let dir = tempfile::tempdir().unwrap();
    let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
    let store = JsonConfigStore::load(dir.path().join("networks.json"), clock).unwrap();
    store.upsert_network(WifiConfig::new(4, "lab", SecurityType::Sae));
    assert_eq!(store.configured_network(4).map(|c| c.ssid), Some(Ssid::from("lab")));
}
