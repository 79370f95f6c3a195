//! One supplicant session: interface lifecycle, network reconciliation and
//! translation of daemon callbacks into [`SupplicantEvent`]s.
//!
//! The session is driven from a single serialized event queue. Death
//! notifications arrive through [`SupplicantSession::on_channel_death`] like
//! any other event.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stalink_logging::targets::T_SUPPLICANT;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, ChannelResult, DeathRecipient, InterfaceHandle, SessionChannel};
use crate::classify::{
    classify_auth_timeout, classify_disconnect, CallbackTracker, DisconnectSuppression,
    RejectionPolicy,
};
use crate::clock::Clock;
use crate::error::{Result, SupplicantError};
use crate::events::{
    AssocRejectInfo, AuthFailureReason, BssidChangeReason, DaemonCallback, EventSink, StaState,
    SupplicantEvent, EAP_ERROR_NONE,
};
use crate::qos::{validate_scs_policies, MscsParams, QosPolicyScsData, QosPolicyStatus};
use crate::records::{
    InterfaceRecords, NetworkRecord, PmkCache, PmkCacheEntry, SecurityType, Ssid, WifiConfig,
    INVALID_NETWORK_ID, SUPPLICANT_BSSID_ANY,
};
use crate::sim;

pub const DEFAULT_NOT_FOUND_IGNORE_WINDOW_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Network-not-found reports this soon after a connect are ignored.
    pub not_found_ignore_window_ms: u64,
    pub disconnect_suppression: DisconnectSuppression,
    pub rejection_policy: RejectionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            not_found_ignore_window_ms: DEFAULT_NOT_FOUND_IGNORE_WINDOW_MS,
            disconnect_suppression: DisconnectSuppression::default(),
            rejection_policy: RejectionPolicy::default(),
        }
    }
}

pub type DeathHandler = Box<dyn FnMut() + Send>;

#[derive(Debug, Default)]
struct FallbackSsids {
    ssids: Vec<Ssid>,
    index: usize,
}

struct IfaceSession {
    handle: InterfaceHandle,
    records: InterfaceRecords,
    tracker: CallbackTracker,
    last_connect_ms: Option<u64>,
    fallback: FallbackSsids,
    mscs: Option<MscsParams>,
}

impl IfaceSession {
    fn new(handle: InterfaceHandle) -> Self {
        Self {
            handle,
            records: InterfaceRecords::default(),
            tracker: CallbackTracker::default(),
            last_connect_ms: None,
            fallback: FallbackSsids::default(),
            mscs: None,
        }
    }
}

/// Snapshot of the current network used while classifying callbacks.
struct CurrentInfo {
    network_id: i32,
    security: Option<SecurityType>,
    ever_connected: bool,
    ssid: Option<String>,
}

pub struct SupplicantSession {
    channel: Arc<dyn SessionChannel>,
    sink: Arc<dyn EventSink>,
    recipient: Arc<dyn DeathRecipient>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    init_started: bool,
    initialized: bool,
    version: Option<u32>,
    generation: u64,
    /// Generation whose death has already been handled.
    death_reported: Option<u64>,
    death_handler: Option<DeathHandler>,
    ifaces: HashMap<String, IfaceSession>,
    pmk_cache: PmkCache,
}

impl SupplicantSession {
    pub fn new(
        channel: Arc<dyn SessionChannel>,
        sink: Arc<dyn EventSink>,
        recipient: Arc<dyn DeathRecipient>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            channel,
            sink,
            recipient,
            clock,
            config,
            init_started: false,
            initialized: false,
            version: None,
            generation: 0,
            death_reported: None,
            death_handler: None,
            ifaces: HashMap::new(),
            pmk_cache: PmkCache::default(),
        }
    }

    // ---- lifecycle ----

    /// Connect to the daemon and link to its death. Already initialized is a
    /// success; a failed handshake is not retried here.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.init_started = true;
        let version = match self.channel.negotiate_version() {
            Ok(version) => version,
            Err(err) => {
                warn!(target: T_SUPPLICANT, error = %err, "supplicant_version_negotiation_failed");
                self.init_started = false;
                return Err(err.into());
            }
        };

        self.generation += 1;
        if let Err(err) = self
            .channel
            .link_to_death(self.generation, Arc::clone(&self.recipient))
        {
            warn!(target: T_SUPPLICANT, error = %err, "supplicant_link_to_death_failed");
            self.init_started = false;
            return Err(err.into());
        }

        self.version = Some(version);
        self.initialized = true;
        info!(
            target: T_SUPPLICANT,
            version,
            generation = self.generation,
            "supplicant_session_initialized"
        );
        Ok(())
    }

    pub fn is_initialization_started(&self) -> bool {
        self.init_started
    }

    pub fn is_initialization_complete(&self) -> bool {
        self.initialized
    }

    pub fn interface_version(&self) -> Option<u32> {
        self.version
    }

    /// Generation of the current death link; death reports for other
    /// generations are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn register_death_handler(&mut self, handler: DeathHandler) {
        if self.death_handler.replace(handler).is_some() {
            info!(target: T_SUPPLICANT, "supplicant_death_handler_replaced");
        }
    }

    pub fn deregister_death_handler(&mut self) -> bool {
        self.death_handler.take().is_some()
    }

    /// Process a liveness loss. Runs the death handler once per linked
    /// generation, even if a transport failure already cleared the state;
    /// stale or repeated notifications are ignored.
    pub fn on_channel_death(&mut self, generation: u64) {
        if generation == 0 || generation != self.generation {
            debug!(
                target: T_SUPPLICANT,
                generation,
                current = self.generation,
                "supplicant_stale_death_ignored"
            );
            return;
        }
        if self.death_reported == Some(generation) {
            debug!(target: T_SUPPLICANT, generation, "supplicant_repeated_death_ignored");
            return;
        }
        self.death_reported = Some(generation);
        warn!(target: T_SUPPLICANT, generation, "supplicant_died");
        self.clear_state();
        if let Some(handler) = self.death_handler.as_mut() {
            handler();
        }
    }

    pub fn setup_iface(&mut self, name: &str) -> Result<()> {
        self.require_initialized()?;
        if self.ifaces.contains_key(name) {
            return Err(SupplicantError::InterfaceExists {
                name: name.to_string(),
            });
        }

        let result = self.channel.add_sta_interface(name);
        let handle = self.check(result)?.ok_or_else(|| SupplicantError::NullHandle {
            iface: name.to_string(),
            op: "addStaInterface",
        })?;

        let result = self.channel.register_callback(&handle);
        self.check(result)?;

        info!(target: T_SUPPLICANT, iface = %name, remote = handle.remote_ref, "sta_iface_setup");
        self.ifaces.insert(name.to_string(), IfaceSession::new(handle));
        Ok(())
    }

    pub fn teardown_iface(&mut self, name: &str) -> Result<()> {
        self.iface(name)?;
        let result = self.channel.remove_interface(name);
        self.check(result)?;
        self.ifaces.remove(name);
        info!(target: T_SUPPLICANT, iface = %name, "sta_iface_teardown");
        Ok(())
    }

    pub fn has_iface(&self, name: &str) -> bool {
        self.ifaces.contains_key(name)
    }

    pub fn iface_handle(&self, name: &str) -> Option<&InterfaceHandle> {
        self.ifaces.get(name).map(|state| &state.handle)
    }

    fn clear_state(&mut self) {
        self.initialized = false;
        self.init_started = false;
        self.version = None;
        self.ifaces.clear();
    }

    // ---- helpers ----

    fn require_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(SupplicantError::NotInitialized)
        }
    }

    fn iface(&self, name: &str) -> Result<&IfaceSession> {
        self.ifaces
            .get(name)
            .ok_or_else(|| SupplicantError::InterfaceNotFound {
                name: name.to_string(),
            })
    }

    fn iface_mut(&mut self, name: &str) -> Result<&mut IfaceSession> {
        self.ifaces
            .get_mut(name)
            .ok_or_else(|| SupplicantError::InterfaceNotFound {
                name: name.to_string(),
            })
    }

    fn current(&self, iface: &str) -> Result<&NetworkRecord> {
        self.iface(iface)?
            .records
            .current()
            .ok_or_else(|| SupplicantError::NoCurrentNetwork {
                iface: iface.to_string(),
            })
    }

    fn current_remote_id(&self, iface: &str) -> Result<i32> {
        self.current(iface).map(|record| record.remote_id)
    }

    fn note_channel_error(&mut self, err: &ChannelError) {
        if err.is_transport() {
            warn!(target: T_SUPPLICANT, error = %err, "supplicant_transport_failure");
            self.clear_state();
        } else {
            debug!(target: T_SUPPLICANT, error = %err, "supplicant_call_rejected");
        }
    }

    /// Transport failures invalidate the whole session without running the
    /// death handler.
    fn check<T>(&mut self, result: ChannelResult<T>) -> Result<T> {
        result.map_err(|err| {
            self.note_channel_error(&err);
            SupplicantError::Channel(err)
        })
    }

    fn step<T>(&mut self, iface: &str, step: &'static str, result: ChannelResult<T>) -> Result<T> {
        result.map_err(|err| {
            self.note_channel_error(&err);
            SupplicantError::Reconciliation {
                iface: iface.to_string(),
                step,
                source: err,
            }
        })
    }

    fn current_info(&self, iface: &str) -> CurrentInfo {
        match self.ifaces.get(iface).and_then(|state| state.records.current()) {
            Some(record) => CurrentInfo {
                network_id: record.framework_id(),
                security: record.security(),
                ever_connected: record.ever_connected(),
                ssid: Some(record.config.ssid.to_string()),
            },
            None => CurrentInfo {
                network_id: INVALID_NETWORK_ID,
                security: None,
                ever_connected: false,
                ssid: None,
            },
        }
    }

    fn publish(&self, event: SupplicantEvent) {
        self.sink.publish(event);
    }

    // ---- reconciliation ----

    /// Make the supplicant's network table mirror `config` and select it.
    ///
    /// `actual_ssid` forces the advertised name and always replaces the
    /// remote network.
    pub fn connect_to_network(
        &mut self,
        iface: &str,
        config: &WifiConfig,
        actual_ssid: Option<Ssid>,
    ) -> Result<()> {
        info!(
            target: T_SUPPLICANT,
            iface = %iface,
            net_id = config.network_id,
            ssid = %config.ssid,
            "connect_network_start"
        );
        let state = self.iface(iface)?;
        let same = actual_ssid.is_none()
            && state
                .records
                .current()
                .map(|current| config.is_same_network(&current.config))
                .unwrap_or(false);

        if same {
            self.update_current_in_place(iface, config)?;
        } else {
            self.replace_current_network(iface, config, actual_ssid)?;
        }

        let (remote_id, network_id, security) = {
            let current = self.current(iface)?;
            (current.remote_id, current.framework_id(), current.security())
        };
        if security.map(SecurityType::supports_pmk_cache).unwrap_or(false) {
            self.push_pmk_cache(iface, remote_id, network_id)?;
        }

        let result = self.channel.select_network(iface, remote_id);
        self.step(iface, "select", result)?;

        let now = self.clock.elapsed_ms();
        self.iface_mut(iface)?.last_connect_ms = Some(now);
        info!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, remote_id, "connect_network_selected");
        Ok(())
    }

    fn update_current_in_place(&mut self, iface: &str, config: &WifiConfig) -> Result<()> {
        let (remote_id, unchanged) = {
            let current = self.current(iface)?;
            (
                current.remote_id,
                current.config.selection_bssid == config.selection_bssid,
            )
        };
        if unchanged {
            debug!(target: T_SUPPLICANT, iface = %iface, "network_already_saved");
            return Ok(());
        }

        let bssid = config
            .selection_bssid
            .clone()
            .unwrap_or_else(|| SUPPLICANT_BSSID_ANY.to_string());
        let result = self.channel.set_bssid(iface, remote_id, &bssid);
        self.step(iface, "setBssid", result)?;

        if let Some(current) = self.iface_mut(iface)?.records.current_mut() {
            current.config = config.clone();
        }
        debug!(target: T_SUPPLICANT, iface = %iface, bssid = %bssid, "network_bssid_updated");
        Ok(())
    }

    fn replace_current_network(
        &mut self,
        iface: &str,
        config: &WifiConfig,
        actual_ssid: Option<Ssid>,
    ) -> Result<()> {
        {
            let state = self.iface_mut(iface)?;
            state.records.clear_current();
            state.records.clear_linked();
        }
        self.remove_all_networks(iface)?;

        let ssid = match actual_ssid {
            Some(ssid) => ssid,
            None => {
                let all = config.all_ssids();
                let chosen = all[0].clone();
                let state = self.iface_mut(iface)?;
                state.fallback = FallbackSsids::default();
                if all.len() > 1 {
                    state.fallback = FallbackSsids {
                        ssids: all,
                        index: 0,
                    };
                }
                chosen
            }
        };

        let remote_id = self.add_network_and_save(iface, config, &ssid)?;
        self.iface_mut(iface)?
            .records
            .set_current(NetworkRecord::new(remote_id, config.clone(), ssid));
        Ok(())
    }

    fn remove_all_networks(&mut self, iface: &str) -> Result<()> {
        let result = self.channel.list_networks(iface);
        let ids = self.step(iface, "listNetworks", result)?;
        for id in ids {
            let result = self.channel.remove_network(iface, id);
            self.step(iface, "removeNetwork", result)?;
        }
        Ok(())
    }

    /// Add and configure one remote network. A failed save removes the
    /// network that was just added.
    fn add_network_and_save(&mut self, iface: &str, config: &WifiConfig, ssid: &Ssid) -> Result<i32> {
        let result = self.channel.add_network(iface);
        let remote_id = self
            .step(iface, "addNetwork", result)?
            .ok_or_else(|| SupplicantError::NullHandle {
                iface: iface.to_string(),
                op: "addNetwork",
            })?;

        let result = self.channel.save_network(iface, remote_id, config, ssid);
        if let Err(err) = self.step(iface, "saveNetwork", result) {
            if !err.is_transport() {
                if let Err(cleanup) = self.channel.remove_network(iface, remote_id) {
                    self.note_channel_error(&cleanup);
                    warn!(target: T_SUPPLICANT, iface = %iface, remote_id, error = %cleanup, "save_cleanup_failed");
                }
            }
            return Err(err);
        }
        Ok(remote_id)
    }

    fn push_pmk_cache(&mut self, iface: &str, remote_id: i32, network_id: i32) -> Result<()> {
        let now = self.clock.elapsed_ms();
        for entry in self.pmk_cache.live_entries(network_id, now) {
            let result = self.channel.set_pmk_cache(iface, remote_id, &entry.blob);
            match self.check(result) {
                Ok(()) => {}
                Err(err) if err.is_transport() => return Err(err),
                Err(err) => {
                    warn!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, error = %err, "pmk_cache_push_failed")
                }
            }
        }
        Ok(())
    }

    /// Roam within the current network, to a linked network, or fall back to
    /// a full connect.
    pub fn roam_to_network(&mut self, iface: &str, config: &WifiConfig) -> Result<()> {
        self.iface(iface)?;
        if self.update_on_linked_network_roaming(iface, config.network_id, true) {
            let remote_id = self.current_remote_id(iface)?;
            let result = self.channel.select_network(iface, remote_id);
            self.step(iface, "select", result)?;
            info!(target: T_SUPPLICANT, iface = %iface, net_id = config.network_id, "roam_to_linked_network");
            return Ok(());
        }

        let current_id = self
            .iface(iface)?
            .records
            .current()
            .map(NetworkRecord::framework_id)
            .unwrap_or(INVALID_NETWORK_ID);
        if current_id != config.network_id {
            return self.connect_to_network(iface, config, None);
        }

        let remote_id = self.current_remote_id(iface)?;
        let bssid = config
            .selection_bssid
            .clone()
            .unwrap_or_else(|| SUPPLICANT_BSSID_ANY.to_string());
        let result = self.channel.set_bssid(iface, remote_id, &bssid);
        self.step(iface, "setBssid", result)?;
        let result = self.channel.reassociate(iface);
        self.step(iface, "reassociate", result)?;

        if let Some(current) = self.iface_mut(iface)?.records.current_mut() {
            current.config.selection_bssid = config.selection_bssid.clone();
        }
        info!(target: T_SUPPLICANT, iface = %iface, bssid = %bssid, "roam_reassociate");
        Ok(())
    }

    /// Swap a linked network in as current. False when there is nothing to
    /// swap.
    pub fn update_on_linked_network_roaming(
        &mut self,
        iface: &str,
        network_id: i32,
        from_framework: bool,
    ) -> bool {
        let Some(state) = self.ifaces.get_mut(iface) else {
            return false;
        };
        let Some(current) = state.records.current() else {
            return false;
        };
        if state.records.linked().is_empty() || current.framework_id() == network_id {
            return false;
        }
        let promoted = state.records.promote_linked(network_id);
        if promoted {
            info!(
                target: T_SUPPLICANT,
                iface = %iface,
                net_id = network_id,
                from_framework,
                "linked_network_now_current"
            );
        }
        promoted
    }

    /// Provision `linked` (keyed by profile key) next to the current network.
    /// Remote networks that are neither current nor in the map are removed.
    pub fn update_linked_networks(
        &mut self,
        iface: &str,
        network_id: i32,
        linked: &HashMap<String, WifiConfig>,
    ) -> Result<()> {
        let current = self.current(iface)?;
        if current.framework_id() != network_id {
            return Err(SupplicantError::NetworkMismatch {
                iface: iface.to_string(),
                requested: network_id,
                current: current.framework_id(),
            });
        }
        if current.remote_id == INVALID_NETWORK_ID {
            return Err(SupplicantError::NoCurrentNetwork {
                iface: iface.to_string(),
            });
        }
        let current_key = current.config.profile_key();

        let keep_ids: HashSet<i32> = {
            let state = self.iface_mut(iface)?;
            state.records.retain_linked(|key| linked.contains_key(key));
            state.records.remote_ids().into_iter().collect()
        };

        let result = self.channel.list_networks(iface);
        let listed = self.step(iface, "listNetworks", result)?;
        for id in listed.into_iter().filter(|id| !keep_ids.contains(id)) {
            let result = self.channel.remove_network(iface, id);
            self.step(iface, "removeNetwork", result)?;
        }

        let mut keys: Vec<&String> = linked.keys().collect();
        keys.sort();
        for key in keys {
            let already = self.iface(iface)?.records.linked().contains_key(key.as_str());
            if *key == current_key || already {
                continue;
            }
            let Some(config) = linked.get(key.as_str()) else {
                continue;
            };
            let remote_id = self.add_network_and_save(iface, config, &config.ssid)?;
            let result = self.channel.enable_network(iface, remote_id, true);
            self.step(iface, "enableNetwork", result)?;
            self.iface_mut(iface)?.records.insert_linked(
                key.clone(),
                NetworkRecord::new(remote_id, config.clone(), config.ssid.clone()),
            );
        }

        debug!(
            target: T_SUPPLICANT,
            iface = %iface,
            net_id = network_id,
            linked = linked.len(),
            "linked_networks_updated"
        );
        Ok(())
    }

    /// A not-found right after a connect is expected while the scan catches up.
    pub fn should_ignore_network_not_found(&self, iface: &str) -> bool {
        let Some(last) = self.ifaces.get(iface).and_then(|s| s.last_connect_ms) else {
            return false;
        };
        self.clock.elapsed_ms().saturating_sub(last) < self.config.not_found_ignore_window_ms
    }

    /// Reconnect using the next SSID encoding. Returns true while the list has
    /// not wrapped back to the first entry.
    pub fn connect_to_fallback_ssid(&mut self, iface: &str) -> Result<bool> {
        let state = self.iface_mut(iface)?;
        if state.fallback.ssids.is_empty() {
            return Ok(false);
        }
        let Some(config) = state.records.current().map(|r| r.config.clone()) else {
            return Ok(false);
        };
        let mut next = state.fallback.index + 1;
        if next >= state.fallback.ssids.len() {
            next = 0;
        }
        state.fallback.index = next;
        let ssid = state.fallback.ssids[next].clone();
        info!(target: T_SUPPLICANT, iface = %iface, ssid = %ssid, index = next, "connect_fallback_ssid");
        self.connect_to_network(iface, &config, Some(ssid))?;
        Ok(next != 0)
    }

    pub fn disable_current_network(&mut self, iface: &str) -> Result<()> {
        self.iface_mut(iface)?.fallback = FallbackSsids::default();
        let remote_id = self.current_remote_id(iface)?;
        let result = self.channel.disable_network(iface, remote_id);
        self.check(result)
    }

    pub fn remove_network_cached_data(&mut self, network_id: i32) -> bool {
        self.pmk_cache.remove(network_id)
    }

    /// Drop cached keys when the credentials or security behind them changed.
    pub fn remove_network_cached_data_if_needed(&mut self, old: &WifiConfig, new: &WifiConfig) -> bool {
        if old.credentials != new.credentials || old.security_types != new.security_types {
            return self.remove_network_cached_data(old.network_id);
        }
        false
    }

    pub fn has_pmk_cache(&self, network_id: i32) -> bool {
        self.pmk_cache.contains(network_id)
    }

    // ---- pass-through operations ----

    pub fn reassociate(&mut self, iface: &str) -> Result<()> {
        self.iface(iface)?;
        let result = self.channel.reassociate(iface);
        self.check(result)
    }

    pub fn reconnect(&mut self, iface: &str) -> Result<()> {
        self.iface(iface)?;
        let result = self.channel.reconnect(iface);
        self.check(result)
    }

    pub fn disconnect(&mut self, iface: &str) -> Result<()> {
        self.iface(iface)?;
        let result = self.channel.disconnect(iface);
        self.check(result)
    }

    pub fn cancel_wps(&mut self, iface: &str) -> Result<()> {
        self.iface(iface)?;
        let result = self.channel.cancel_wps(iface);
        self.check(result)
    }

    pub fn set_current_network_bssid(&mut self, iface: &str, bssid: &str) -> Result<()> {
        let remote_id = self.current_remote_id(iface)?;
        let result = self.channel.set_bssid(iface, remote_id, bssid);
        self.check(result)?;
        if let Some(current) = self.iface_mut(iface)?.records.current_mut() {
            current.config.selection_bssid =
                (bssid != SUPPLICANT_BSSID_ANY).then(|| bssid.to_string());
        }
        Ok(())
    }

    pub fn current_network(&self, iface: &str) -> Option<&NetworkRecord> {
        self.ifaces.get(iface).and_then(|state| state.records.current())
    }

    pub fn current_network_security(&self, iface: &str) -> Option<SecurityType> {
        self.current_network(iface).and_then(NetworkRecord::security)
    }

    pub fn current_network_remote_id(&self, iface: &str) -> Option<i32> {
        self.current_network(iface).map(|record| record.remote_id)
    }

    pub fn linked_network_count(&self, iface: &str) -> usize {
        self.ifaces
            .get(iface)
            .map(|state| state.records.linked().len())
            .unwrap_or(0)
    }

    pub fn connection_state(&self, iface: &str) -> Option<StaState> {
        self.ifaces.get(iface).map(|state| state.tracker.current())
    }

    // ---- credentials ----

    pub fn send_current_network_eap_identity_response(
        &mut self,
        iface: &str,
        identity: &str,
        encrypted_identity: Option<&[u8]>,
    ) -> Result<()> {
        let remote_id = self.current_remote_id(iface)?;
        let result =
            self.channel
                .send_eap_identity_response(iface, remote_id, identity, encrypted_identity);
        self.check(result)
    }

    pub fn send_current_network_eap_sim_gsm_auth_response(
        &mut self,
        iface: &str,
        params: &str,
    ) -> Result<()> {
        let response = sim::parse_gsm_auth(params)?;
        self.send_sim_response(iface, response)
    }

    pub fn send_current_network_eap_sim_umts_auth_response(
        &mut self,
        iface: &str,
        params: &str,
    ) -> Result<()> {
        let response = sim::parse_umts_auth(params)?;
        self.send_sim_response(iface, response)
    }

    pub fn send_current_network_eap_sim_umts_auts_response(
        &mut self,
        iface: &str,
        params: &str,
    ) -> Result<()> {
        let response = sim::parse_umts_auts(params)?;
        self.send_sim_response(iface, response)
    }

    pub fn send_current_network_eap_sim_umts_auth_failure(&mut self, iface: &str) -> Result<()> {
        self.send_sim_response(iface, crate::channel::SimAuthResponse::UmtsFailure)
    }

    fn send_sim_response(
        &mut self,
        iface: &str,
        response: crate::channel::SimAuthResponse,
    ) -> Result<()> {
        let remote_id = self.current_remote_id(iface)?;
        let result = self.channel.send_sim_auth_response(iface, remote_id, &response);
        self.check(result)
    }

    /// Record a new anonymous identity; push it only when asked.
    pub fn set_eap_anonymous_identity(
        &mut self,
        iface: &str,
        identity: &str,
        update_to_native: bool,
    ) -> Result<()> {
        let remote_id = self.current_remote_id(iface)?;
        if update_to_native {
            let result = self.channel.set_anonymous_identity(iface, remote_id, identity);
            self.check(result)?;
        }
        if let Some(current) = self.iface_mut(iface)?.records.current_mut() {
            current.anonymous_identity = Some(identity.to_string());
        }
        Ok(())
    }

    pub fn current_anonymous_identity(&self, iface: &str) -> Option<&str> {
        self.current_network(iface)
            .and_then(|record| record.anonymous_identity.as_deref())
    }

    // ---- QoS ----

    pub fn add_qos_policy_request_for_scs(
        &mut self,
        iface: &str,
        policies: &[QosPolicyScsData],
    ) -> Result<Vec<QosPolicyStatus>> {
        self.iface(iface)?;
        validate_scs_policies(policies)?;
        let result = self.channel.add_qos_policies(iface, policies);
        self.check(result)
    }

    pub fn remove_qos_policy_for_scs(
        &mut self,
        iface: &str,
        policy_ids: &[u8],
    ) -> Result<Vec<QosPolicyStatus>> {
        self.iface(iface)?;
        if policy_ids.is_empty() {
            return Err(SupplicantError::invalid("empty SCS policy id list"));
        }
        let result = self.channel.remove_qos_policies(iface, policy_ids);
        self.check(result)
    }

    pub fn remove_all_qos_policies(&mut self, iface: &str) -> Result<()> {
        self.iface(iface)?;
        let result = self.channel.remove_all_qos_policies(iface);
        self.check(result)
    }

    pub fn send_qos_policy_response(
        &mut self,
        iface: &str,
        request_id: i32,
        more_policies: bool,
        statuses: &[QosPolicyStatus],
    ) -> Result<()> {
        self.iface(iface)?;
        let result = self
            .channel
            .send_qos_policy_response(iface, request_id, more_policies, statuses);
        self.check(result)
    }

    /// Cache and push MSCS parameters.
    pub fn enable_mscs(&mut self, iface: &str, params: MscsParams) -> Result<()> {
        params.validate()?;
        self.iface_mut(iface)?.mscs = Some(params);
        let result = self.channel.configure_mscs(iface, &params);
        self.check(result)
    }

    /// Re-push cached MSCS parameters, e.g. after a reassociation.
    pub fn resend_mscs(&mut self, iface: &str) -> Result<()> {
        let Some(params) = self.iface(iface)?.mscs else {
            return Ok(());
        };
        let result = self.channel.configure_mscs(iface, &params);
        self.check(result)
    }

    pub fn disable_mscs(&mut self, iface: &str) -> Result<()> {
        self.iface_mut(iface)?.mscs = None;
        let result = self.channel.disable_mscs(iface);
        self.check(result)
    }

    // ---- callbacks ----

    pub fn handle_callback(&mut self, iface: &str, callback: DaemonCallback) {
        if !self.ifaces.contains_key(iface) {
            debug!(target: T_SUPPLICANT, iface = %iface, "callback_for_unknown_iface");
            return;
        }
        match callback {
            DaemonCallback::StateChanged {
                state,
                bssid,
                remote_network_id,
                ssid,
            } => self.on_state_changed(iface, state, bssid, remote_network_id, ssid),
            DaemonCallback::Disconnected {
                bssid,
                locally_generated,
                reason,
            } => self.on_disconnected(iface, bssid, locally_generated, reason),
            DaemonCallback::AssociationRejected {
                ssid,
                bssid,
                status_code,
                timed_out,
                oce_rssi_reject,
                mbo_disallowed,
            } => {
                let info = AssocRejectInfo {
                    ssid: ssid.to_string(),
                    bssid,
                    status_code,
                    timed_out,
                    oce_rssi_reject,
                    mbo_disallowed,
                };
                self.on_association_rejected(iface, info);
            }
            DaemonCallback::AuthenticationTimeout { bssid } => {
                let current = self.current_info(iface);
                let state = self
                    .ifaces
                    .get(iface)
                    .map(|s| s.tracker.current())
                    .unwrap_or(StaState::Disconnected);
                let reason = classify_auth_timeout(state, current.security, current.ever_connected);
                self.publish_auth_failure(iface, current.network_id, reason, EAP_ERROR_NONE, bssid);
            }
            DaemonCallback::EapFailure { bssid, error_code } => {
                let current = self.current_info(iface);
                self.publish_auth_failure(
                    iface,
                    current.network_id,
                    AuthFailureReason::EapFailure,
                    error_code,
                    bssid,
                );
            }
            DaemonCallback::NetworkNotFound { ssid } => self.on_network_not_found(iface, ssid),
            DaemonCallback::NetworkRemoved { remote_network_id } => {
                if let Some(state) = self.ifaces.get_mut(iface) {
                    state.tracker.on_network_removed();
                }
                debug!(target: T_SUPPLICANT, iface = %iface, remote_network_id, "remote_network_removed");
            }
            DaemonCallback::BssidChanged { reason, bssid } => {
                let iface = iface.to_string();
                match reason {
                    BssidChangeReason::AssocStart => {
                        self.publish(SupplicantEvent::TargetBssid { iface, bssid })
                    }
                    BssidChangeReason::AssocComplete => {
                        self.publish(SupplicantEvent::AssociatedBssid { iface, bssid })
                    }
                    BssidChangeReason::Disassoc => {}
                }
            }
            DaemonCallback::BssFrequencyChanged { frequency_mhz } => {
                self.publish(SupplicantEvent::BssFrequencyChanged {
                    iface: iface.to_string(),
                    frequency_mhz,
                });
            }
            DaemonCallback::PmkSaCacheAdded {
                expiration_ms,
                blob,
            } => {
                let network_id = self.current_info(iface).network_id;
                if network_id == INVALID_NETWORK_ID {
                    debug!(target: T_SUPPLICANT, iface = %iface, "pmk_cache_without_network");
                    return;
                }
                let entry = PmkCacheEntry {
                    blob,
                    expires_at_ms: expiration_ms,
                };
                self.pmk_cache.add(network_id, entry.clone());
                self.publish(SupplicantEvent::PmkCacheAdded {
                    iface: iface.to_string(),
                    network_id,
                    entry,
                });
            }
            DaemonCallback::EapIdentityRequest { remote_network_id } => {
                let network_id = self
                    .ifaces
                    .get(iface)
                    .and_then(|s| s.records.framework_id_for_remote(remote_network_id))
                    .unwrap_or(INVALID_NETWORK_ID);
                self.publish(SupplicantEvent::EapIdentityRequest {
                    iface: iface.to_string(),
                    network_id,
                });
            }
            DaemonCallback::QosPolicyRequest {
                request_id,
                policies,
            } => {
                self.publish(SupplicantEvent::QosPolicyRequest {
                    iface: iface.to_string(),
                    request_id,
                    policies,
                });
            }
        }
    }

    fn on_state_changed(
        &mut self,
        iface: &str,
        state: StaState,
        bssid: Option<String>,
        remote_network_id: i32,
        ssid: Ssid,
    ) {
        let (network_id, current_id) = match self.ifaces.get_mut(iface) {
            Some(session) => {
                session.tracker.on_state_changed(state);
                (
                    session
                        .records
                        .framework_id_for_remote(remote_network_id)
                        .unwrap_or(INVALID_NETWORK_ID),
                    session
                        .records
                        .current()
                        .map(NetworkRecord::framework_id)
                        .unwrap_or(INVALID_NETWORK_ID),
                )
            }
            None => return,
        };

        // The daemon roamed to a linked network on its own.
        if network_id != INVALID_NETWORK_ID && network_id != current_id {
            self.update_on_linked_network_roaming(iface, network_id, false);
        }

        if state == StaState::Completed {
            if let Some(current) = self
                .ifaces
                .get_mut(iface)
                .and_then(|s| s.records.current_mut())
            {
                if current.remote_id == remote_network_id {
                    current.config.ever_connected = true;
                }
            }
        }

        debug!(target: T_SUPPLICANT, iface = %iface, state = %state, net_id = network_id, "sta_state_changed");
        self.publish(SupplicantEvent::StateChanged {
            iface: iface.to_string(),
            state,
            network_id,
            bssid,
            ssid: ssid.to_string(),
        });
    }

    fn on_disconnected(
        &mut self,
        iface: &str,
        bssid: Option<String>,
        locally_generated: bool,
        reason: u16,
    ) {
        let before = match self.ifaces.get_mut(iface) {
            Some(session) => session.tracker.take_before_disconnect(),
            None => return,
        };
        let current = self.current_info(iface);
        if let Some(failure) = classify_disconnect(
            before,
            current.security,
            reason,
            locally_generated,
            &self.config.disconnect_suppression,
        ) {
            self.publish_auth_failure(iface, current.network_id, failure, EAP_ERROR_NONE, bssid.clone());
        }
        info!(
            target: T_SUPPLICANT,
            iface = %iface,
            reason,
            locally_generated,
            before = %before,
            "sta_disconnected"
        );
        self.publish(SupplicantEvent::Disconnection {
            iface: iface.to_string(),
            bssid,
            locally_generated,
            reason,
        });
    }

    fn on_association_rejected(&mut self, iface: &str, info: AssocRejectInfo) {
        let current = self.current_info(iface);
        if current.network_id != INVALID_NETWORK_ID {
            self.pmk_cache.remove(current.network_id);
        }
        if self.config.rejection_policy.is_wrong_password(
            current.security,
            info.status_code,
            info.timed_out,
        ) {
            self.publish_auth_failure(
                iface,
                current.network_id,
                AuthFailureReason::WrongPassword,
                EAP_ERROR_NONE,
                info.bssid.clone(),
            );
        }
        info!(
            target: T_SUPPLICANT,
            iface = %iface,
            status = info.status_code,
            timed_out = info.timed_out,
            "association_rejected"
        );
        self.publish(SupplicantEvent::AssociationRejection {
            iface: iface.to_string(),
            network_id: current.network_id,
            info,
        });
    }

    fn on_network_not_found(&mut self, iface: &str, ssid: Ssid) {
        if self.should_ignore_network_not_found(iface) {
            debug!(target: T_SUPPLICANT, iface = %iface, "network_not_found_ignored");
            return;
        }
        match self.connect_to_fallback_ssid(iface) {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => {
                warn!(target: T_SUPPLICANT, iface = %iface, error = %err, "fallback_ssid_connect_failed")
            }
        }
        let current = self.current_info(iface);
        let ssid = current.ssid.unwrap_or_else(|| ssid.to_string());
        self.publish(SupplicantEvent::NetworkNotFound {
            iface: iface.to_string(),
            network_id: current.network_id,
            ssid,
        });
    }

    fn publish_auth_failure(
        &self,
        iface: &str,
        network_id: i32,
        reason: AuthFailureReason,
        error_code: i32,
        bssid: Option<String>,
    ) {
        info!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, ?reason, error_code, "auth_failure");
        self.publish(SupplicantEvent::AuthenticationFailure {
            iface: iface.to_string(),
            network_id,
            reason,
            error_code,
            bssid,
        });
    }
}
