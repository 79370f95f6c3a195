//! The connectivity decision engine.
//!
//! Owns scan scheduling (periodic single scans while the screen is on, PNO
//! while it is off and disconnected), turns scan results into connect or
//! roam requests, and retries failed attempts on the cached candidates.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use stalink_logging::targets::{T_CONNECTIVITY, T_SCAN};
use stalink_supplicant::{Clock, SecurityType, Ssid, WifiConfig, SUPPLICANT_BSSID_ANY};
use tracing::{debug, info, warn};

use crate::blocklist::{BlockReason, BssidBlocklist};
use crate::candidates::{CandidateCache, RetryCandidates};
use crate::channels;
use crate::collaborators::{
    ConfigStore, DialogProvider, NetworkSelector, ScanProvider, SelectionContext, StationControl,
    TimerKind, TimerScheduler,
};
use crate::config::{EngineConfig, ScheduleConfig};
use crate::dialog::{DialogId, DialogOutcome, GateDecision, NetworkSwitchGate};
use crate::mobility::{HighMovementFilter, MovementVerdict};
use crate::multi_internet::{self, MultiInternetState};
use crate::pno::{self, ExternalPnoRequest, ExternalPnoRequests, PnoListSettings, PnoRequest};
use crate::rate_limit::AttemptLimiter;
use crate::schedule::{ScanSchedule, ScheduleMode};
use crate::types::{
    AttemptOutcome, Band, Candidate, ClientModeInfo, CmmRole, FailureReason, MobilityState,
    ScanData, ScanRequest, ScanResult, ScanType, WifiState,
};

/// Progress of the partial scan issued right after coming up disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialScanState {
    Start,
    AwaitingResponse,
    Complete,
}

/// Where a batch of scan results came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanOrigin {
    Single,
    Pno,
}

pub struct ConnectivityEngine {
    config: EngineConfig,
    scanner: Arc<dyn ScanProvider>,
    selector: Arc<dyn NetworkSelector>,
    store: Arc<dyn ConfigStore>,
    station: Arc<dyn StationControl>,
    dialogs: Arc<dyn DialogProvider>,
    timers: Arc<dyn TimerScheduler>,
    clock: Arc<dyn Clock>,

    wifi_enabled: bool,
    running: bool,
    screen_on: bool,
    wifi_state: WifiState,
    mobility: MobilityState,
    power_save: bool,
    location_enabled: bool,

    auto_join_enabled: bool,
    auto_join_external: bool,
    auto_join_external_by_admin: bool,
    trusted_allowed: bool,
    untrusted_allowed: bool,
    oem_paid_allowed: bool,
    oem_private_allowed: bool,
    restricted_uids: BTreeSet<u32>,
    specific_request_in_progress: bool,
    autojoin_disallowed_security: Vec<SecurityType>,

    pno_enabled: bool,
    pno_after_toggle: bool,
    pno_started: bool,
    delayed_pno_pending: bool,
    external_pno: ExternalPnoRequests,

    schedule: ScanSchedule,
    periodic_timer_set: bool,
    last_periodic_scan_ms: Option<u64>,
    single_scan_restarts: u32,
    restart_single_full_band: bool,
    scan_restarts: u32,
    low_rssi_retry_ms: u64,
    initial_scan: InitialScanState,
    wait_for_full_band: bool,
    next_screen_on_delay_ms: u64,
    last_selection_ms: Option<u64>,

    limiter: AttemptLimiter,
    blocklist: BssidBlocklist,
    candidates: CandidateCache,
    movement: HighMovementFilter,
    gate: NetworkSwitchGate<WifiConfig>,
    multi_internet: MultiInternetState,
    specified_bssids: HashMap<Band, String>,
}

impl ConnectivityEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        scanner: Arc<dyn ScanProvider>,
        selector: Arc<dyn NetworkSelector>,
        store: Arc<dyn ConfigStore>,
        station: Arc<dyn StationControl>,
        dialogs: Arc<dyn DialogProvider>,
        timers: Arc<dyn TimerScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let schedule = ScanSchedule::new(
            config.connected_schedule.clone(),
            config.disconnected_schedule.clone(),
            config.single_saved_schedule.clone(),
        );
        let limiter = AttemptLimiter::new(config.rate_limit_window_ms, config.rate_limit_max_attempts);
        let blocklist = BssidBlocklist::new(config.temp_bssid_block_ms);
        let candidates = CandidateCache::new(config.candidate_cache_timeout_ms);
        let movement = HighMovementFilter::new(
            config.high_movement_scan_delay_ms,
            config.high_movement_rssi_delta,
        );
        let low_rssi_retry_ms = config.pno_low_rssi_retry_start_ms;
        let pno_enabled = config.pno_enabled;
        let pno_after_toggle = config.pno_after_wifi_toggle;
        Self {
            config,
            scanner,
            selector,
            store,
            station,
            dialogs,
            timers,
            clock,
            wifi_enabled: false,
            running: false,
            screen_on: false,
            wifi_state: WifiState::Unknown,
            mobility: MobilityState::Unknown,
            power_save: false,
            location_enabled: true,
            auto_join_enabled: false,
            auto_join_external: true,
            auto_join_external_by_admin: false,
            trusted_allowed: false,
            untrusted_allowed: false,
            oem_paid_allowed: false,
            oem_private_allowed: false,
            restricted_uids: BTreeSet::new(),
            specific_request_in_progress: false,
            autojoin_disallowed_security: Vec::new(),
            pno_enabled,
            pno_after_toggle,
            pno_started: false,
            delayed_pno_pending: false,
            external_pno: ExternalPnoRequests::default(),
            schedule,
            periodic_timer_set: false,
            last_periodic_scan_ms: None,
            single_scan_restarts: 0,
            restart_single_full_band: true,
            scan_restarts: 0,
            low_rssi_retry_ms,
            initial_scan: InitialScanState::Complete,
            wait_for_full_band: false,
            next_screen_on_delay_ms: 0,
            last_selection_ms: None,
            limiter,
            blocklist,
            candidates,
            movement,
            gate: NetworkSwitchGate::default(),
            multi_internet: MultiInternetState::None,
            specified_bssids: HashMap::new(),
        }
    }

    fn now(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_auto_join_enabled(&self) -> bool {
        self.auto_join_enabled
    }

    pub fn is_pno_started(&self) -> bool {
        self.pno_started
    }

    pub fn wifi_state(&self) -> WifiState {
        self.wifi_state
    }

    pub fn schedule_mode(&self) -> Option<ScheduleMode> {
        self.schedule.mode()
    }

    pub fn schedule_index(&self) -> usize {
        self.schedule.index()
    }

    pub fn initial_scan_state(&self) -> InitialScanState {
        self.initial_scan
    }

    pub fn low_rssi_retry_ms(&self) -> u64 {
        self.low_rssi_retry_ms
    }

    pub fn last_selection_ms(&self) -> Option<u64> {
        self.last_selection_ms
    }

    pub fn blocklist(&self) -> &BssidBlocklist {
        &self.blocklist
    }

    pub fn cached_candidates(&self, iface: &str) -> Option<&[Candidate]> {
        self.candidates.get(iface)
    }

    // ---- enablement ----

    pub fn set_wifi_enabled(&mut self, enable: bool) {
        info!(target: T_CONNECTIVITY, enable, "wifi_enabled_changed");
        if self.wifi_enabled && !enable {
            self.reset_on_wifi_disable();
        }
        self.wifi_enabled = enable;
        self.update_running_state();
    }

    /// Toggle-off cleanup: temporary disables and ephemeral networks do not
    /// survive a Wi-Fi restart.
    fn reset_on_wifi_disable(&mut self) {
        self.store.enable_temporarily_disabled_networks();
        self.store.clear_user_temporarily_disabled();
        self.store.remove_all_ephemeral_or_passpoint_networks();
        if self.pno_after_toggle {
            self.pno_enabled = true;
        }
    }

    /// External autojoin switch. An admin-set disable can only be lifted by
    /// an admin.
    pub fn set_auto_join_enabled_external(&mut self, enable: bool, is_admin: bool) {
        if !self.auto_join_external && self.auto_join_external_by_admin && !is_admin {
            info!(target: T_CONNECTIVITY, enable, "autojoin_admin_locked");
            return;
        }
        self.auto_join_external_by_admin = is_admin;
        if self.auto_join_external == enable {
            return;
        }
        self.auto_join_external = enable;
        self.check_all_states_and_enable_auto_join();
        if !enable {
            self.dismiss_switch_dialog();
        }
    }

    pub fn set_trusted_connection_allowed(&mut self, allowed: bool) {
        if self.trusted_allowed != allowed {
            self.trusted_allowed = allowed;
            self.check_all_states_and_enable_auto_join();
        }
    }

    pub fn set_untrusted_connection_allowed(&mut self, allowed: bool) {
        if self.untrusted_allowed != allowed {
            self.untrusted_allowed = allowed;
            self.check_all_states_and_enable_auto_join();
        }
    }

    pub fn set_oem_connection_allowed(&mut self, paid: bool, private: bool) {
        if self.oem_paid_allowed != paid || self.oem_private_allowed != private {
            self.oem_paid_allowed = paid;
            self.oem_private_allowed = private;
            self.check_all_states_and_enable_auto_join();
        }
    }

    pub fn set_restricted_connection_uids(&mut self, uids: impl IntoIterator<Item = u32>) {
        let uids: BTreeSet<u32> = uids.into_iter().collect();
        if self.restricted_uids != uids {
            self.restricted_uids = uids;
            self.check_all_states_and_enable_auto_join();
        }
    }

    pub fn set_specific_network_request_in_progress(&mut self, in_progress: bool) {
        if self.specific_request_in_progress != in_progress {
            self.specific_request_in_progress = in_progress;
            self.check_all_states_and_enable_auto_join();
        }
    }

    pub fn set_autojoin_disallowed_security(&mut self, security: Vec<SecurityType>) {
        self.autojoin_disallowed_security = security;
    }

    pub fn set_multi_internet_state(&mut self, state: MultiInternetState) {
        if self.multi_internet != state {
            info!(target: T_CONNECTIVITY, ?state, "multi_internet_state_changed");
            self.multi_internet = state;
            self.check_all_states_and_enable_auto_join();
        }
    }

    /// Pins the secondary interface to one BSSID per band. Empty clears.
    pub fn set_specified_bssids(&mut self, bssids: HashMap<Band, String>) {
        self.specified_bssids = bssids;
    }

    fn check_all_states_and_enable_auto_join(&mut self) {
        let any_source = self.untrusted_allowed
            || self.oem_paid_allowed
            || self.oem_private_allowed
            || self.trusted_allowed
            || !self.restricted_uids.is_empty()
            || self.multi_internet != MultiInternetState::None;
        let enable =
            self.auto_join_external && any_source && !self.specific_request_in_progress;
        self.set_auto_join_enabled(enable);
        self.start_connectivity_scan(true);
    }

    fn set_auto_join_enabled(&mut self, enable: bool) {
        if self.auto_join_enabled != enable {
            info!(target: T_CONNECTIVITY, enable, "autojoin_changed");
        }
        self.auto_join_enabled = enable;
        self.update_running_state();
    }

    fn update_running_state(&mut self) {
        if self.wifi_enabled && self.auto_join_enabled {
            self.start();
        } else {
            self.stop();
        }
    }

    fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.limiter.clear();
        self.candidates.clear_all();
        info!(target: T_CONNECTIVITY, "engine_started");
        if self.config.partial_initial_scan {
            self.initial_scan = InitialScanState::Start;
            if self.screen_on {
                self.start_single_scan(false, self.schedule.entry_at(0).scan_type);
                if self.initial_scan == InitialScanState::Start {
                    self.initial_scan = InitialScanState::AwaitingResponse;
                }
            }
        }
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.stop_connectivity_scan();
        self.last_periodic_scan_ms = None;
        self.wait_for_full_band = false;
        self.candidates.clear_all();
        self.scan_restarts = 0;
        info!(target: T_CONNECTIVITY, "engine_stopped");
    }

    // ---- environment ----

    pub fn handle_screen_state_changed(&mut self, on: bool) {
        debug!(target: T_SCAN, screen_on = on, "screen_state_changed");
        self.screen_on = on;
        if self.wifi_state == WifiState::Disconnected && self.config.partial_initial_scan {
            self.initial_scan = InitialScanState::Start;
        }
        if on {
            self.delayed_pno_pending = false;
            self.timers.cancel(TimerKind::PnoNetworkChange);
            if self.next_screen_on_delay_ms > 0 {
                let delay = std::mem::take(&mut self.next_screen_on_delay_ms);
                debug!(target: T_SCAN, delay_ms = delay, "screen_on_scan_delayed");
                self.timers.schedule(TimerKind::DelayedScreenOnScan, delay);
                return;
            }
        } else {
            self.timers.cancel(TimerKind::DelayedScreenOnScan);
        }
        self.start_connectivity_scan(false);
    }

    /// Delays the scan triggered by the next screen-on event.
    pub fn set_one_shot_screen_on_delay(&mut self, delay_ms: u64) {
        self.next_screen_on_delay_ms = delay_ms;
    }

    /// Replaces the screen-on schedules. `None` restores the per-state ones.
    pub fn set_external_screen_on_schedule(&mut self, schedule: Option<ScheduleConfig>) {
        let schedule = schedule.filter(|s| !s.intervals_sec.is_empty());
        debug!(target: T_SCAN, external = schedule.is_some(), "external_schedule_set");
        self.schedule.set_external(schedule);
    }

    pub fn set_power_save_mode(&mut self, power_save: bool) {
        self.power_save = power_save;
    }

    pub fn set_location_mode_enabled(&mut self, enabled: bool) {
        self.location_enabled = enabled;
    }

    pub fn set_device_mobility_state(&mut self, state: MobilityState) {
        let old_interval = self.pno_interval_ms(self.mobility);
        let new_interval = self.pno_interval_ms(state);
        self.mobility = state;
        debug!(target: T_SCAN, ?state, interval_ms = new_interval, "mobility_changed");
        if old_interval != new_interval && self.pno_started {
            self.stop_pno_scan();
            self.start_disconnected_pno_scan();
        }
    }

    pub fn set_pno_scan_enabled_by_framework(&mut self, enabled: bool, enable_after_toggle: bool) {
        self.pno_after_toggle = enable_after_toggle;
        if self.pno_enabled == enabled {
            return;
        }
        self.pno_enabled = enabled;
        if enabled {
            if !self.screen_on && self.wifi_state == WifiState::Disconnected && !self.pno_started {
                self.start_disconnected_pno_scan();
            }
        } else {
            self.stop_pno_scan();
        }
    }

    pub fn set_external_pno_scan_request(&mut self, request: ExternalPnoRequest) -> bool {
        let uid = request.uid;
        if !self.external_pno.set(request) {
            debug!(target: T_SCAN, uid, "external_pno_request_refused");
            return false;
        }
        if self.pno_started {
            self.stop_pno_scan();
            self.start_disconnected_pno_scan();
        } else if self.wifi_state == WifiState::Disconnected && !self.screen_on {
            self.start_disconnected_pno_scan();
        }
        true
    }

    pub fn clear_external_pno_scan_request(&mut self, uid: u32) {
        if self.external_pno.remove(uid) && self.pno_started {
            self.stop_pno_scan();
            self.start_disconnected_pno_scan();
        }
    }

    /// Saved networks changed. Screen-on updates the schedule; screen-off
    /// restarts PNO, throttled.
    pub fn trigger_scan_on_network_changes(&mut self) {
        if self.screen_on {
            if self.update_single_saved_schedule() {
                self.start_connectivity_scan(false);
            }
            return;
        }
        if self.delayed_pno_pending {
            debug!(target: T_SCAN, "pno_network_change_throttled");
            return;
        }
        self.delayed_pno_pending = true;
        self.timers.schedule(
            TimerKind::PnoNetworkChange,
            self.config.pno_network_change_throttle_ms,
        );
    }

    fn update_single_saved_schedule(&mut self) -> bool {
        if !self.wifi_enabled || !self.auto_join_enabled || self.wifi_state != WifiState::Connected
        {
            return false;
        }
        let single = self.uses_single_saved_schedule();
        match self.schedule.mode() {
            Some(ScheduleMode::Connected) if single => {
                self.schedule.set_mode(Some(ScheduleMode::SingleSavedNetwork));
                true
            }
            Some(ScheduleMode::SingleSavedNetwork) if !single => {
                self.schedule.set_mode(Some(ScheduleMode::Connected));
                true
            }
            _ => false,
        }
    }

    fn uses_single_saved_schedule(&self) -> bool {
        let Some(current) = self.primary_client().and_then(|p| p.connected) else {
            return false;
        };
        let saved = self.store.saved_networks();
        saved.len() == 1 && saved[0].network_id == current.network_id
    }

    // ---- connection state ----

    pub fn handle_connection_state_changed(&mut self, iface: &str, role: CmmRole, state: WifiState) {
        if role != CmmRole::Primary {
            debug!(target: T_CONNECTIVITY, iface, ?role, "state_change_ignored");
            return;
        }
        info!(target: T_CONNECTIVITY, iface, state = %state, "connection_state_changed");
        self.wifi_state = state;
        match state {
            WifiState::Disconnected => {
                self.schedule.set_mode(Some(ScheduleMode::Disconnected));
                self.start_connectivity_scan(true);
                if let Some(id) = self.gate.reset() {
                    self.dialogs.dismiss_dialog(id);
                }
            }
            WifiState::Connected => {
                let mode = if self.uses_single_saved_schedule() {
                    ScheduleMode::SingleSavedNetwork
                } else {
                    ScheduleMode::Connected
                };
                self.schedule.set_mode(Some(mode));
                self.start_connectivity_scan(false);
            }
            _ => {
                self.schedule.set_mode(None);
                self.start_connectivity_scan(false);
            }
        }
    }

    pub fn handle_connection_attempt_ended(
        &mut self,
        iface: &str,
        outcome: AttemptOutcome,
        bssid: &str,
        config: &WifiConfig,
    ) {
        let reason = match outcome {
            AttemptOutcome::Success => {
                debug!(target: T_CONNECTIVITY, iface, net_id = config.network_id, "attempt_succeeded");
                return;
            }
            AttemptOutcome::Failure(reason) => reason,
        };
        let Some(client) = self.client(iface) else {
            warn!(target: T_CONNECTIVITY, iface, "attempt_ended_unknown_iface");
            return;
        };
        let now = self.now();
        if !bssid.is_empty() && bssid != SUPPLICANT_BSSID_ANY {
            let duration_ms = self.blocklist.block_failure(bssid, &config.ssid, now);
            info!(target: T_CONNECTIVITY, iface, bssid, ?reason, duration_ms, "bssid_blocked");
        }
        if client.role != CmmRole::Primary {
            return;
        }
        if reason.stops_retry() || config.admin_restricted {
            debug!(target: T_CONNECTIVITY, iface, ?reason, "retry_skipped");
            self.candidates.clear(iface);
            return;
        }
        self.retry_on_cached_candidates(&client, bssid, config, reason == FailureReason::EapFailure);
    }

    fn retry_on_cached_candidates(
        &mut self,
        client: &ClientModeInfo,
        failed_bssid: &str,
        failed: &WifiConfig,
        drop_same_network: bool,
    ) {
        let now = self.now();
        let store = Arc::clone(&self.store);
        let outcome = self.candidates.retain_for_retry(&client.iface, now, |c| {
            if drop_same_network && c.key.matches_network(failed) {
                return false;
            }
            if c.key.bssid.eq_ignore_ascii_case(failed_bssid) {
                return false;
            }
            let Some(config) = store.configured_network(c.key.network_id) else {
                return false;
            };
            if store.is_temporarily_disabled_by_user(&config.disable_key()) {
                return false;
            }
            config.enabled && config.allow_autojoin && !config.admin_restricted
        });
        let remaining = match outcome {
            RetryCandidates::Expired => {
                debug!(target: T_CONNECTIVITY, iface = %client.iface, "retry_cache_expired");
                return;
            }
            RetryCandidates::Unchanged => {
                debug!(target: T_CONNECTIVITY, iface = %client.iface, "retry_cache_unchanged");
                return;
            }
            RetryCandidates::Remaining(list) => list,
        };
        let Some(next) = self.selector.select_network(&remaining) else {
            debug!(target: T_CONNECTIVITY, iface = %client.iface, "retry_exhausted");
            return;
        };
        info!(
            target: T_CONNECTIVITY,
            iface = %client.iface,
            net_id = next.network_id,
            bssid = next.candidate_bssid.as_deref().unwrap_or(""),
            "retry_next_candidate"
        );
        if !failed_bssid.is_empty() && failed_bssid != SUPPLICANT_BSSID_ANY {
            self.blocklist.block_for(
                failed_bssid,
                &failed.ssid,
                self.config.temp_bssid_block_ms,
                BlockReason::FastReconnect,
                now,
            );
        }
        self.trigger_connect(client, &next, SUPPLICANT_BSSID_ANY);
        self.station.stop_secondary_transients();
    }

    // ---- user-driven ----

    /// User asked for a fresh scan: ignore rate limits and wait for a full
    /// band result.
    pub fn force_connectivity_scan(&mut self) {
        if !self.wifi_enabled || !self.running {
            return;
        }
        info!(target: T_SCAN, "forced_connectivity_scan");
        self.limiter.clear();
        self.wait_for_full_band = true;
        self.start_forced_single_scan(true, ScanType::HighAccuracy);
    }

    pub fn prepare_for_forced_connection(&mut self, network_id: i32) {
        let Some(config) = self.store.configured_network(network_id) else {
            return;
        };
        info!(target: T_CONNECTIVITY, net_id = network_id, "prepare_forced_connection");
        self.limiter.clear();
        self.blocklist.clear_ssid(&config.ssid);
    }

    pub fn clear_cached_candidates(&mut self) {
        self.candidates.clear_all();
    }

    /// Dismisses any switch dialog and suppresses new ones for `duration_ms`.
    pub fn disable_network_switch_dialog(&mut self, duration_ms: u64) {
        let now = self.now();
        if let Some(id) = self.gate.disable_for(now, duration_ms) {
            self.dialogs.dismiss_dialog(id);
        }
    }

    pub fn on_switch_dialog_result(&mut self, id: DialogId, accepted: bool) {
        let Some(outcome) = self.gate.answer(id, accepted) else {
            debug!(target: T_CONNECTIVITY, dialog = id, "stale_dialog_answer");
            return;
        };
        match outcome {
            DialogOutcome::Accepted {
                candidate_net_id,
                pending,
            } => {
                info!(target: T_CONNECTIVITY, net_id = candidate_net_id, "switch_accepted");
                if let Some(primary) = self.primary_client() {
                    self.connect_to_network(&primary, &pending, true);
                }
                self.station
                    .on_network_switch_accepted(candidate_net_id, pending.candidate_bssid.as_deref());
            }
            DialogOutcome::Rejected {
                candidate_net_id,
                pending,
            } => {
                info!(target: T_CONNECTIVITY, net_id = candidate_net_id, "switch_rejected");
                self.station
                    .on_network_switch_rejected(candidate_net_id, pending.candidate_bssid.as_deref());
            }
        }
    }

    fn dismiss_switch_dialog(&mut self) {
        if let Some(id) = self.gate.dismiss() {
            self.dialogs.dismiss_dialog(id);
        }
    }

    // ---- timers ----

    pub fn on_timer(&mut self, kind: TimerKind) {
        debug!(target: T_SCAN, ?kind, "timer_fired");
        match kind {
            TimerKind::PeriodicScan => {
                self.periodic_timer_set = false;
                if self.screen_on {
                    self.start_periodic_single_scan();
                }
            }
            TimerKind::RestartSingleScan => {
                self.start_single_scan(self.restart_single_full_band, ScanType::HighAccuracy);
            }
            TimerKind::RestartConnectivityScan => self.start_connectivity_scan(true),
            TimerKind::DelayedPartialScan => {
                let freqs = self.movement.cached_frequencies();
                if !freqs.is_empty() {
                    self.start_partial_scan(freqs);
                }
            }
            TimerKind::PnoNetworkChange => {
                self.delayed_pno_pending = false;
                self.start_connectivity_scan(false);
            }
            TimerKind::DelayedScreenOnScan => self.start_connectivity_scan(false),
        }
    }

    // ---- scan scheduling ----

    fn has_potential_network(&self) -> bool {
        self.config.open_network_notifier || !self.store.saved_networks().is_empty()
    }

    /// Re-evaluates what scanning should run for the current screen and
    /// connection state.
    pub fn start_connectivity_scan(&mut self, scan_immediately: bool) {
        if !self.wifi_enabled || !self.auto_join_enabled {
            return;
        }
        if !self.has_potential_network() {
            debug!(target: T_SCAN, "no_potential_network");
            return;
        }
        self.stop_connectivity_scan();
        if !matches!(self.wifi_state, WifiState::Connected | WifiState::Disconnected) {
            return;
        }
        if self.schedule.mode().is_none() {
            return;
        }
        if self.screen_on {
            self.start_periodic_scan(scan_immediately);
        } else if self.wifi_state == WifiState::Disconnected && !self.pno_started {
            self.start_disconnected_pno_scan();
        }
    }

    fn stop_connectivity_scan(&mut self) {
        self.cancel_periodic_timer();
        self.timers.cancel(TimerKind::DelayedPartialScan);
        self.stop_pno_scan();
    }

    fn start_periodic_scan(&mut self, scan_immediately: bool) {
        self.low_rssi_retry_ms = self.config.pno_low_rssi_retry_start_ms;
        if scan_immediately {
            self.last_periodic_scan_ms = None;
        }
        self.schedule.reset();
        self.start_periodic_single_scan();
    }

    fn start_periodic_single_scan(&mut self) {
        if self.schedule.mode().is_none() {
            return;
        }
        let now = self.now();
        if let Some(last) = self.last_periodic_scan_ms {
            let since = now.saturating_sub(last);
            let min_interval = self.with_power_save(self.schedule.min_interval_ms());
            if since < min_interval {
                debug!(target: T_SCAN, since_ms = since, "periodic_scan_deferred");
                self.schedule_periodic_timer(min_interval - since);
                return;
            }
        }

        let mut scan_needed = true;
        let mut full_band = true;
        if self.wifi_state == WifiState::Connected
            && self.multi_internet != MultiInternetState::ConnectionRequested
            && self.primary_client().map(|p| p.sufficient).unwrap_or(false)
        {
            if self.config.firmware_roaming {
                scan_needed = false;
            } else {
                full_band = false;
            }
        }

        let entry = self.schedule.current();
        let interval = self.with_power_save(entry.interval_ms);
        if !scan_needed {
            debug!(target: T_SCAN, "periodic_scan_skipped_firmware_roaming");
            self.schedule_periodic_timer(interval);
            return;
        }
        self.last_periodic_scan_ms = Some(now);
        if self.wifi_state == WifiState::Disconnected && self.initial_scan == InitialScanState::Start
        {
            self.start_single_scan(false, entry.scan_type);
            if self.initial_scan == InitialScanState::Start {
                self.initial_scan = InitialScanState::AwaitingResponse;
            }
        } else {
            self.start_single_scan(full_band, entry.scan_type);
        }
        self.schedule_periodic_timer(interval);
        self.schedule.advance();
    }

    fn schedule_periodic_timer(&mut self, delay_ms: u64) {
        if self.periodic_timer_set {
            warn!(target: T_SCAN, "periodic_timer_already_set");
            return;
        }
        self.periodic_timer_set = true;
        self.timers.schedule(TimerKind::PeriodicScan, delay_ms);
    }

    fn cancel_periodic_timer(&mut self) {
        if self.periodic_timer_set {
            self.timers.cancel(TimerKind::PeriodicScan);
            self.periodic_timer_set = false;
        }
    }

    fn with_power_save(&self, interval_ms: u64) -> u64 {
        if self.config.battery_saver_enabled && self.power_save {
            interval_ms.saturating_mul(u64::from(self.config.power_save_multiplier))
        } else {
            interval_ms
        }
    }

    fn pno_interval_ms(&self, mobility: MobilityState) -> u64 {
        let base = match mobility {
            MobilityState::Stationary => self.config.pno_stationary_interval_ms,
            _ => self.config.pno_moving_interval_ms,
        };
        self.with_power_save(base)
    }

    fn start_single_scan(&mut self, full_band: bool, scan_type: ScanType) {
        if !self.wifi_enabled || !self.auto_join_enabled {
            return;
        }
        self.start_forced_single_scan(full_band, scan_type);
    }

    fn start_forced_single_scan(&mut self, full_band: bool, scan_type: ScanType) {
        self.low_rssi_retry_ms = self.config.pno_low_rssi_retry_start_ms;
        let mut full_band = full_band;
        let mut channels = Vec::new();
        if !full_band {
            channels = self.partial_scan_channels();
            if channels.is_empty() {
                debug!(target: T_SCAN, "partial_scan_no_history");
                full_band = true;
                self.initial_scan = InitialScanState::Complete;
            }
        }
        let request = ScanRequest {
            scan_type,
            channels,
            hidden_ssids: self.hidden_ssids(),
        };
        self.submit_single_scan(request, full_band);
    }

    fn start_partial_scan(&mut self, channels: Vec<u32>) {
        let request = ScanRequest {
            scan_type: ScanType::HighAccuracy,
            channels,
            hidden_ssids: self.hidden_ssids(),
        };
        self.submit_single_scan(request, false);
    }

    fn submit_single_scan(&mut self, request: ScanRequest, full_band: bool) {
        debug!(
            target: T_SCAN,
            full_band,
            channels = request.channels.len(),
            scan_type = ?request.scan_type,
            "single_scan_start"
        );
        if let Err(err) = self.scanner.start_scan(&request) {
            self.on_single_scan_failure(full_band, &err.to_string());
        }
    }

    fn hidden_ssids(&self) -> Vec<Ssid> {
        self.store
            .saved_networks()
            .into_iter()
            .filter(|c| c.hidden)
            .map(|c| c.ssid)
            .collect()
    }

    fn partial_scan_channels(&self) -> Vec<u32> {
        let age = self.config.partial_scan_channel_age_ms;
        if let Some(primary) = self.primary_client() {
            if let Some(connected) = primary.connected.as_ref() {
                return channels::for_connected_network(
                    self.store.as_ref(),
                    connected,
                    primary.frequency_mhz,
                    self.config.connected_partial_scan_max_channels,
                    age,
                );
            }
        }
        let networks = pno::scan_optimization_networks(self.store.as_ref());
        channels::for_networks(
            self.store.as_ref(),
            &networks,
            self.config.initial_partial_scan_max_channels,
            self.config.initial_partial_scan_max_per_network,
            age,
        )
    }

    /// Asynchronous single-scan failure. Retried while the screen is on.
    pub fn on_single_scan_failure(&mut self, full_band: bool, reason: &str) {
        if self.single_scan_restarts < self.config.max_scan_restarts && self.screen_on {
            self.single_scan_restarts += 1;
            self.restart_single_full_band = full_band;
            warn!(
                target: T_SCAN,
                reason,
                attempt = self.single_scan_restarts,
                "single_scan_failed_retrying"
            );
            self.timers
                .schedule(TimerKind::RestartSingleScan, self.config.scan_restart_delay_ms);
        } else {
            warn!(target: T_SCAN, reason, "single_scan_failed");
            self.single_scan_restarts = 0;
        }
    }

    fn start_disconnected_pno_scan(&mut self) {
        if !self.pno_enabled {
            debug!(target: T_SCAN, "pno_disabled");
            return;
        }
        let settings = PnoListSettings {
            location_enabled: self.location_enabled,
            frequency_culling: self.config.pno_frequency_culling,
            merge_passpoint: self.config.pno_merge_passpoint,
            max_prioritized_passpoint: self.config.max_prioritized_passpoint,
            max_freqs_per_network: self.config.pno_max_freqs_per_network,
            max_freqs_total: self.config.pno_max_freqs_total,
            frequency_age_ms: self.config.pno_frequency_age_ms,
        };
        let networks = pno::build_pno_list(self.store.as_ref(), self.external_pno.current(), &settings);
        if networks.is_empty() {
            debug!(target: T_SCAN, "pno_no_networks");
            return;
        }
        let request = PnoRequest {
            interval_ms: self.pno_interval_ms(self.mobility),
            connected: false,
            networks,
        };
        info!(
            target: T_SCAN,
            interval_ms = request.interval_ms,
            networks = request.networks.len(),
            "pno_start"
        );
        match self.scanner.start_pno_scan(&request) {
            Ok(()) => self.pno_started = true,
            Err(err) => self.on_pno_failure(&err.to_string()),
        }
    }

    fn stop_pno_scan(&mut self) {
        if !self.pno_started {
            return;
        }
        self.scanner.stop_pno_scan();
        self.pno_started = false;
        debug!(target: T_SCAN, "pno_stop");
    }

    /// PNO failures are retried regardless of screen state.
    pub fn on_pno_failure(&mut self, reason: &str) {
        self.pno_started = false;
        if self.scan_restarts < self.config.max_scan_restarts {
            self.scan_restarts += 1;
            warn!(target: T_SCAN, reason, attempt = self.scan_restarts, "pno_failed_retrying");
            self.timers.schedule(
                TimerKind::RestartConnectivityScan,
                self.config.scan_restart_delay_ms,
            );
        } else {
            warn!(target: T_SCAN, reason, "pno_failed");
            self.scan_restarts = 0;
        }
    }

    // ---- scan results ----

    /// Results of any single scan, including ones the engine did not issue.
    pub fn on_scan_results(&mut self, data: ScanData) {
        self.single_scan_restarts = 0;
        if !self.wifi_enabled || !self.auto_join_enabled {
            self.wait_for_full_band = false;
            return;
        }
        if self.wait_for_full_band {
            if !data.full_band {
                debug!(target: T_SCAN, "partial_results_while_forced");
                return;
            }
            self.wait_for_full_band = false;
        }
        let selected = self.handle_scan_results(&data.results, ScanOrigin::Single, data.full_band);
        if self.initial_scan == InitialScanState::AwaitingResponse {
            self.initial_scan = InitialScanState::Complete;
            if !selected {
                debug!(target: T_SCAN, "initial_partial_scan_empty");
                self.start_connectivity_scan(true);
            }
        }
    }

    pub fn on_pno_results(&mut self, results: Vec<ScanResult>) {
        self.scan_restarts = 0;
        info!(target: T_SCAN, count = results.len(), "pno_network_found");
        let selected = self.handle_scan_results(&results, ScanOrigin::Pno, false);
        if selected {
            self.low_rssi_retry_ms = self.config.pno_low_rssi_retry_start_ms;
            return;
        }
        let delay = self.low_rssi_retry_ms;
        debug!(target: T_SCAN, delay_ms = delay, "pno_no_candidate_retry");
        self.timers.schedule(TimerKind::RestartConnectivityScan, delay);
        self.low_rssi_retry_ms = delay
            .saturating_mul(2)
            .min(self.config.pno_low_rssi_retry_max_ms);
    }

    fn handle_scan_results(
        &mut self,
        results: &[ScanResult],
        origin: ScanOrigin,
        full_band: bool,
    ) -> bool {
        let now = self.now();
        let clients = self.station.clients();
        let primary = clients.iter().find(|c| c.role == CmmRole::Primary).cloned();
        let has_secondary = clients
            .iter()
            .any(|c| c.role == CmmRole::SecondaryLongLived);
        if full_band {
            self.blocklist.clear_reason(BlockReason::FastReconnect);
        }
        let ctx = SelectionContext {
            blocked_bssids: self.blocklist.blocked(now),
            clients: clients.clone(),
            untrusted_allowed: self.untrusted_allowed,
            oem_paid_allowed: self.oem_paid_allowed,
            oem_private_allowed: self.oem_private_allowed,
            restricted_uids: self.restricted_uids.iter().copied().collect(),
            skip_sufficiency_check: self.should_skip_sufficiency_check(has_secondary),
            autojoin_disallowed_security: self.autojoin_disallowed_security.clone(),
        };
        let mut candidates = self.selector.candidates_from_scan(results, &ctx);
        if let Some(primary) = primary.as_ref() {
            self.candidates.store(&primary.iface, candidates.clone(), now);
        }

        if self.mobility == MobilityState::HighMovement && self.config.high_movement_optimization {
            let full_view = full_band || origin == ScanOrigin::Pno;
            candidates = match self.movement.filter(candidates, full_view, now) {
                MovementVerdict::Proceed(confirmed) => confirmed,
                MovementVerdict::Hold { partial_scan_in_ms } => {
                    if let Some(delay) = partial_scan_in_ms {
                        debug!(target: T_SCAN, delay_ms = delay, "high_movement_confirm_scan");
                        self.timers.schedule(TimerKind::DelayedPartialScan, delay);
                    }
                    Vec::new()
                }
            };
        }

        self.last_selection_ms = Some(now);
        if candidates.is_empty() {
            debug!(target: T_CONNECTIVITY, ?origin, "no_candidate");
            return false;
        }

        if (self.oem_paid_allowed || self.oem_private_allowed) && self.config.sta_sta_concurrency {
            let (secondary, primary_only): (Vec<_>, Vec<_>) =
                candidates.iter().cloned().partition(Candidate::is_oem_restricted);
            if !secondary.is_empty() {
                return self.handle_oem_candidates(primary_only, secondary, &candidates);
            }
        }

        if self.multi_internet == MultiInternetState::ConnectionRequested {
            if self.connect_multi_internet(&candidates, &clients) {
                return true;
            }
            let needs_primary = primary
                .as_ref()
                .map(|p| self.selector.needs_selection(p))
                .unwrap_or(true);
            if !needs_primary {
                return false;
            }
        }

        self.handle_primary_candidates(&candidates)
    }

    fn should_skip_sufficiency_check(&self, has_secondary: bool) -> bool {
        if has_secondary {
            return false;
        }
        if (self.oem_paid_allowed || self.oem_private_allowed)
            && self.station.can_request_secondary(CmmRole::SecondaryLongLived)
        {
            return true;
        }
        if self.multi_internet == MultiInternetState::ConnectionRequested
            && self.station.can_request_secondary(CmmRole::SecondaryLongLived)
        {
            return true;
        }
        self.station.can_request_secondary(CmmRole::SecondaryTransient)
    }

    fn handle_primary_candidates(&mut self, candidates: &[Candidate]) -> bool {
        let Some(selected) = self.selector.select_network(candidates) else {
            debug!(target: T_CONNECTIVITY, "selector_declined");
            return false;
        };
        info!(
            target: T_CONNECTIVITY,
            net_id = selected.network_id,
            ssid = %selected.ssid,
            bssid = selected.candidate_bssid.as_deref().unwrap_or(""),
            "candidate_selected"
        );
        self.connect_primary_with_gate(selected);
        true
    }

    fn handle_oem_candidates(
        &mut self,
        primary_only: Vec<Candidate>,
        secondary: Vec<Candidate>,
        all: &[Candidate],
    ) -> bool {
        let Some(oem) = self
            .selector
            .select_network(&secondary)
            .filter(|c| c.oem_paid || c.oem_private)
        else {
            return self.handle_primary_candidates(all);
        };
        let primary_choice = self.selector.select_network(&primary_only);
        let bssid = if self.config.firmware_roaming {
            None
        } else {
            oem.candidate_bssid.clone()
        };
        match self
            .station
            .request_secondary(CmmRole::SecondaryLongLived, &oem.ssid, bssid.as_deref())
        {
            None => {
                info!(target: T_CONNECTIVITY, net_id = oem.network_id, "oem_secondary_unavailable");
                false
            }
            Some(cm) if cm.role == CmmRole::Primary => self.handle_primary_candidates(all),
            Some(cm) => {
                info!(target: T_CONNECTIVITY, iface = %cm.iface, net_id = oem.network_id, "oem_secondary_connect");
                if let (Some(choice), Some(primary)) = (primary_choice, self.primary_client()) {
                    self.connect_to_network(&primary, &choice, false);
                }
                self.connect_to_network(&cm, &oem, false);
                true
            }
        }
    }

    fn connect_multi_internet(&mut self, candidates: &[Candidate], clients: &[ClientModeInfo]) -> bool {
        let Some(primary) = clients
            .iter()
            .find(|c| c.role == CmmRole::Primary && c.is_connected())
        else {
            debug!(target: T_CONNECTIVITY, "multi_internet_primary_not_connected");
            return false;
        };
        let has_secondary = clients
            .iter()
            .any(|c| c.role == CmmRole::SecondaryLongLived);
        if !has_secondary && self.station.secondary_would_delete_privileged() {
            debug!(target: T_CONNECTIVITY, "multi_internet_would_delete_privileged");
            return false;
        }
        let pool = multi_internet::secondary_candidates(
            candidates,
            primary,
            self.config.multi_internet_multi_ap,
            self.config.multi_internet_dual_5ghz,
        );
        let pool = multi_internet::apply_specified_bssids(pool, &self.specified_bssids);
        let Some(selected) = self.selector.select_network(&pool) else {
            debug!(target: T_CONNECTIVITY, "multi_internet_no_candidate");
            return false;
        };
        let same_ap = primary
            .connected
            .as_ref()
            .map(|c| c.ssid == selected.ssid && c.network_id == selected.network_id)
            .unwrap_or(false);
        if same_ap && selected.static_ip {
            info!(target: T_CONNECTIVITY, net_id = selected.network_id, "multi_internet_static_ip_dbs");
            return false;
        }
        let target_bssid = selected.candidate_bssid.clone();
        let request_bssid = if self.config.firmware_roaming {
            None
        } else {
            target_bssid.clone()
        };
        match self.station.request_secondary(
            CmmRole::SecondaryLongLived,
            &selected.ssid,
            request_bssid.as_deref(),
        ) {
            None => {
                info!(target: T_CONNECTIVITY, "multi_internet_secondary_unavailable");
                true
            }
            Some(cm) if cm.role != CmmRole::SecondaryLongLived => {
                warn!(target: T_CONNECTIVITY, role = ?cm.role, "multi_internet_wrong_role");
                true
            }
            Some(cm) => {
                let mut target = selected;
                target.ephemeral = true;
                target.bssid_pin = target_bssid;
                info!(target: T_CONNECTIVITY, iface = %cm.iface, net_id = target.network_id, "multi_internet_connect");
                self.connect_to_network(&cm, &target, false);
                true
            }
        }
    }

    // ---- connecting ----

    fn connect_primary_with_gate(&mut self, candidate: WifiConfig) {
        let Some(primary) = self.primary_client() else {
            warn!(target: T_CONNECTIVITY, "no_primary_iface");
            return;
        };
        let current = match primary.connected.as_ref() {
            Some(current)
                if current.user_selected
                    && self.config.sufficiency_check
                    && self.config.ask_before_switch
                    && current.network_id != candidate.network_id =>
            {
                current.clone()
            }
            _ => {
                self.connect_to_network(&primary, &candidate, true);
                return;
            }
        };
        match self.gate.evaluate(candidate.network_id, self.now()) {
            GateDecision::Ask => {
                let net_id = candidate.network_id;
                let (id, replaced) = self.gate.open(net_id, candidate.clone());
                if let Some(old) = replaced {
                    self.dialogs.dismiss_dialog(old);
                }
                info!(target: T_CONNECTIVITY, dialog = id, net_id, "switch_dialog_shown");
                self.dialogs.show_switch_dialog(id, &current, &candidate);
            }
            decision => {
                debug!(target: T_CONNECTIVITY, net_id = candidate.network_id, ?decision, "switch_gated");
            }
        }
    }

    /// Issues the connect or roam for `target` on `client`. With
    /// `via_primary_path` set, a switch between networks may use a
    /// make-before-break transient interface.
    fn connect_to_network(
        &mut self,
        client: &ClientModeInfo,
        target: &WifiConfig,
        via_primary_path: bool,
    ) {
        let Some(candidate_bssid) = target.candidate_bssid.clone() else {
            warn!(target: T_CONNECTIVITY, net_id = target.network_id, "candidate_without_bssid");
            return;
        };
        if self.is_connected_or_connecting_to(client, target) {
            debug!(target: T_CONNECTIVITY, iface = %client.iface, net_id = target.network_id, "already_on_candidate");
            return;
        }
        let pin = target
            .bssid_pin
            .as_deref()
            .filter(|p| *p != SUPPLICANT_BSSID_ANY);
        if let Some(pin) = pin {
            if !pin.eq_ignore_ascii_case(&candidate_bssid) {
                warn!(target: T_CONNECTIVITY, pin, bssid = %candidate_bssid, "candidate_conflicts_with_pin");
                return;
            }
        }

        if self.multi_internet != MultiInternetState::None && client.role == CmmRole::Primary {
            let secondary = self
                .station
                .clients()
                .into_iter()
                .find(|c| c.role == CmmRole::SecondaryLongLived);
            if let Some(secondary) = secondary {
                if self.is_connected_or_connecting_to(&secondary, target) {
                    info!(target: T_CONNECTIVITY, iface = %secondary.iface, "secondary_yields_to_primary");
                    if let Err(err) = self.station.disconnect(&secondary.iface) {
                        warn!(target: T_CONNECTIVITY, error = %err, "secondary_disconnect_failed");
                    }
                }
            }
        }

        if let Some(current) = client.current_network() {
            let same = current.network_id == target.network_id
                || (self.config.linked_network_roaming && current.is_linked(target));
            if same {
                if !self.should_connect() {
                    return;
                }
                info!(target: T_CONNECTIVITY, iface = %client.iface, bssid = %candidate_bssid, "roam_requested");
                if let Err(err) =
                    self.station
                        .roam(&client.iface, target.network_id, &candidate_bssid)
                {
                    warn!(target: T_CONNECTIVITY, error = %err, "roam_failed");
                }
                return;
            }
        }

        let target_bssid = if self.config.firmware_roaming && !self.config.set_target_bssid && pin.is_none()
        {
            SUPPLICANT_BSSID_ANY.to_string()
        } else {
            candidate_bssid
        };

        if client.current_network().is_none() {
            self.trigger_connect(client, target, &target_bssid);
            if via_primary_path {
                self.station.stop_secondary_transients();
            }
            return;
        }

        if via_primary_path && self.config.make_before_break {
            let request_bssid = if self.config.firmware_roaming {
                None
            } else {
                Some(target_bssid.as_str())
            };
            match self.station.request_secondary(
                CmmRole::SecondaryTransient,
                &target.ssid,
                request_bssid,
            ) {
                None => {
                    info!(target: T_CONNECTIVITY, net_id = target.network_id, "mbb_unavailable");
                }
                Some(transient) => {
                    if self.is_connected_or_connecting_to(&transient, target) {
                        return;
                    }
                    info!(target: T_CONNECTIVITY, iface = %transient.iface, net_id = target.network_id, "mbb_connect");
                    self.trigger_connect(&transient, target, &target_bssid);
                }
            }
            return;
        }

        self.trigger_connect(client, target, &target_bssid);
        if via_primary_path {
            self.station.stop_secondary_transients();
        }
    }

    fn is_connected_or_connecting_to(&self, client: &ClientModeInfo, target: &WifiConfig) -> bool {
        let Some(current) = client.target_network() else {
            return false;
        };
        let same = current.network_id == target.network_id
            || (self.config.linked_network_roaming && current.is_linked(target));
        if !same || self.config.firmware_roaming {
            return same;
        }
        match (client.target_bssid(), target.candidate_bssid.as_deref()) {
            (Some(current), Some(candidate)) => current.eq_ignore_ascii_case(candidate),
            _ => false,
        }
    }

    fn trigger_connect(&mut self, client: &ClientModeInfo, target: &WifiConfig, bssid: &str) {
        if !self.should_connect() {
            return;
        }
        info!(
            target: T_CONNECTIVITY,
            iface = %client.iface,
            net_id = target.network_id,
            bssid,
            "connect_requested"
        );
        if let Err(err) = self.station.connect(&client.iface, target, bssid) {
            warn!(target: T_CONNECTIVITY, iface = %client.iface, error = %err, "connect_failed");
        }
    }

    /// Screen-off attempts are rate limited.
    fn should_connect(&mut self) -> bool {
        let now = self.now();
        if !self.screen_on && self.limiter.should_skip(now) {
            info!(target: T_CONNECTIVITY, attempts = self.limiter.len(), "connection_rate_limited");
            return false;
        }
        self.limiter.note_attempt(now);
        true
    }

    fn primary_client(&self) -> Option<ClientModeInfo> {
        self.station
            .clients()
            .into_iter()
            .find(|c| c.role == CmmRole::Primary)
    }

    fn client(&self, iface: &str) -> Option<ClientModeInfo> {
        self.station.clients().into_iter().find(|c| c.iface == iface)
    }
}
