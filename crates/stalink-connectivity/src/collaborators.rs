//! Contracts the engine consumes. Production and test implementations are
//! injected as `Arc<dyn ..>` at construction.

use std::collections::HashSet;

use stalink_supplicant::{SecurityType, Ssid, WifiConfig};

use crate::dialog::DialogId;
use crate::error::Result;
use crate::pno::PnoRequest;
use crate::types::{Candidate, ClientModeInfo, CmmRole, ScanRequest, ScanResult};

/// Radio scan execution. Results come back through the engine's
/// `on_scan_results` / `on_pno_results` entry points.
pub trait ScanProvider: Send + Sync {
    fn start_scan(&self, request: &ScanRequest) -> Result<()>;
    fn start_pno_scan(&self, request: &PnoRequest) -> Result<()>;
    fn stop_pno_scan(&self);
}

/// Inputs to candidate scoring beyond the scan results themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionContext {
    pub blocked_bssids: HashSet<String>,
    pub clients: Vec<ClientModeInfo>,
    pub untrusted_allowed: bool,
    pub oem_paid_allowed: bool,
    pub oem_private_allowed: bool,
    pub restricted_uids: Vec<u32>,
    pub skip_sufficiency_check: bool,
    pub autojoin_disallowed_security: Vec<SecurityType>,
}

pub trait NetworkSelector: Send + Sync {
    fn candidates_from_scan(
        &self,
        results: &[ScanResult],
        ctx: &SelectionContext,
    ) -> Vec<Candidate>;

    /// Best network among `candidates`, with `candidate_bssid` and
    /// `candidate_frequency_mhz` filled from the winning scan result.
    fn select_network(&self, candidates: &[Candidate]) -> Option<WifiConfig>;

    /// Whether the interface would benefit from a new selection at all.
    fn needs_selection(&self, client: &ClientModeInfo) -> bool;
}

pub trait ConfigStore: Send + Sync {
    /// Saved, passpoint and suggestion networks.
    fn saved_networks(&self) -> Vec<WifiConfig>;
    fn configured_network(&self, network_id: i32) -> Option<WifiConfig>;
    /// `key` is the FQDN for passpoint networks and the SSID otherwise.
    fn is_temporarily_disabled_by_user(&self, key: &str) -> bool;
    fn enable_temporarily_disabled_networks(&self);
    fn clear_user_temporarily_disabled(&self);
    fn remove_all_ephemeral_or_passpoint_networks(&self);
    /// Frequencies the network was seen on within `max_age_ms`, most
    /// recent first.
    fn frequency_history(&self, ssid: &Ssid, max_age_ms: u64) -> Vec<u32>;
    fn is_sim_ready(&self, carrier_id: i32) -> bool;
}

pub trait DialogProvider: Send + Sync {
    fn show_switch_dialog(&self, id: DialogId, current: &WifiConfig, candidate: &WifiConfig);
    fn dismiss_dialog(&self, id: DialogId);
}

/// Client-mode interfaces: state and connect/roam primitives.
pub trait StationControl: Send + Sync {
    fn clients(&self) -> Vec<ClientModeInfo>;
    fn connect(&self, iface: &str, config: &WifiConfig, target_bssid: &str) -> Result<()>;
    fn roam(&self, iface: &str, network_id: i32, target_bssid: &str) -> Result<()>;
    fn disconnect(&self, iface: &str) -> Result<()>;
    fn can_request_secondary(&self, role: CmmRole) -> bool;
    /// True if bringing up another station interface would tear down a
    /// higher-priority one.
    fn secondary_would_delete_privileged(&self) -> bool;
    /// Brings up (or reuses) an interface in `role`. `None` when the
    /// interface cannot be provided.
    fn request_secondary(
        &self,
        role: CmmRole,
        ssid: &Ssid,
        bssid: Option<&str>,
    ) -> Option<ClientModeInfo>;
    fn stop_secondary_transients(&self);
    fn on_network_switch_accepted(&self, network_id: i32, bssid: Option<&str>);
    fn on_network_switch_rejected(&self, network_id: i32, bssid: Option<&str>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    PeriodicScan,
    RestartSingleScan,
    RestartConnectivityScan,
    DelayedPartialScan,
    PnoNetworkChange,
    DelayedScreenOnScan,
}

impl TimerKind {
    pub const ALL: [TimerKind; 6] = [
        TimerKind::PeriodicScan,
        TimerKind::RestartSingleScan,
        TimerKind::RestartConnectivityScan,
        TimerKind::DelayedPartialScan,
        TimerKind::PnoNetworkChange,
        TimerKind::DelayedScreenOnScan,
    ];
}

/// Single-shot timers. Scheduling a kind replaces its pending timer.
pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, kind: TimerKind, delay_ms: u64);
    fn cancel(&self, kind: TimerKind);
}
