//! Typed daemon callbacks (input) and connectivity events (output).

use std::fmt;

use crate::qos::QosPolicyScsData;
use crate::records::{PmkCacheEntry, Ssid};

/// Supplicant connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaState {
    /// Not connected
    Disconnected,
    /// Interface administratively down
    InterfaceDisabled,
    /// No enabled networks
    Inactive,
    /// Scanning for networks
    Scanning,
    /// Authenticating
    Authenticating,
    /// Associating
    Associating,
    /// Associated but not yet authenticated
    Associated,
    /// 4-way handshake in progress
    FourwayHandshake,
    /// Group handshake in progress
    GroupHandshake,
    /// Fully connected
    Completed,
}

impl fmt::Display for StaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StaState::Disconnected => "DISCONNECTED",
            StaState::InterfaceDisabled => "INTERFACE_DISABLED",
            StaState::Inactive => "INACTIVE",
            StaState::Scanning => "SCANNING",
            StaState::Authenticating => "AUTHENTICATING",
            StaState::Associating => "ASSOCIATING",
            StaState::Associated => "ASSOCIATED",
            StaState::FourwayHandshake => "4WAY_HANDSHAKE",
            StaState::GroupHandshake => "GROUP_HANDSHAKE",
            StaState::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

impl StaState {
    pub fn parse(s: &str) -> Option<Self> {
        let state = match s.to_ascii_uppercase().as_str() {
            "DISCONNECTED" => StaState::Disconnected,
            "INTERFACE_DISABLED" => StaState::InterfaceDisabled,
            "INACTIVE" => StaState::Inactive,
            "SCANNING" => StaState::Scanning,
            "AUTHENTICATING" => StaState::Authenticating,
            "ASSOCIATING" => StaState::Associating,
            "ASSOCIATED" => StaState::Associated,
            "4WAY_HANDSHAKE" => StaState::FourwayHandshake,
            "GROUP_HANDSHAKE" => StaState::GroupHandshake,
            "COMPLETED" => StaState::Completed,
            _ => return None,
        };
        Some(state)
    }

    /// Numeric `wpa_states` value used in `CTRL-EVENT-STATE-CHANGE`.
    pub fn from_wpa_code(code: u8) -> Option<Self> {
        let state = match code {
            0 => StaState::Disconnected,
            1 => StaState::InterfaceDisabled,
            2 => StaState::Inactive,
            3 => StaState::Scanning,
            4 => StaState::Authenticating,
            5 => StaState::Associating,
            6 => StaState::Associated,
            7 => StaState::FourwayHandshake,
            8 => StaState::GroupHandshake,
            9 => StaState::Completed,
            _ => return None,
        };
        Some(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BssidChangeReason {
    AssocStart,
    AssocComplete,
    Disassoc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OceRssiBasedAssocRejectInfo {
    pub delta_rssi: i32,
    pub retry_delay_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboAssocDisallowedInfo {
    pub reason_code: u8,
}

/// Raw event as delivered by the remote daemon for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCallback {
    StateChanged {
        state: StaState,
        bssid: Option<String>,
        remote_network_id: i32,
        ssid: Ssid,
    },
    Disconnected {
        bssid: Option<String>,
        locally_generated: bool,
        reason: u16,
    },
    AssociationRejected {
        ssid: Ssid,
        bssid: Option<String>,
        status_code: u16,
        timed_out: bool,
        oce_rssi_reject: Option<OceRssiBasedAssocRejectInfo>,
        mbo_disallowed: Option<MboAssocDisallowedInfo>,
    },
    AuthenticationTimeout {
        bssid: Option<String>,
    },
    EapFailure {
        bssid: Option<String>,
        error_code: i32,
    },
    NetworkNotFound {
        ssid: Ssid,
    },
    NetworkRemoved {
        remote_network_id: i32,
    },
    BssidChanged {
        reason: BssidChangeReason,
        bssid: String,
    },
    BssFrequencyChanged {
        frequency_mhz: u32,
    },
    PmkSaCacheAdded {
        expiration_ms: u64,
        blob: Vec<u8>,
    },
    EapIdentityRequest {
        remote_network_id: i32,
    },
    QosPolicyRequest {
        request_id: i32,
        policies: Vec<QosPolicyScsData>,
    },
}

/// Normalized association rejection, forwarded for every rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssocRejectInfo {
    pub ssid: String,
    pub bssid: Option<String>,
    pub status_code: u16,
    pub timed_out: bool,
    pub oce_rssi_reject: Option<OceRssiBasedAssocRejectInfo>,
    pub mbo_disallowed: Option<MboAssocDisallowedInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureReason {
    Timeout,
    WrongPassword,
    EapFailure,
}

/// EAP error code carried when no specific code is known.
pub const EAP_ERROR_NONE: i32 = -1;

/// Higher-level event published to the connectivity side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupplicantEvent {
    StateChanged {
        iface: String,
        state: StaState,
        network_id: i32,
        bssid: Option<String>,
        ssid: String,
    },
    Disconnection {
        iface: String,
        bssid: Option<String>,
        locally_generated: bool,
        reason: u16,
    },
    AssociationRejection {
        iface: String,
        network_id: i32,
        info: AssocRejectInfo,
    },
    AuthenticationFailure {
        iface: String,
        network_id: i32,
        reason: AuthFailureReason,
        error_code: i32,
        bssid: Option<String>,
    },
    NetworkNotFound {
        iface: String,
        network_id: i32,
        ssid: String,
    },
    TargetBssid {
        iface: String,
        bssid: String,
    },
    AssociatedBssid {
        iface: String,
        bssid: String,
    },
    BssFrequencyChanged {
        iface: String,
        frequency_mhz: u32,
    },
    PmkCacheAdded {
        iface: String,
        network_id: i32,
        entry: PmkCacheEntry,
    },
    EapIdentityRequest {
        iface: String,
        network_id: i32,
    },
    QosPolicyRequest {
        iface: String,
        request_id: i32,
        policies: Vec<QosPolicyScsData>,
    },
}

impl SupplicantEvent {
    pub fn iface(&self) -> &str {
        match self {
            SupplicantEvent::StateChanged { iface, .. }
            | SupplicantEvent::Disconnection { iface, .. }
            | SupplicantEvent::AssociationRejection { iface, .. }
            | SupplicantEvent::AuthenticationFailure { iface, .. }
            | SupplicantEvent::NetworkNotFound { iface, .. }
            | SupplicantEvent::TargetBssid { iface, .. }
            | SupplicantEvent::AssociatedBssid { iface, .. }
            | SupplicantEvent::BssFrequencyChanged { iface, .. }
            | SupplicantEvent::PmkCacheAdded { iface, .. }
            | SupplicantEvent::EapIdentityRequest { iface, .. }
            | SupplicantEvent::QosPolicyRequest { iface, .. } => iface,
        }
    }
}

/// Where the session publishes classified events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: SupplicantEvent);
}
