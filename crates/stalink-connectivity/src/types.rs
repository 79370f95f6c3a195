use std::fmt;

use serde::{Deserialize, Serialize};
use stalink_supplicant::{SecurityType, Ssid, WifiConfig};

/// Connection state of the primary interface as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    Unknown,
    Connected,
    Disconnected,
    Transitioning,
}

impl fmt::Display for WifiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WifiState::Unknown => "unknown",
            WifiState::Connected => "connected",
            WifiState::Disconnected => "disconnected",
            WifiState::Transitioning => "transitioning",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityState {
    Unknown,
    HighMovement,
    LowMovement,
    Stationary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    LowLatency,
    LowPower,
    HighAccuracy,
}

impl ScanType {
    /// Parses `low_latency`, `low_power`, `high_accuracy` or the numeric
    /// codes 0, 1 and 2.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "low_latency" => Some(ScanType::LowLatency),
            "1" | "low_power" => Some(ScanType::LowPower),
            "2" | "high_accuracy" => Some(ScanType::HighAccuracy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Ghz24,
    Ghz5,
    Ghz6,
    Ghz60,
    Unknown,
}

impl Band {
    pub fn from_frequency(mhz: u32) -> Self {
        match mhz {
            2412..=2484 => Band::Ghz24,
            5160..=5885 => Band::Ghz5,
            5955..=7115 => Band::Ghz6,
            58320..=70200 => Band::Ghz60,
            _ => Band::Unknown,
        }
    }
}

/// Role of one client-mode interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmmRole {
    Primary,
    SecondaryLongLived,
    SecondaryTransient,
    ScanOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ssid: Ssid,
    pub bssid: String,
    pub frequency_mhz: u32,
    pub rssi_dbm: i32,
    pub security: Vec<SecurityType>,
}

/// One batch of results delivered by the scan provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanData {
    pub results: Vec<ScanResult>,
    /// The scan covered every band rather than a channel list.
    pub full_band: bool,
}

/// Settings for one single scan. An empty channel list scans all bands.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub scan_type: ScanType,
    pub channels: Vec<u32>,
    pub hidden_ssids: Vec<Ssid>,
}

impl ScanRequest {
    pub fn is_full_band(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Identity of one scored candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateKey {
    pub ssid: Ssid,
    pub bssid: String,
    pub network_id: i32,
    pub security: SecurityType,
}

impl CandidateKey {
    /// Same network for selection purposes: name and security match,
    /// whatever the access point.
    pub fn matches_network(&self, config: &WifiConfig) -> bool {
        self.ssid == config.ssid && config.security_types.contains(&self.security)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: CandidateKey,
    pub scan_rssi: i32,
    pub frequency_mhz: u32,
    pub oem_paid: bool,
    pub oem_private: bool,
    pub passpoint: bool,
}

impl Candidate {
    pub fn is_oem_restricted(&self) -> bool {
        self.oem_paid || self.oem_private
    }
}

/// State of one client-mode interface the engine may connect on.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientModeInfo {
    pub iface: String,
    pub role: CmmRole,
    pub connected: Option<WifiConfig>,
    pub connected_bssid: Option<String>,
    pub connecting: Option<WifiConfig>,
    pub connecting_bssid: Option<String>,
    /// Frequency of the current association, if any.
    pub frequency_mhz: Option<u32>,
    /// Link quality is good enough that a full scan is not needed.
    pub sufficient: bool,
    /// BSSIDs of the other links of a multi-link association.
    pub affiliated_bssids: Vec<String>,
}

impl ClientModeInfo {
    pub fn new(iface: impl Into<String>, role: CmmRole) -> Self {
        Self {
            iface: iface.into(),
            role,
            connected: None,
            connected_bssid: None,
            connecting: None,
            connecting_bssid: None,
            frequency_mhz: None,
            sufficient: false,
            affiliated_bssids: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    /// Network being connected to, else the connected one.
    pub fn target_network(&self) -> Option<&WifiConfig> {
        self.connecting.as_ref().or(self.connected.as_ref())
    }

    pub fn target_bssid(&self) -> Option<&str> {
        self.connecting_bssid
            .as_deref()
            .or(self.connected_bssid.as_deref())
    }

    /// Connected network, else the one being connected to.
    pub fn current_network(&self) -> Option<&WifiConfig> {
        self.connected.as_ref().or(self.connecting.as_ref())
    }

    pub fn current_bssid(&self) -> Option<&str> {
        self.connected_bssid
            .as_deref()
            .or(self.connecting_bssid.as_deref())
    }
}

/// Why a connection attempt ended without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    AssociationRejection,
    AuthenticationFailure,
    EapFailure,
    NetworkNotFound,
    Timeout,
    Other,
}

impl FailureReason {
    /// Failures after which the cached candidates are not retried.
    pub fn stops_retry(self) -> bool {
        matches!(self, FailureReason::NetworkNotFound | FailureReason::Timeout)
    }
}

/// Outcome reported by [`crate::ConnectivityEngine::handle_connection_attempt_ended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(FailureReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_from_frequency_covers_edges() {
        assert_eq!(Band::from_frequency(2412), Band::Ghz24);
        assert_eq!(Band::from_frequency(2484), Band::Ghz24);
        assert_eq!(Band::from_frequency(5180), Band::Ghz5);
        assert_eq!(Band::from_frequency(5885), Band::Ghz5);
        assert_eq!(Band::from_frequency(5955), Band::Ghz6);
        assert_eq!(Band::from_frequency(60480), Band::Ghz60);
        assert_eq!(Band::from_frequency(900), Band::Unknown);
    }

    #[test]
    fn scan_type_accepts_names_and_codes() {
        assert_eq!(ScanType::parse("2"), Some(ScanType::HighAccuracy));
        assert_eq!(ScanType::parse(" Low_Power "), Some(ScanType::LowPower));
        assert_eq!(ScanType::parse("fast"), None);
    }

    #[test]
    fn current_and_target_prefer_different_sides() {
        let mut info = ClientModeInfo::new("wlan0", CmmRole::Primary);
        info.connected = Some(WifiConfig::new(1, "home", SecurityType::Psk));
        info.connecting = Some(WifiConfig::new(2, "work", SecurityType::Psk));
        assert_eq!(info.current_network().map(|c| c.network_id), Some(1));
        assert_eq!(info.target_network().map(|c| c.network_id), Some(2));
    }
}
