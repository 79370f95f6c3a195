//! Framework-side network descriptions and the per-interface record table
//! that mirrors what the supplicant currently holds.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Framework id used when no network is known.
pub const INVALID_NETWORK_ID: i32 = -1;

/// Target BSSID meaning "let the supplicant pick".
pub const SUPPLICANT_BSSID_ANY: &str = "any";

/// Raw SSID bytes. Serialized as a (lossy) UTF-8 string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Ssid(Vec<u8>);

impl Ssid {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex form used by the control protocol for non-printable names.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl From<&str> for Ssid {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for Ssid {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Ssid> for String {
    fn from(value: Ssid) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityType {
    Open,
    Owe,
    Wep,
    Psk,
    Sae,
    Eap,
    EapWpa3Enterprise,
    EapSuiteB192,
    WapiPsk,
    WapiCert,
    Dpp,
}

impl SecurityType {
    pub fn is_enterprise(self) -> bool {
        matches!(
            self,
            SecurityType::Eap
                | SecurityType::EapWpa3Enterprise
                | SecurityType::EapSuiteB192
                | SecurityType::WapiCert
        )
    }

    /// Pre-shared-key families where a failed 4-way handshake means a bad key.
    pub fn is_psk_like(self) -> bool {
        matches!(self, SecurityType::Psk | SecurityType::WapiPsk)
    }

    /// PMK caching only applies to EAP and SAE associations.
    pub fn supports_pmk_cache(self) -> bool {
        self.is_enterprise() || self == SecurityType::Sae
    }

    pub fn key_mgmt(self) -> &'static str {
        match self {
            SecurityType::Open | SecurityType::Wep => "NONE",
            SecurityType::Owe => "OWE",
            SecurityType::Psk => "WPA-PSK",
            SecurityType::Sae => "SAE",
            SecurityType::Eap => "WPA-EAP",
            SecurityType::EapWpa3Enterprise => "WPA-EAP-SHA256",
            SecurityType::EapSuiteB192 => "WPA-EAP-SUITE-B-192",
            SecurityType::WapiPsk => "WAPI-PSK",
            SecurityType::WapiCert => "WAPI-CERT",
            SecurityType::Dpp => "DPP",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_mgmt())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EapMethod {
    Peap,
    Tls,
    Ttls,
    Pwd,
    Sim,
    Aka,
    AkaPrime,
}

impl EapMethod {
    pub fn is_sim_based(self) -> bool {
        matches!(self, EapMethod::Sim | EapMethod::Aka | EapMethod::AkaPrime)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EapMethod::Peap => "PEAP",
            EapMethod::Tls => "TLS",
            EapMethod::Ttls => "TTLS",
            EapMethod::Pwd => "PWD",
            EapMethod::Sim => "SIM",
            EapMethod::Aka => "AKA",
            EapMethod::AkaPrime => "AKA'",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapConfig {
    pub method: EapMethod,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub anonymous_identity: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ca_cert: Option<String>,
}

/// Secrets pushed to the supplicant. Any change forces a remove and re-add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub psk: Option<String>,
    pub sae_password: Option<String>,
    pub wep_keys: Vec<String>,
    pub eap: Option<EapConfig>,
}

/// The framework's desired configuration for one network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub network_id: i32,
    pub ssid: Ssid,
    /// Other encodings of the same name, tried in order when the primary is
    /// not found.
    pub alternate_ssids: Vec<Ssid>,
    pub security_types: Vec<SecurityType>,
    /// Security type chosen by network selection for this attempt.
    pub candidate_security: Option<SecurityType>,
    pub credentials: Credentials,
    /// User-configured AP pin.
    pub bssid_pin: Option<String>,
    /// BSSID chosen for this attempt; pushed with `setBssid`.
    pub selection_bssid: Option<String>,
    /// Scan result that produced this candidate.
    pub candidate_bssid: Option<String>,
    pub candidate_frequency_mhz: Option<u32>,
    pub hidden: bool,
    pub ever_connected: bool,
    pub last_connected_ms: u64,
    pub ephemeral: bool,
    pub passpoint: bool,
    pub fqdn: Option<String>,
    pub allow_autojoin: bool,
    pub enabled: bool,
    pub user_selected: bool,
    pub admin_restricted: bool,
    pub carrier_id: Option<i32>,
    pub carrier_offload_disabled: bool,
    pub static_ip: bool,
    pub oem_paid: bool,
    pub oem_private: bool,
    pub wifi7_enabled: bool,
    /// Profile keys of networks roamable as one with this one.
    pub linked_profile_keys: Vec<String>,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            network_id: INVALID_NETWORK_ID,
            ssid: Ssid::default(),
            alternate_ssids: Vec::new(),
            security_types: Vec::new(),
            candidate_security: None,
            credentials: Credentials::default(),
            bssid_pin: None,
            selection_bssid: None,
            candidate_bssid: None,
            candidate_frequency_mhz: None,
            hidden: false,
            ever_connected: false,
            last_connected_ms: 0,
            ephemeral: false,
            passpoint: false,
            fqdn: None,
            allow_autojoin: true,
            enabled: true,
            user_selected: false,
            admin_restricted: false,
            carrier_id: None,
            carrier_offload_disabled: false,
            static_ip: false,
            oem_paid: false,
            oem_private: false,
            wifi7_enabled: true,
            linked_profile_keys: Vec::new(),
        }
    }
}

impl WifiConfig {
    pub fn new(network_id: i32, ssid: impl Into<Ssid>, security: SecurityType) -> Self {
        Self {
            network_id,
            ssid: ssid.into(),
            security_types: vec![security],
            ..Self::default()
        }
    }

    /// Security used for this attempt: the selected candidate, or the
    /// first configured type.
    pub fn effective_security(&self) -> Option<SecurityType> {
        self.candidate_security
            .or_else(|| self.security_types.first().copied())
    }

    pub fn is_enterprise(&self) -> bool {
        self.effective_security()
            .map(SecurityType::is_enterprise)
            .unwrap_or(false)
    }

    pub fn is_sim_based_eap(&self) -> bool {
        self.credentials
            .eap
            .as_ref()
            .map(|eap| eap.method.is_sim_based())
            .unwrap_or(false)
    }

    /// Stable identity across framework id changes.
    pub fn profile_key(&self) -> String {
        let security = self
            .security_types
            .first()
            .map(|s| s.key_mgmt())
            .unwrap_or("NONE");
        match (&self.fqdn, self.passpoint) {
            (Some(fqdn), true) => format!("{fqdn}:PASSPOINT"),
            _ => format!("\"{}\"{}", self.ssid, security),
        }
    }

    /// Key used by temporary user disables: FQDN for passpoint, SSID otherwise.
    pub fn disable_key(&self) -> String {
        match (&self.fqdn, self.passpoint) {
            (Some(fqdn), true) => fqdn.clone(),
            _ => self.ssid.to_string(),
        }
    }

    pub fn is_linked(&self, other: &WifiConfig) -> bool {
        self.linked_profile_keys.contains(&other.profile_key())
    }

    /// True when the supplicant copy can be updated in place rather than
    /// replaced.
    pub fn is_same_network(&self, other: &WifiConfig) -> bool {
        self.network_id == other.network_id
            && self.ssid == other.ssid
            && self.effective_security() == other.effective_security()
            && self.credentials == other.credentials
            && self.wifi7_enabled == other.wifi7_enabled
    }

    /// All names this network may be advertised under.
    pub fn all_ssids(&self) -> Vec<Ssid> {
        let mut ssids = vec![self.ssid.clone()];
        for alt in &self.alternate_ssids {
            if !ssids.contains(alt) {
                ssids.push(alt.clone());
            }
        }
        ssids
    }
}

/// One network the supplicant holds on behalf of the framework.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRecord {
    pub remote_id: i32,
    pub config: WifiConfig,
    /// SSID actually pushed, which may be an alternate encoding.
    pub active_ssid: Ssid,
    pub anonymous_identity: Option<String>,
}

impl NetworkRecord {
    pub fn new(remote_id: i32, config: WifiConfig, active_ssid: Ssid) -> Self {
        let anonymous_identity = config
            .credentials
            .eap
            .as_ref()
            .and_then(|eap| eap.anonymous_identity.clone());
        Self {
            remote_id,
            config,
            active_ssid,
            anonymous_identity,
        }
    }

    pub fn framework_id(&self) -> i32 {
        self.config.network_id
    }

    pub fn security(&self) -> Option<SecurityType> {
        self.config.effective_security()
    }

    pub fn bssid_pin(&self) -> Option<&str> {
        self.config.selection_bssid.as_deref()
    }

    pub fn ever_connected(&self) -> bool {
        self.config.ever_connected
    }
}

/// Records for one interface: the current network plus linked ones.
#[derive(Debug, Default)]
pub struct InterfaceRecords {
    current: Option<NetworkRecord>,
    linked: HashMap<String, NetworkRecord>,
}

impl InterfaceRecords {
    pub fn current(&self) -> Option<&NetworkRecord> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut NetworkRecord> {
        self.current.as_mut()
    }

    pub fn set_current(&mut self, record: NetworkRecord) {
        self.current = Some(record);
    }

    pub fn clear_current(&mut self) -> Option<NetworkRecord> {
        self.current.take()
    }

    pub fn linked(&self) -> &HashMap<String, NetworkRecord> {
        &self.linked
    }

    pub fn insert_linked(&mut self, profile_key: String, record: NetworkRecord) {
        self.linked.insert(profile_key, record);
    }

    pub fn retain_linked(&mut self, keep: impl Fn(&str) -> bool) {
        self.linked.retain(|key, _| keep(key));
    }

    pub fn clear_linked(&mut self) {
        self.linked.clear();
    }

    /// Remote ids of every network the supplicant should hold.
    pub fn remote_ids(&self) -> Vec<i32> {
        self.current
            .iter()
            .chain(self.linked.values())
            .map(|record| record.remote_id)
            .collect()
    }

    /// Framework id for a remote id, whether current or linked.
    pub fn framework_id_for_remote(&self, remote_id: i32) -> Option<i32> {
        self.current
            .iter()
            .chain(self.linked.values())
            .find(|record| record.remote_id == remote_id)
            .map(NetworkRecord::framework_id)
    }

    /// Make the linked record for `network_id` current, moving the old
    /// current record into the linked set. Returns false when nothing matched.
    pub fn promote_linked(&mut self, network_id: i32) -> bool {
        let Some(key) = self
            .linked
            .iter()
            .find(|(_, record)| record.framework_id() == network_id)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        let Some(promoted) = self.linked.remove(&key) else {
            return false;
        };
        if let Some(previous) = self.current.replace(promoted) {
            self.linked.insert(previous.config.profile_key(), previous);
        }
        true
    }
}

/// Cached PMKSA entry for a framework network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmkCacheEntry {
    pub blob: Vec<u8>,
    /// Expiry on the session clock.
    pub expires_at_ms: u64,
}

/// PMK cache keyed by framework network id.
#[derive(Debug, Default)]
pub struct PmkCache {
    entries: HashMap<i32, Vec<PmkCacheEntry>>,
}

impl PmkCache {
    pub fn add(&mut self, network_id: i32, entry: PmkCacheEntry) {
        let list = self.entries.entry(network_id).or_default();
        list.retain(|existing| existing.blob != entry.blob);
        list.push(entry);
    }

    /// Live entries for a network; expired ones are dropped on the way.
    pub fn live_entries(&mut self, network_id: i32, now_ms: u64) -> Vec<PmkCacheEntry> {
        let Some(list) = self.entries.get_mut(&network_id) else {
            return Vec::new();
        };
        list.retain(|entry| entry.expires_at_ms > now_ms);
        let live = list.clone();
        if list.is_empty() {
            self.entries.remove(&network_id);
        }
        live
    }

    pub fn remove(&mut self, network_id: i32) -> bool {
        self.entries.remove(&network_id).is_some()
    }

    pub fn contains(&self, network_id: i32) -> bool {
        self.entries.contains_key(&network_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psk(id: i32, ssid: &str) -> WifiConfig {
        let mut config = WifiConfig::new(id, ssid, SecurityType::Psk);
        config.credentials.psk = Some("password".to_string());
        config
    }

    #[test]
    fn same_network_ignores_bssid_but_not_credentials() {
        let a = psk(2, "A");
        let mut b = a.clone();
        b.selection_bssid = Some("aa:bb:cc:dd:ee:ff".to_string());
        assert!(a.is_same_network(&b));

        b.credentials.psk = Some("other".to_string());
        assert!(!a.is_same_network(&b));
        assert!(!a.is_same_network(&psk(2, "B")));
    }

    #[test]
    fn pmk_policy_covers_eap_and_sae_only() {
        assert!(SecurityType::Eap.supports_pmk_cache());
        assert!(SecurityType::EapSuiteB192.supports_pmk_cache());
        assert!(SecurityType::Sae.supports_pmk_cache());
        assert!(!SecurityType::Psk.supports_pmk_cache());
        assert!(!SecurityType::Dpp.supports_pmk_cache());
        assert!(!SecurityType::Open.supports_pmk_cache());
    }

    #[test]
    fn promote_linked_swaps_current() {
        let mut records = InterfaceRecords::default();
        records.set_current(NetworkRecord::new(0, psk(1, "A"), Ssid::from("A")));
        let linked = psk(5, "A-5G");
        records.insert_linked(linked.profile_key(), NetworkRecord::new(1, linked, "A-5G".into()));

        assert!(!records.promote_linked(9));
        assert!(records.promote_linked(5));
        assert_eq!(records.current().map(|r| r.remote_id), Some(1));
        assert_eq!(records.framework_id_for_remote(0), Some(1));
        let mut ids = records.remote_ids();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn pmk_cache_drops_expired_entries() {
        let mut cache = PmkCache::default();
        cache.add(3, PmkCacheEntry { blob: vec![1], expires_at_ms: 100 });
        cache.add(3, PmkCacheEntry { blob: vec![2], expires_at_ms: 500 });
        cache.add(3, PmkCacheEntry { blob: vec![2], expires_at_ms: 900 });

        let live = cache.live_entries(3, 200);
        assert_eq!(live, vec![PmkCacheEntry { blob: vec![2], expires_at_ms: 900 }]);
        assert!(cache.live_entries(3, 1000).is_empty());
        assert!(!cache.contains(3));
    }

    #[test]
    fn ssid_serializes_as_string() {
        let config = psk(1, "Cafe");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"ssid\":\"Cafe\""));
        let back: WifiConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
