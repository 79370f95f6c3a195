//! Network list for preferred-network-offload (background) scans.

use std::collections::HashSet;

use stalink_supplicant::{SecurityType, Ssid, WifiConfig};

use crate::channels::add_limited;
use crate::collaborators::ConfigStore;

#[derive(Debug, Clone, PartialEq)]
pub struct PnoNetwork {
    pub ssid: Ssid,
    pub security: Vec<SecurityType>,
    pub hidden: bool,
    pub passpoint: bool,
    /// Channel hint; empty means scan everything.
    pub frequencies: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PnoRequest {
    pub interval_ms: u64,
    pub connected: bool,
    pub networks: Vec<PnoNetwork>,
}

/// SSIDs an app asked to be included in background scans.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPnoRequest {
    pub uid: u32,
    pub package: String,
    pub ssids: Vec<Ssid>,
    pub frequencies: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalPnoRequests {
    current: Option<ExternalPnoRequest>,
}

impl ExternalPnoRequests {
    /// Installs a request. Only one app may hold a request; returns false if
    /// another uid already does.
    pub fn set(&mut self, request: ExternalPnoRequest) -> bool {
        if let Some(current) = &self.current {
            if current.uid != request.uid {
                return false;
            }
        }
        self.current = Some(request);
        true
    }

    pub fn remove(&mut self, uid: u32) -> bool {
        if self.current.as_ref().map(|r| r.uid) == Some(uid) {
            self.current = None;
            return true;
        }
        false
    }

    pub fn current(&self) -> Option<&ExternalPnoRequest> {
        self.current.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PnoListSettings {
    pub location_enabled: bool,
    pub frequency_culling: bool,
    pub merge_passpoint: bool,
    pub max_prioritized_passpoint: usize,
    pub max_freqs_per_network: usize,
    pub max_freqs_total: usize,
    pub frequency_age_ms: u64,
}

/// Saved networks worth scanning for in the background, most recently
/// connected first.
pub fn scan_optimization_networks(store: &dyn ConfigStore) -> Vec<WifiConfig> {
    let mut networks: Vec<WifiConfig> = store
        .saved_networks()
        .into_iter()
        .filter(|config| is_pno_eligible(store, config))
        .collect();
    networks.sort_by(|a, b| b.last_connected_ms.cmp(&a.last_connected_ms));
    networks
}

fn is_pno_eligible(store: &dyn ConfigStore, config: &WifiConfig) -> bool {
    if !config.allow_autojoin || !config.enabled || config.admin_restricted {
        return false;
    }
    if !config.ephemeral && !config.ever_connected {
        return false;
    }
    if store.is_temporarily_disabled_by_user(&config.disable_key()) {
        return false;
    }
    if config.is_sim_based_eap() {
        if let Some(carrier_id) = config.carrier_id {
            if !store.is_sim_ready(carrier_id) {
                return false;
            }
        }
    }
    !config.carrier_offload_disabled
}

/// Passpoint networks go first up to the prioritized count, then the
/// standard networks, then the remaining passpoint ones.
fn merge_passpoint(networks: Vec<WifiConfig>, max_prioritized: usize) -> Vec<WifiConfig> {
    let (passpoint, standard): (Vec<_>, Vec<_>) =
        networks.into_iter().partition(|config| config.passpoint);
    let head = max_prioritized.min(passpoint.len());
    let mut merged = Vec::with_capacity(passpoint.len() + standard.len());
    let mut passpoint = passpoint.into_iter();
    merged.extend(passpoint.by_ref().take(head));
    merged.extend(standard);
    merged.extend(passpoint);
    merged
}

pub fn build_pno_list(
    store: &dyn ConfigStore,
    external: Option<&ExternalPnoRequest>,
    settings: &PnoListSettings,
) -> Vec<PnoNetwork> {
    let mut networks = scan_optimization_networks(store);
    let external = external.filter(|_| settings.location_enabled);
    if networks.is_empty() && external.map(|r| r.ssids.is_empty()).unwrap_or(true) {
        return Vec::new();
    }
    if settings.merge_passpoint {
        networks = merge_passpoint(networks, settings.max_prioritized_passpoint);
    }

    let mut list = Vec::new();
    let mut seen: HashSet<Ssid> = HashSet::new();
    let mut total_freqs = 0usize;

    if let Some(request) = external {
        for ssid in &request.ssids {
            if !seen.insert(ssid.clone()) {
                continue;
            }
            let mut frequencies = Vec::new();
            if settings.frequency_culling {
                frequencies = culled_frequencies(store, ssid, settings, &mut total_freqs);
                add_limited(&mut frequencies, request.frequencies.iter().copied(), 0, 0);
            }
            list.push(PnoNetwork {
                ssid: ssid.clone(),
                security: Vec::new(),
                hidden: false,
                passpoint: false,
                frequencies,
            });
        }
    }

    for config in &networks {
        for ssid in config.all_ssids() {
            if !seen.insert(ssid.clone()) {
                continue;
            }
            let frequencies = if settings.frequency_culling {
                culled_frequencies(store, &config.ssid, settings, &mut total_freqs)
            } else {
                Vec::new()
            };
            list.push(PnoNetwork {
                ssid,
                security: config.security_types.clone(),
                hidden: config.hidden,
                passpoint: config.passpoint,
                frequencies,
            });
        }
    }
    list
}

fn culled_frequencies(
    store: &dyn ConfigStore,
    ssid: &Ssid,
    settings: &PnoListSettings,
    total: &mut usize,
) -> Vec<u32> {
    let remaining = if settings.max_freqs_total == 0 {
        usize::MAX
    } else {
        settings.max_freqs_total.saturating_sub(*total)
    };
    let per_network = if settings.max_freqs_per_network == 0 {
        remaining
    } else {
        settings.max_freqs_per_network.min(remaining)
    };
    if per_network == 0 {
        return Vec::new();
    }
    let mut frequencies = Vec::new();
    add_limited(
        &mut frequencies,
        store.frequency_history(ssid, settings.frequency_age_ms),
        per_network,
        0,
    );
    *total += frequencies.len();
    frequencies
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        networks: Vec<WifiConfig>,
        user_disabled: HashSet<String>,
        sim_ready: bool,
        history: HashMap<String, Vec<u32>>,
        history_calls: Mutex<Vec<String>>,
    }

    impl ConfigStore for FakeStore {
        fn saved_networks(&self) -> Vec<WifiConfig> {
            self.networks.clone()
        }
        fn configured_network(&self, network_id: i32) -> Option<WifiConfig> {
            self.networks
                .iter()
                .find(|n| n.network_id == network_id)
                .cloned()
        }
        fn is_temporarily_disabled_by_user(&self, key: &str) -> bool {
            self.user_disabled.contains(key)
        }
        fn enable_temporarily_disabled_networks(&self) {}
        fn clear_user_temporarily_disabled(&self) {}
        fn remove_all_ephemeral_or_passpoint_networks(&self) {}
        fn frequency_history(&self, ssid: &Ssid, _max_age_ms: u64) -> Vec<u32> {
            self.history_calls.lock().unwrap().push(ssid.to_string());
            self.history.get(&ssid.to_string()).cloned().unwrap_or_default()
        }
        fn is_sim_ready(&self, _carrier_id: i32) -> bool {
            self.sim_ready
        }
    }

    fn network(id: i32, ssid: &str, last_connected_ms: u64) -> WifiConfig {
        let mut config = WifiConfig::new(id, ssid, SecurityType::Psk);
        config.ever_connected = true;
        config.last_connected_ms = last_connected_ms;
        config
    }

    fn settings() -> PnoListSettings {
        PnoListSettings {
            location_enabled: true,
            frequency_culling: true,
            merge_passpoint: false,
            max_prioritized_passpoint: 2,
            max_freqs_per_network: 10,
            max_freqs_total: 60,
            frequency_age_ms: 1000,
        }
    }

    fn ssids(list: &[PnoNetwork]) -> Vec<String> {
        list.iter().map(|n| n.ssid.to_string()).collect()
    }

    #[test]
    fn orders_by_recency_and_filters_ineligible() {
        let mut never = network(3, "never", 900);
        never.ever_connected = false;
        let mut ephemeral = network(4, "ephemeral", 800);
        ephemeral.ever_connected = false;
        ephemeral.ephemeral = true;
        let mut no_autojoin = network(5, "noauto", 700);
        no_autojoin.allow_autojoin = false;
        let mut restricted = network(6, "admin", 600);
        restricted.admin_restricted = true;
        let mut offload = network(7, "offload", 500);
        offload.carrier_offload_disabled = true;
        let store = FakeStore {
            networks: vec![
                network(1, "old", 100),
                network(2, "recent", 1000),
                never,
                ephemeral,
                no_autojoin,
                restricted,
                offload,
                network(8, "userdisabled", 50),
            ],
            user_disabled: ["userdisabled".to_string()].into_iter().collect(),
            ..FakeStore::default()
        };

        let list = build_pno_list(&store, None, &settings());
        assert_eq!(ssids(&list), vec!["recent", "ephemeral", "old"]);
    }

    #[test]
    fn sim_based_eap_needs_ready_sim() {
        let mut sim = WifiConfig::new(1, "carrier", SecurityType::Eap);
        sim.ever_connected = true;
        sim.carrier_id = Some(1911);
        sim.credentials.eap = Some(stalink_supplicant::records::EapConfig {
            method: stalink_supplicant::records::EapMethod::Sim,
            identity: None,
            anonymous_identity: None,
            password: None,
            ca_cert: None,
        });
        let mut store = FakeStore {
            networks: vec![sim],
            ..FakeStore::default()
        };
        assert!(build_pno_list(&store, None, &settings()).is_empty());
        store.sim_ready = true;
        assert_eq!(build_pno_list(&store, None, &settings()).len(), 1);
    }

    #[test]
    fn external_ssids_first_only_with_location() {
        let store = FakeStore {
            networks: vec![network(1, "home", 10)],
            ..FakeStore::default()
        };
        let request = ExternalPnoRequest {
            uid: 10001,
            package: "com.example".into(),
            ssids: vec![Ssid::from("app"), Ssid::from("home")],
            frequencies: vec![5180],
        };
        let list = build_pno_list(&store, Some(&request), &settings());
        assert_eq!(ssids(&list), vec!["app", "home"]);
        assert_eq!(list[0].frequencies, vec![5180]);

        let mut no_location = settings();
        no_location.location_enabled = false;
        let list = build_pno_list(&store, Some(&request), &no_location);
        assert_eq!(ssids(&list), vec!["home"]);
    }

    #[test]
    fn passpoint_merge_keeps_prioritized_at_head() {
        let mut networks = vec![network(1, "std1", 50), network(2, "std2", 40)];
        for (i, name) in ["pp1", "pp2", "pp3"].iter().enumerate() {
            let mut pp = network(10 + i as i32, name, 100 - i as u64);
            pp.passpoint = true;
            pp.fqdn = Some(format!("{name}.example.com"));
            networks.push(pp);
        }
        let store = FakeStore {
            networks,
            ..FakeStore::default()
        };
        let mut merged = settings();
        merged.merge_passpoint = true;
        let list = build_pno_list(&store, None, &merged);
        assert_eq!(ssids(&list), vec!["pp1", "pp2", "std1", "std2", "pp3"]);

        let list = build_pno_list(&store, None, &settings());
        assert_eq!(ssids(&list), vec!["pp1", "pp2", "pp3", "std1", "std2"]);
    }

    #[test]
    fn frequency_hints_are_capped() {
        let mut history = HashMap::new();
        history.insert("a".to_string(), vec![1, 2, 3, 4]);
        history.insert("b".to_string(), vec![5, 6, 7]);
        let store = FakeStore {
            networks: vec![network(1, "a", 20), network(2, "b", 10)],
            history,
            ..FakeStore::default()
        };
        let mut capped = settings();
        capped.max_freqs_per_network = 3;
        capped.max_freqs_total = 4;
        let list = build_pno_list(&store, None, &capped);
        assert_eq!(list[0].frequencies, vec![1, 2, 3]);
        assert_eq!(list[1].frequencies, vec![5]);

        let mut culling_off = settings();
        culling_off.frequency_culling = false;
        store.history_calls.lock().unwrap().clear();
        let list = build_pno_list(&store, None, &culling_off);
        assert!(list.iter().all(|n| n.frequencies.is_empty()));
        assert!(store.history_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn alternate_ssids_get_their_own_entries() {
        let mut config = network(1, "cafe", 10);
        config.alternate_ssids = vec![Ssid::from_bytes(vec![0xc3, 0xa9])];
        let store = FakeStore {
            networks: vec![config],
            ..FakeStore::default()
        };
        let list = build_pno_list(&store, None, &settings());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn external_request_is_single_owner() {
        let mut requests = ExternalPnoRequests::default();
        let request = |uid| ExternalPnoRequest {
            uid,
            package: "pkg".into(),
            ssids: vec![],
            frequencies: vec![],
        };
        assert!(requests.set(request(1)));
        assert!(!requests.set(request(2)));
        assert!(!requests.remove(2));
        assert!(requests.remove(1));
        assert!(requests.current().is_none());
    }
}
