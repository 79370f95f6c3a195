//! RSSI-based network selection over the saved networks.

use std::sync::Arc;

use stalink_connectivity::{
    Band, Candidate, CandidateKey, ClientModeInfo, CmmRole, ConfigStore, NetworkSelector,
    ScanResult, SelectionContext,
};
use stalink_logging::targets::T_CONNECTIVITY;
use stalink_supplicant::WifiConfig;
use tracing::trace;

/// Link quality at or above which a connected interface is left alone.
pub const SUFFICIENT_RSSI_DBM: i32 = -65;

const BAND_BONUS_5GHZ: i32 = 10;
const BAND_BONUS_6GHZ: i32 = 15;

pub struct RssiSelector {
    store: Arc<dyn ConfigStore>,
    min_rssi_dbm: i32,
}

impl RssiSelector {
    pub fn new(store: Arc<dyn ConfigStore>, min_rssi_dbm: i32) -> Self {
        Self {
            store,
            min_rssi_dbm,
        }
    }

    fn eligible(&self, config: &WifiConfig, ctx: &SelectionContext) -> bool {
        if !config.enabled || !config.allow_autojoin {
            return false;
        }
        if config.ephemeral && !ctx.untrusted_allowed {
            return false;
        }
        if config.oem_paid && !ctx.oem_paid_allowed {
            return false;
        }
        if config.oem_private && !ctx.oem_private_allowed {
            return false;
        }
        !self
            .store
            .is_temporarily_disabled_by_user(&config.disable_key())
    }

    fn candidate_for(
        &self,
        result: &ScanResult,
        networks: &[WifiConfig],
        ctx: &SelectionContext,
    ) -> Option<Candidate> {
        if result.rssi_dbm < self.min_rssi_dbm || ctx.blocked_bssids.contains(&result.bssid) {
            return None;
        }
        networks.iter().find_map(|config| {
            if !config.all_ssids().contains(&result.ssid) || !self.eligible(config, ctx) {
                return None;
            }
            let security = result.security.iter().copied().find(|s| {
                config.security_types.contains(s) && !ctx.autojoin_disallowed_security.contains(s)
            })?;
            Some(Candidate {
                key: CandidateKey {
                    ssid: result.ssid.clone(),
                    bssid: result.bssid.clone(),
                    network_id: config.network_id,
                    security,
                },
                scan_rssi: result.rssi_dbm,
                frequency_mhz: result.frequency_mhz,
                oem_paid: config.oem_paid,
                oem_private: config.oem_private,
                passpoint: config.passpoint,
            })
        })
    }
}

fn score(candidate: &Candidate) -> i32 {
    let bonus = match Band::from_frequency(candidate.frequency_mhz) {
        Band::Ghz5 => BAND_BONUS_5GHZ,
        Band::Ghz6 => BAND_BONUS_6GHZ,
        _ => 0,
    };
    candidate.scan_rssi + bonus
}

impl NetworkSelector for RssiSelector {
    fn candidates_from_scan(&self, results: &[ScanResult], ctx: &SelectionContext) -> Vec<Candidate> {
        if !ctx.skip_sufficiency_check
            && ctx
                .clients
                .iter()
                .any(|c| c.role == CmmRole::Primary && c.is_connected() && c.sufficient)
        {
            trace!(target: T_CONNECTIVITY, "selection_skipped_sufficient");
            return Vec::new();
        }
        let networks = self.store.saved_networks();
        results
            .iter()
            .filter_map(|r| self.candidate_for(r, &networks, ctx))
            .collect()
    }

    fn select_network(&self, candidates: &[Candidate]) -> Option<WifiConfig> {
        let best = candidates
            .iter()
            .fold(None::<&Candidate>, |best, c| match best {
                Some(b) if score(b) >= score(c) => Some(b),
                _ => Some(c),
            })?;
        let mut config = self.store.configured_network(best.key.network_id)?;
        config.candidate_bssid = Some(best.key.bssid.clone());
        config.candidate_frequency_mhz = Some(best.frequency_mhz);
        config.candidate_security = Some(best.key.security);
        Some(config)
    }

    fn needs_selection(&self, client: &ClientModeInfo) -> bool {
        !client.is_connected() || !client.sufficient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stalink_supplicant::{SecurityType, Ssid};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        networks: Mutex<Vec<WifiConfig>>,
        user_disabled: Mutex<Vec<String>>,
    }

    impl ConfigStore for FakeStore {
        fn saved_networks(&self) -> Vec<WifiConfig> {
            self.networks.lock().unwrap().clone()
        }

        fn configured_network(&self, network_id: i32) -> Option<WifiConfig> {
            self.saved_networks()
                .into_iter()
                .find(|c| c.network_id == network_id)
        }

        fn is_temporarily_disabled_by_user(&self, key: &str) -> bool {
            self.user_disabled.lock().unwrap().iter().any(|k| k == key)
        }

        fn enable_temporarily_disabled_networks(&self) {}

        fn clear_user_temporarily_disabled(&self) {}

        fn remove_all_ephemeral_or_passpoint_networks(&self) {}

        fn frequency_history(&self, _ssid: &Ssid, _max_age_ms: u64) -> Vec<u32> {
            Vec::new()
        }

        fn is_sim_ready(&self, _carrier_id: i32) -> bool {
            false
        }
    }

    fn result(ssid: &str, bssid: &str, freq: u32, rssi: i32, security: SecurityType) -> ScanResult {
        ScanResult {
            ssid: Ssid::from(ssid),
            bssid: bssid.into(),
            frequency_mhz: freq,
            rssi_dbm: rssi,
            security: vec![security],
        }
    }

    fn selector(networks: Vec<WifiConfig>) -> (RssiSelector, Arc<FakeStore>) {
        let store = Arc::new(FakeStore::default());
        *store.networks.lock().unwrap() = networks;
        (RssiSelector::new(store.clone(), -80), store)
    }

    #[test]
    fn filters_weak_blocked_and_mismatched_results() {
        let (selector, store) = selector(vec![
            WifiConfig::new(1, "home", SecurityType::Psk),
            WifiConfig::new(2, "cafe", SecurityType::Open),
        ]);
        store.user_disabled.lock().unwrap().push("cafe".into());
        let mut ctx = SelectionContext::default();
        ctx.blocked_bssids.insert("aa:00:00:00:00:02".into());

        let candidates = selector.candidates_from_scan(
            &[
                result("home", "aa:00:00:00:00:01", 2412, -60, SecurityType::Psk),
                result("home", "aa:00:00:00:00:02", 2437, -40, SecurityType::Psk),
                result("home", "aa:00:00:00:00:03", 2462, -90, SecurityType::Psk),
                result("home", "aa:00:00:00:00:04", 2462, -50, SecurityType::Open),
                result("cafe", "aa:00:00:00:00:05", 2412, -30, SecurityType::Open),
                result("stranger", "aa:00:00:00:00:06", 2412, -30, SecurityType::Open),
            ],
            &ctx,
        );
        let bssids: Vec<&str> = candidates.iter().map(|c| c.key.bssid.as_str()).collect();
        assert_eq!(bssids, vec!["aa:00:00:00:00:01"]);
    }

    #[test]
    fn disallowed_security_and_oem_need_permission() {
        let mut paid = WifiConfig::new(3, "paid", SecurityType::Sae);
        paid.oem_paid = true;
        let (selector, _store) = selector(vec![WifiConfig::new(1, "home", SecurityType::Sae), paid]);
        let results = [
            result("home", "aa:00:00:00:00:01", 5180, -60, SecurityType::Sae),
            result("paid", "aa:00:00:00:00:02", 5200, -60, SecurityType::Sae),
        ];

        let mut ctx = SelectionContext {
            autojoin_disallowed_security: vec![SecurityType::Sae],
            ..SelectionContext::default()
        };
        assert!(selector.candidates_from_scan(&results, &ctx).is_empty());

        ctx.autojoin_disallowed_security.clear();
        ctx.oem_paid_allowed = true;
        assert_eq!(selector.candidates_from_scan(&results, &ctx).len(), 2);
    }

    #[test]
    fn sufficient_primary_suppresses_candidates() {
        let (selector, _store) = selector(vec![WifiConfig::new(1, "home", SecurityType::Psk)]);
        let mut primary = ClientModeInfo::new("wlan0", CmmRole::Primary);
        primary.connected = Some(WifiConfig::new(1, "home", SecurityType::Psk));
        primary.sufficient = true;
        let mut ctx = SelectionContext {
            clients: vec![primary.clone()],
            ..SelectionContext::default()
        };
        let results = [result("home", "aa:00:00:00:00:01", 2412, -50, SecurityType::Psk)];

        assert!(selector.candidates_from_scan(&results, &ctx).is_empty());
        assert!(!selector.needs_selection(&primary));
        ctx.skip_sufficiency_check = true;
        assert_eq!(selector.candidates_from_scan(&results, &ctx).len(), 1);
    }

    #[test]
    fn higher_band_wins_close_rssi() {
        let (selector, _store) = selector(vec![WifiConfig::new(1, "home", SecurityType::Psk)]);
        let candidates = selector.candidates_from_scan(
            &[
                result("home", "aa:00:00:00:00:01", 2412, -55, SecurityType::Psk),
                result("home", "aa:00:00:00:00:02", 5180, -60, SecurityType::Psk),
            ],
            &SelectionContext::default(),
        );
        let chosen = selector.select_network(&candidates).unwrap();
        assert_eq!(chosen.candidate_bssid.as_deref(), Some("aa:00:00:00:00:02"));
        assert_eq!(chosen.candidate_frequency_mhz, Some(5180));
        assert_eq!(chosen.candidate_security, Some(SecurityType::Psk));
    }
}
