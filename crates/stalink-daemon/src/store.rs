//! Saved networks on disk and the channel history learned from scans.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use stalink_connectivity::{ConfigStore, ScanResult};
use stalink_logging::targets::T_CONNECTIVITY;
use stalink_supplicant::{Clock, Ssid, WifiConfig};
use tracing::{info, warn};

const MAX_HISTORY_PER_SSID: usize = 32;

/// On-disk layout of `networks.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworksFile {
    pub networks: Vec<WifiConfig>,
}

#[derive(Default)]
struct StoreState {
    networks: Vec<WifiConfig>,
    user_disabled: HashSet<String>,
    /// Per SSID, `(frequency, seen_at_ms)` with the most recent first.
    history: HashMap<Ssid, Vec<(u32, u64)>>,
}

pub struct JsonConfigStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
}

impl JsonConfigStore {
    /// Loads `path`; a missing file starts an empty store.
    pub fn load(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let file: NetworksFile = stalink_logging::fs::read_json(&path)?.unwrap_or_default();
        info!(
            target: T_CONNECTIVITY,
            path = %path.display(),
            count = file.networks.len(),
            "saved_networks_loaded"
        );
        Ok(Self {
            path,
            clock,
            state: Mutex::new(StoreState {
                networks: file.networks,
                ..StoreState::default()
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, networks: &[WifiConfig]) {
        let file = NetworksFile {
            networks: networks.to_vec(),
        };
        if let Err(err) = stalink_logging::fs::write_json_atomic(&self.path, &file) {
            warn!(
                target: T_CONNECTIVITY,
                path = %self.path.display(),
                error = %format!("{err:#}"),
                "saved_networks_write_failed"
            );
        }
    }

    /// Adds or replaces the network with the same id and writes the file.
    pub fn upsert_network(&self, config: WifiConfig) {
        let mut state = self.state();
        match state
            .networks
            .iter_mut()
            .find(|c| c.network_id == config.network_id)
        {
            Some(existing) => *existing = config,
            None => state.networks.push(config),
        }
        self.persist(&state.networks);
    }

    pub fn remove_network(&self, network_id: i32) -> bool {
        let mut state = self.state();
        let before = state.networks.len();
        state.networks.retain(|c| c.network_id != network_id);
        let removed = state.networks.len() != before;
        if removed {
            self.persist(&state.networks);
        }
        removed
    }

    pub fn disable_by_user(&self, key: impl Into<String>) {
        self.state().user_disabled.insert(key.into());
    }

    /// Records where each scanned SSID was heard.
    pub fn record_scan(&self, results: &[ScanResult]) {
        let now = self.clock.elapsed_ms();
        let mut state = self.state();
        for result in results {
            if result.ssid.is_empty() || result.frequency_mhz == 0 {
                continue;
            }
            let entries = state.history.entry(result.ssid.clone()).or_default();
            entries.retain(|(freq, _)| *freq != result.frequency_mhz);
            entries.insert(0, (result.frequency_mhz, now));
            entries.truncate(MAX_HISTORY_PER_SSID);
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn saved_networks(&self) -> Vec<WifiConfig> {
        self.state().networks.clone()
    }

    fn configured_network(&self, network_id: i32) -> Option<WifiConfig> {
        self.state()
            .networks
            .iter()
            .find(|c| c.network_id == network_id)
            .cloned()
    }

    fn is_temporarily_disabled_by_user(&self, key: &str) -> bool {
        self.state().user_disabled.contains(key)
    }

    fn enable_temporarily_disabled_networks(&self) {
        let mut state = self.state();
        let mut changed = false;
        for network in state.networks.iter_mut().filter(|c| !c.enabled) {
            network.enabled = true;
            changed = true;
        }
        if changed {
            self.persist(&state.networks);
        }
    }

    fn clear_user_temporarily_disabled(&self) {
        self.state().user_disabled.clear();
    }

    fn remove_all_ephemeral_or_passpoint_networks(&self) {
        let mut state = self.state();
        let before = state.networks.len();
        state.networks.retain(|c| !c.ephemeral && !c.passpoint);
        if state.networks.len() != before {
            self.persist(&state.networks);
        }
    }

    fn frequency_history(&self, ssid: &Ssid, max_age_ms: u64) -> Vec<u32> {
        let now = self.clock.elapsed_ms();
        self.state()
            .history
            .get(ssid)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, at)| now.saturating_sub(*at) <= max_age_ms)
                    .map(|(freq, _)| *freq)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_sim_ready(&self, _carrier_id: i32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stalink_supplicant::SecurityType;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct FakeClock(AtomicU64);

    impl Clock for FakeClock {
        fn elapsed_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn result(ssid: &str, freq: u32) -> ScanResult {
        ScanResult {
            ssid: Ssid::from(ssid),
            bssid: "00:11:22:33:44:55".into(),
            frequency_mhz: freq,
            rssi_dbm: -50,
            security: vec![SecurityType::Psk],
        }
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            JsonConfigStore::load(dir.path().join("networks.json"), Arc::new(FakeClock::default()))
                .unwrap();
        assert!(store.saved_networks().is_empty());
    }

    #[test]
    fn networks_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("networks.json");
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        let store = JsonConfigStore::load(&path, clock.clone()).unwrap();
        store.upsert_network(WifiConfig::new(1, "home", SecurityType::Psk));
        let mut guest = WifiConfig::new(2, "guest", SecurityType::Open);
        guest.ephemeral = true;
        store.upsert_network(guest);

        let reloaded = JsonConfigStore::load(&path, clock).unwrap();
        assert_eq!(reloaded.saved_networks().len(), 2);
        reloaded.remove_all_ephemeral_or_passpoint_networks();
        let ids: Vec<i32> = reloaded
            .saved_networks()
            .iter()
            .map(|c| c.network_id)
            .collect();
        assert_eq!(ids, vec![1]);
        assert!(reloaded.remove_network(1));
        assert!(!reloaded.remove_network(1));
    }

    #[test]
    fn history_is_recent_first_and_ages_out() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FakeClock::default());
        let store = JsonConfigStore::load(dir.path().join("n.json"), clock.clone()).unwrap();

        store.record_scan(&[result("home", 2412)]);
        clock.0.store(5_000, Ordering::SeqCst);
        store.record_scan(&[result("home", 5180), result("", 2437)]);
        clock.0.store(8_000, Ordering::SeqCst);

        let ssid = Ssid::from("home");
        assert_eq!(store.frequency_history(&ssid, 60_000), vec![5180, 2412]);
        assert_eq!(store.frequency_history(&ssid, 4_000), vec![5180]);
        assert!(store.frequency_history(&Ssid::from(""), 60_000).is_empty());
    }

    #[test]
    fn user_disables_clear_and_networks_reenable() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            JsonConfigStore::load(dir.path().join("n.json"), Arc::new(FakeClock::default()))
                .unwrap();
        let mut off = WifiConfig::new(3, "cafe", SecurityType::Psk);
        off.enabled = false;
        store.upsert_network(off);
        store.disable_by_user("cafe");

        assert!(store.is_temporarily_disabled_by_user("cafe"));
        store.clear_user_temporarily_disabled();
        assert!(!store.is_temporarily_disabled_by_user("cafe"));

        store.enable_temporarily_disabled_networks();
        assert!(store.configured_network(3).map(|c| c.enabled).unwrap_or(false));
    }
}
