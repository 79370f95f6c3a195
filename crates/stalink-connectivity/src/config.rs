use std::env;

use crate::types::ScanType;

pub const DEFAULT_SCAN_SCHEDULE_SEC: [u32; 4] = [20, 40, 80, 160];
pub const DEFAULT_SCAN_TYPE: ScanType = ScanType::HighAccuracy;
pub const DEFAULT_POWER_SAVE_MULTIPLIER: u32 = 2;
pub const DEFAULT_PNO_MOVING_INTERVAL_MS: u64 = 20_000;
pub const DEFAULT_PNO_STATIONARY_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_PNO_LOW_RSSI_RETRY_START_MS: u64 = 20_000;
pub const DEFAULT_PNO_LOW_RSSI_RETRY_MAX_MS: u64 = 80_000;
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 4 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: usize = 6;
pub const DEFAULT_CANDIDATE_CACHE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_TEMP_BSSID_BLOCK_MS: u64 = 10_000;
pub const DEFAULT_MAX_SCAN_RESTARTS: u32 = 5;
pub const DEFAULT_SCAN_RESTART_DELAY_MS: u64 = 2_000;
pub const DEFAULT_PNO_NETWORK_CHANGE_THROTTLE_MS: u64 = 3_000;
pub const DEFAULT_MAX_PRIORITIZED_PASSPOINT: usize = 2;
pub const DEFAULT_PNO_FREQUENCY_AGE_MS: u64 = 30 * 24 * 3600 * 1000;
pub const DEFAULT_PNO_MAX_FREQS_PER_NETWORK: usize = 10;
pub const DEFAULT_PNO_MAX_FREQS_TOTAL: usize = 60;
pub const DEFAULT_PARTIAL_SCAN_CHANNEL_AGE_MS: u64 = 3600 * 1000;
pub const DEFAULT_CONNECTED_PARTIAL_SCAN_MAX_CHANNELS: usize = 6;
pub const DEFAULT_INITIAL_PARTIAL_SCAN_MAX_CHANNELS: usize = 10;
pub const DEFAULT_INITIAL_PARTIAL_SCAN_MAX_PER_NETWORK: usize = 3;
pub const DEFAULT_HIGH_MOVEMENT_SCAN_DELAY_MS: u64 = 10_000;
pub const DEFAULT_HIGH_MOVEMENT_RSSI_DELTA: i32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub intervals_sec: Vec<u32>,
    pub scan_types: Vec<ScanType>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            intervals_sec: DEFAULT_SCAN_SCHEDULE_SEC.to_vec(),
            scan_types: vec![DEFAULT_SCAN_TYPE; DEFAULT_SCAN_SCHEDULE_SEC.len()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub connected_schedule: ScheduleConfig,
    pub disconnected_schedule: ScheduleConfig,
    /// Used while connected to the only network the device knows.
    pub single_saved_schedule: ScheduleConfig,
    pub battery_saver_enabled: bool,
    pub power_save_multiplier: u32,
    pub pno_moving_interval_ms: u64,
    pub pno_stationary_interval_ms: u64,
    pub pno_low_rssi_retry_start_ms: u64,
    pub pno_low_rssi_retry_max_ms: u64,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_attempts: usize,
    pub candidate_cache_timeout_ms: u64,
    pub temp_bssid_block_ms: u64,
    pub max_scan_restarts: u32,
    pub scan_restart_delay_ms: u64,
    pub firmware_roaming: bool,
    pub sta_sta_concurrency: bool,
    pub make_before_break: bool,
    pub multi_internet_dual_5ghz: bool,
    pub multi_internet_multi_ap: bool,
    pub pno_frequency_culling: bool,
    /// Put the first passpoint SSIDs at the head of the PNO list and the
    /// rest after the standard networks.
    pub pno_merge_passpoint: bool,
    pub pno_max_freqs_per_network: usize,
    pub pno_max_freqs_total: usize,
    pub pno_frequency_age_ms: u64,
    pub max_prioritized_passpoint: usize,
    pub pno_network_change_throttle_ms: u64,
    pub ask_before_switch: bool,
    pub sufficiency_check: bool,
    pub linked_network_roaming: bool,
    pub set_target_bssid: bool,
    pub open_network_notifier: bool,
    pub partial_initial_scan: bool,
    pub partial_scan_channel_age_ms: u64,
    pub connected_partial_scan_max_channels: usize,
    pub initial_partial_scan_max_channels: usize,
    pub initial_partial_scan_max_per_network: usize,
    pub high_movement_optimization: bool,
    pub high_movement_scan_delay_ms: u64,
    pub high_movement_rssi_delta: i32,
    pub pno_enabled: bool,
    pub pno_after_wifi_toggle: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connected_schedule: ScheduleConfig::default(),
            disconnected_schedule: ScheduleConfig::default(),
            single_saved_schedule: ScheduleConfig::default(),
            battery_saver_enabled: true,
            power_save_multiplier: DEFAULT_POWER_SAVE_MULTIPLIER,
            pno_moving_interval_ms: DEFAULT_PNO_MOVING_INTERVAL_MS,
            pno_stationary_interval_ms: DEFAULT_PNO_STATIONARY_INTERVAL_MS,
            pno_low_rssi_retry_start_ms: DEFAULT_PNO_LOW_RSSI_RETRY_START_MS,
            pno_low_rssi_retry_max_ms: DEFAULT_PNO_LOW_RSSI_RETRY_MAX_MS,
            rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            rate_limit_max_attempts: DEFAULT_RATE_LIMIT_MAX_ATTEMPTS,
            candidate_cache_timeout_ms: DEFAULT_CANDIDATE_CACHE_TIMEOUT_MS,
            temp_bssid_block_ms: DEFAULT_TEMP_BSSID_BLOCK_MS,
            max_scan_restarts: DEFAULT_MAX_SCAN_RESTARTS,
            scan_restart_delay_ms: DEFAULT_SCAN_RESTART_DELAY_MS,
            firmware_roaming: false,
            sta_sta_concurrency: false,
            make_before_break: false,
            multi_internet_dual_5ghz: false,
            multi_internet_multi_ap: false,
            pno_frequency_culling: true,
            pno_merge_passpoint: true,
            pno_max_freqs_per_network: DEFAULT_PNO_MAX_FREQS_PER_NETWORK,
            pno_max_freqs_total: DEFAULT_PNO_MAX_FREQS_TOTAL,
            pno_frequency_age_ms: DEFAULT_PNO_FREQUENCY_AGE_MS,
            max_prioritized_passpoint: DEFAULT_MAX_PRIORITIZED_PASSPOINT,
            pno_network_change_throttle_ms: DEFAULT_PNO_NETWORK_CHANGE_THROTTLE_MS,
            ask_before_switch: false,
            sufficiency_check: true,
            linked_network_roaming: true,
            set_target_bssid: false,
            open_network_notifier: false,
            partial_initial_scan: true,
            partial_scan_channel_age_ms: DEFAULT_PARTIAL_SCAN_CHANNEL_AGE_MS,
            connected_partial_scan_max_channels: DEFAULT_CONNECTED_PARTIAL_SCAN_MAX_CHANNELS,
            initial_partial_scan_max_channels: DEFAULT_INITIAL_PARTIAL_SCAN_MAX_CHANNELS,
            initial_partial_scan_max_per_network: DEFAULT_INITIAL_PARTIAL_SCAN_MAX_PER_NETWORK,
            high_movement_optimization: true,
            high_movement_scan_delay_ms: DEFAULT_HIGH_MOVEMENT_SCAN_DELAY_MS,
            high_movement_rssi_delta: DEFAULT_HIGH_MOVEMENT_RSSI_DELTA,
            pno_enabled: true,
            pno_after_wifi_toggle: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let connected_schedule =
            schedule_from_env("STALINK_CONNECTED_SCAN_SCHEDULE", "STALINK_CONNECTED_SCAN_TYPES")
                .unwrap_or(defaults.connected_schedule);
        let disconnected_schedule = schedule_from_env(
            "STALINK_DISCONNECTED_SCAN_SCHEDULE",
            "STALINK_DISCONNECTED_SCAN_TYPES",
        )
        .unwrap_or(defaults.disconnected_schedule);
        let single_saved_schedule = schedule_from_env(
            "STALINK_SINGLE_SAVED_SCAN_SCHEDULE",
            "STALINK_SINGLE_SAVED_SCAN_TYPES",
        )
        .unwrap_or_else(|| connected_schedule.clone());

        Self {
            connected_schedule,
            disconnected_schedule,
            single_saved_schedule,
            battery_saver_enabled: env_bool(
                "STALINK_BATTERY_SAVER",
                defaults.battery_saver_enabled,
            ),
            power_save_multiplier: env_parse(
                "STALINK_POWER_SAVE_MULTIPLIER",
                DEFAULT_POWER_SAVE_MULTIPLIER,
            ),
            pno_moving_interval_ms: env_parse(
                "STALINK_PNO_MOVING_INTERVAL_MS",
                DEFAULT_PNO_MOVING_INTERVAL_MS,
            ),
            pno_stationary_interval_ms: env_parse(
                "STALINK_PNO_STATIONARY_INTERVAL_MS",
                DEFAULT_PNO_STATIONARY_INTERVAL_MS,
            ),
            pno_low_rssi_retry_start_ms: env_parse(
                "STALINK_PNO_LOW_RSSI_RETRY_START_MS",
                DEFAULT_PNO_LOW_RSSI_RETRY_START_MS,
            ),
            pno_low_rssi_retry_max_ms: env_parse(
                "STALINK_PNO_LOW_RSSI_RETRY_MAX_MS",
                DEFAULT_PNO_LOW_RSSI_RETRY_MAX_MS,
            ),
            rate_limit_window_ms: env_parse(
                "STALINK_RATE_LIMIT_WINDOW_MS",
                DEFAULT_RATE_LIMIT_WINDOW_MS,
            ),
            rate_limit_max_attempts: env_parse(
                "STALINK_RATE_LIMIT_MAX_ATTEMPTS",
                DEFAULT_RATE_LIMIT_MAX_ATTEMPTS,
            ),
            candidate_cache_timeout_ms: env_parse(
                "STALINK_CANDIDATE_CACHE_TIMEOUT_MS",
                DEFAULT_CANDIDATE_CACHE_TIMEOUT_MS,
            ),
            temp_bssid_block_ms: env_parse(
                "STALINK_TEMP_BSSID_BLOCK_MS",
                DEFAULT_TEMP_BSSID_BLOCK_MS,
            ),
            max_scan_restarts: env_parse("STALINK_MAX_SCAN_RESTARTS", DEFAULT_MAX_SCAN_RESTARTS),
            scan_restart_delay_ms: env_parse(
                "STALINK_SCAN_RESTART_DELAY_MS",
                DEFAULT_SCAN_RESTART_DELAY_MS,
            ),
            firmware_roaming: env_bool("STALINK_FIRMWARE_ROAMING", defaults.firmware_roaming),
            sta_sta_concurrency: env_bool("STALINK_STA_STA", defaults.sta_sta_concurrency),
            make_before_break: env_bool("STALINK_MAKE_BEFORE_BREAK", defaults.make_before_break),
            multi_internet_dual_5ghz: env_bool(
                "STALINK_MULTI_INTERNET_DUAL_5GHZ",
                defaults.multi_internet_dual_5ghz,
            ),
            multi_internet_multi_ap: env_bool(
                "STALINK_MULTI_INTERNET_MULTI_AP",
                defaults.multi_internet_multi_ap,
            ),
            pno_frequency_culling: env_bool(
                "STALINK_PNO_FREQUENCY_CULLING",
                defaults.pno_frequency_culling,
            ),
            pno_merge_passpoint: env_bool(
                "STALINK_PNO_MERGE_PASSPOINT",
                defaults.pno_merge_passpoint,
            ),
            pno_max_freqs_per_network: env_parse(
                "STALINK_PNO_MAX_FREQS_PER_NETWORK",
                DEFAULT_PNO_MAX_FREQS_PER_NETWORK,
            ),
            pno_max_freqs_total: env_parse(
                "STALINK_PNO_MAX_FREQS_TOTAL",
                DEFAULT_PNO_MAX_FREQS_TOTAL,
            ),
            pno_frequency_age_ms: env_parse(
                "STALINK_PNO_FREQUENCY_AGE_MS",
                DEFAULT_PNO_FREQUENCY_AGE_MS,
            ),
            max_prioritized_passpoint: env_parse(
                "STALINK_MAX_PRIORITIZED_PASSPOINT",
                DEFAULT_MAX_PRIORITIZED_PASSPOINT,
            ),
            pno_network_change_throttle_ms: env_parse(
                "STALINK_PNO_NETWORK_CHANGE_THROTTLE_MS",
                DEFAULT_PNO_NETWORK_CHANGE_THROTTLE_MS,
            ),
            ask_before_switch: env_bool("STALINK_ASK_BEFORE_SWITCH", defaults.ask_before_switch),
            sufficiency_check: env_bool("STALINK_SUFFICIENCY_CHECK", defaults.sufficiency_check),
            linked_network_roaming: env_bool(
                "STALINK_LINKED_NETWORK_ROAMING",
                defaults.linked_network_roaming,
            ),
            set_target_bssid: env_bool("STALINK_SET_TARGET_BSSID", defaults.set_target_bssid),
            open_network_notifier: env_bool(
                "STALINK_OPEN_NETWORK_NOTIFIER",
                defaults.open_network_notifier,
            ),
            partial_initial_scan: env_bool(
                "STALINK_PARTIAL_INITIAL_SCAN",
                defaults.partial_initial_scan,
            ),
            partial_scan_channel_age_ms: env_parse(
                "STALINK_PARTIAL_SCAN_CHANNEL_AGE_MS",
                DEFAULT_PARTIAL_SCAN_CHANNEL_AGE_MS,
            ),
            connected_partial_scan_max_channels: env_parse(
                "STALINK_CONNECTED_PARTIAL_SCAN_MAX_CHANNELS",
                DEFAULT_CONNECTED_PARTIAL_SCAN_MAX_CHANNELS,
            ),
            initial_partial_scan_max_channels: env_parse(
                "STALINK_INITIAL_PARTIAL_SCAN_MAX_CHANNELS",
                DEFAULT_INITIAL_PARTIAL_SCAN_MAX_CHANNELS,
            ),
            initial_partial_scan_max_per_network: env_parse(
                "STALINK_INITIAL_PARTIAL_SCAN_MAX_PER_NETWORK",
                DEFAULT_INITIAL_PARTIAL_SCAN_MAX_PER_NETWORK,
            ),
            high_movement_optimization: env_bool(
                "STALINK_HIGH_MOVEMENT_OPTIMIZATION",
                defaults.high_movement_optimization,
            ),
            high_movement_scan_delay_ms: env_parse(
                "STALINK_HIGH_MOVEMENT_SCAN_DELAY_MS",
                DEFAULT_HIGH_MOVEMENT_SCAN_DELAY_MS,
            ),
            high_movement_rssi_delta: env_parse(
                "STALINK_HIGH_MOVEMENT_RSSI_DELTA",
                DEFAULT_HIGH_MOVEMENT_RSSI_DELTA,
            ),
            pno_enabled: env_bool("STALINK_PNO_ENABLED", defaults.pno_enabled),
            pno_after_wifi_toggle: env_bool(
                "STALINK_PNO_AFTER_WIFI_TOGGLE",
                defaults.pno_after_wifi_toggle,
            ),
        }
    }
}

/// Reads a schedule and its scan types. A malformed schedule (empty, zero
/// interval or unparsable entry) falls back to the default; missing or
/// malformed types default to high accuracy for every entry.
fn schedule_from_env(schedule_key: &str, types_key: &str) -> Option<ScheduleConfig> {
    let intervals_sec = parse_schedule(&env::var(schedule_key).ok()?)?;
    let scan_types = env::var(types_key)
        .ok()
        .and_then(|v| parse_scan_types(&v))
        .unwrap_or_else(|| vec![DEFAULT_SCAN_TYPE; intervals_sec.len()]);
    Some(ScheduleConfig {
        intervals_sec,
        scan_types,
    })
}

pub(crate) fn parse_schedule(value: &str) -> Option<Vec<u32>> {
    let intervals: Option<Vec<u32>> = value
        .split(',')
        .map(|s| s.trim().parse::<u32>().ok().filter(|v| *v > 0))
        .collect();
    intervals.filter(|v| !v.is_empty())
}

pub(crate) fn parse_scan_types(value: &str) -> Option<Vec<ScanType>> {
    let types: Option<Vec<ScanType>> = value.split(',').map(ScanType::parse).collect();
    types.filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            if !self.vars.iter().any(|(k, _)| k == key) {
                self.vars.push((key.to_string(), std::env::var(key).ok()));
            }
            std::env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            if !self.vars.iter().any(|(k, _)| k == key) {
                self.vars.push((key.to_string(), std::env::var(key).ok()));
            }
            std::env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..) {
                match value {
                    Some(val) => std::env::set_var(&key, val),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut guard = EnvGuard::new();
        for key in [
            "STALINK_CONNECTED_SCAN_SCHEDULE",
            "STALINK_SINGLE_SAVED_SCAN_SCHEDULE",
            "STALINK_RATE_LIMIT_MAX_ATTEMPTS",
            "STALINK_FIRMWARE_ROAMING",
        ] {
            guard.remove(key);
        }

        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.connected_schedule.intervals_sec, vec![20, 40, 80, 160]);
        assert_eq!(cfg.rate_limit_max_attempts, 6);
        assert_eq!(cfg.rate_limit_window_ms, 240_000);
        assert_eq!(cfg.candidate_cache_timeout_ms, 10_000);
        assert_eq!(cfg.max_scan_restarts, 5);
        assert!(!cfg.firmware_roaming);
    }

    #[test]
    fn schedule_and_types_from_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("STALINK_CONNECTED_SCAN_SCHEDULE", "10, 30,60");
        guard.set("STALINK_CONNECTED_SCAN_TYPES", "low_latency,1,2");
        guard.remove("STALINK_SINGLE_SAVED_SCAN_SCHEDULE");

        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.connected_schedule.intervals_sec, vec![10, 30, 60]);
        assert_eq!(
            cfg.connected_schedule.scan_types,
            vec![ScanType::LowLatency, ScanType::LowPower, ScanType::HighAccuracy]
        );
        // The single-saved schedule follows the connected one unless set.
        assert_eq!(cfg.single_saved_schedule, cfg.connected_schedule);
    }

    #[test]
    fn malformed_schedule_falls_back() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("STALINK_DISCONNECTED_SCAN_SCHEDULE", "20,0,40");

        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.disconnected_schedule, ScheduleConfig::default());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("STALINK_FIRMWARE_ROAMING", "yes");
        guard.set("STALINK_ASK_BEFORE_SWITCH", "TRUE");
        guard.set("STALINK_SUFFICIENCY_CHECK", "0");

        let cfg = EngineConfig::from_env();
        assert!(cfg.firmware_roaming);
        assert!(cfg.ask_before_switch);
        assert!(!cfg.sufficiency_check);
    }
}
