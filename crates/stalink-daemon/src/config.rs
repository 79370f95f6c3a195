use std::env;
use std::path::PathBuf;
use std::time::Duration;

use stalink_connectivity::EngineConfig;
use stalink_supplicant::SessionConfig;

pub const DEFAULT_ROOT_PATH: &str = "/var/lib/stalink";
pub const DEFAULT_CTRL_DIR: &str = "/var/run/wpa_supplicant";
pub const DEFAULT_GLOBAL_CTRL: &str = "/var/run/wpa_supplicant-global";
pub const DEFAULT_IFACE: &str = "wlan0";
pub const DEFAULT_CTRL_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MONITOR_POLL_MS: u64 = 500;
pub const DEFAULT_SCAN_RESULT_WAIT_MS: u64 = 3000;
pub const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_REINIT_DELAY_MS: u64 = 5000;
pub const DEFAULT_MIN_RSSI_DBM: i32 = -80;
pub const NETWORKS_FILENAME: &str = "networks.json";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub root_path: PathBuf,
    pub ctrl_dir: PathBuf,
    pub global_ctrl_path: PathBuf,
    pub iface: String,
    pub ctrl_timeout: Duration,
    pub monitor_poll: Duration,
    /// How long a single scan is given before `SCAN_RESULTS` is read.
    pub scan_result_wait: Duration,
    pub liveness_interval: Duration,
    /// Delay before re-attaching after the supplicant went away.
    pub reinit_delay: Duration,
    pub screen_on: bool,
    /// Answer network-switch prompts with "accept" instead of "reject".
    pub auto_accept_switch: bool,
    pub min_rssi_dbm: i32,
    pub engine: EngineConfig,
    pub session: SessionConfig,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let root_path = env::var("STALINK_ROOT")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_PATH));
        let ctrl_dir = env::var("STALINK_CTRL_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CTRL_DIR));
        let global_ctrl_path = env::var("STALINK_GLOBAL_CTRL")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GLOBAL_CTRL));
        let iface = env::var("STALINK_IFACE").unwrap_or_else(|_| DEFAULT_IFACE.to_string());
        let ctrl_timeout_ms = env_parse("STALINK_CTRL_TIMEOUT_MS", DEFAULT_CTRL_TIMEOUT_MS);
        let monitor_poll_ms = env_parse("STALINK_MONITOR_POLL_MS", DEFAULT_MONITOR_POLL_MS);
        let scan_result_wait_ms =
            env_parse("STALINK_SCAN_RESULT_WAIT_MS", DEFAULT_SCAN_RESULT_WAIT_MS);
        let liveness_interval_ms =
            env_parse("STALINK_LIVENESS_INTERVAL_MS", DEFAULT_LIVENESS_INTERVAL_MS);
        let reinit_delay_ms = env_parse("STALINK_REINIT_DELAY_MS", DEFAULT_REINIT_DELAY_MS);

        let mut session = SessionConfig::default();
        session.not_found_ignore_window_ms = env_parse(
            "STALINK_NOT_FOUND_IGNORE_MS",
            session.not_found_ignore_window_ms,
        );

        Self {
            root_path,
            ctrl_dir,
            global_ctrl_path,
            iface,
            ctrl_timeout: Duration::from_millis(ctrl_timeout_ms),
            monitor_poll: Duration::from_millis(monitor_poll_ms.max(1)),
            scan_result_wait: Duration::from_millis(scan_result_wait_ms),
            liveness_interval: Duration::from_millis(liveness_interval_ms.max(1)),
            reinit_delay: Duration::from_millis(reinit_delay_ms),
            screen_on: env_bool("STALINK_SCREEN_ON", true),
            auto_accept_switch: env_bool("STALINK_AUTO_ACCEPT_SWITCH", false),
            min_rssi_dbm: env_parse("STALINK_MIN_RSSI_DBM", DEFAULT_MIN_RSSI_DBM),
            engine: EngineConfig::from_env(),
            session,
        }
    }

    pub fn networks_path(&self) -> PathBuf {
        stalink_logging::fs::config_dir(&self.root_path).join(NETWORKS_FILENAME)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(val) => matches!(val.as_str(), "1" | "true" | "TRUE" | "yes" | "on"),
        Err(_) => default,
    }
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
            self.remember(key);
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            self.remember(key);
            env::remove_var(key);
        }

        fn remember(&mut self, key: &str) {
            if !self.vars.iter().any(|(k, _)| k == key) {
                self.vars.push((key.to_string(), env::var(key).ok()));
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..) {
                match value {
                    Some(v) => env::set_var(&key, v),
                    None => env::remove_var(&key),
                }
            }
        }
    }

    #[test]
    fn defaults_apply_without_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut guard = EnvGuard::new();
        for key in [
            "STALINK_ROOT",
            "STALINK_IFACE",
            "STALINK_SCAN_RESULT_WAIT_MS",
            "STALINK_AUTO_ACCEPT_SWITCH",
            "STALINK_NOT_FOUND_IGNORE_MS",
        ] {
            guard.remove(key);
        }

        let cfg = DaemonConfig::from_env();
        assert_eq!(cfg.root_path, PathBuf::from(DEFAULT_ROOT_PATH));
        assert_eq!(cfg.iface, "wlan0");
        assert_eq!(cfg.scan_result_wait, Duration::from_millis(3000));
        assert!(!cfg.auto_accept_switch);
        assert_eq!(cfg.session.not_found_ignore_window_ms, 1000);
        assert_eq!(
            cfg.networks_path(),
            PathBuf::from("/var/lib/stalink/config/networks.json")
        );
    }

    #[test]
    fn env_overrides_are_parsed() {
        let _lock = ENV_LOCK.lock().unwrap();
        let mut guard = EnvGuard::new();
        guard.set("STALINK_ROOT", "/tmp/stalink-test");
        guard.set("STALINK_IFACE", "wlan1");
        guard.set("STALINK_MIN_RSSI_DBM", "-70");
        guard.set("STALINK_AUTO_ACCEPT_SWITCH", "1");
        guard.set("STALINK_LIVENESS_INTERVAL_MS", "not-a-number");

        let cfg = DaemonConfig::from_env();
        assert_eq!(cfg.root_path, PathBuf::from("/tmp/stalink-test"));
        assert_eq!(cfg.iface, "wlan1");
        assert_eq!(cfg.min_rssi_dbm, -70);
        assert!(cfg.auto_accept_switch);
        assert_eq!(
            cfg.liveness_interval,
            Duration::from_millis(DEFAULT_LIVENESS_INTERVAL_MS)
        );
    }
}
