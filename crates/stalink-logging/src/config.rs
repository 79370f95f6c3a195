use serde::{Deserialize, Serialize};

/// Persisted logging settings.
///
/// `level` accepts any `EnvFilter` directive string, e.g.
/// `"info,supplicant=debug"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: String,
    pub keep_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            keep_days: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"debug"}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.keep_days, 7);
    }
}
