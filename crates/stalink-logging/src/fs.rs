use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::LoggingConfig;

pub fn config_dir(root: &Path) -> PathBuf {
    root.join("config")
}

pub fn config_path(root: &Path) -> PathBuf {
    config_dir(root).join("logging.json")
}

/// Read the logging config, seeding the file with defaults when it is missing.
pub fn read_config(root: &Path) -> LoggingConfig {
    let path = config_path(root);
    match read_json::<LoggingConfig>(&path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let cfg = LoggingConfig::default();
            if let Err(err) = write_json_atomic(&path, &cfg) {
                tracing::debug!("Could not seed {}: {:#}", path.display(), err);
            }
            cfg
        }
        Err(err) => {
            tracing::warn!("Ignoring unreadable logging config: {:#}", err);
            LoggingConfig::default()
        }
    }
}

pub fn write_config_atomic(root: &Path, cfg: &LoggingConfig) -> Result<()> {
    write_json_atomic(&config_path(root), cfg)
}

/// Read a JSON document. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

/// Write a JSON document through a temp file and rename so readers never see
/// a torn file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config dir {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).context("serializing config")?;

    let mut options = fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&tmp_path)
        .with_context(|| format!("opening {}", tmp_path.display()))?;
    std::io::Write::write_all(&mut file, &data)
        .with_context(|| format!("writing {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("syncing {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} -> {}", tmp_path.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_seeded_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = read_config(dir.path());
        assert_eq!(cfg, LoggingConfig::default());
        assert!(config_path(dir.path()).exists());
    }

    #[test]
    fn written_config_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            enabled: false,
            level: "warn,scan=trace".to_string(),
            keep_days: 2,
        };
        write_config_atomic(dir.path(), &cfg).unwrap();
        assert_eq!(read_config(dir.path()), cfg);
        assert!(!config_path(dir.path()).with_extension("json.tmp").exists());
    }

    #[test]
    fn garbage_config_yields_defaults_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();
        assert_eq!(read_config(dir.path()), LoggingConfig::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }
}
