use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};

use crate::config::LoggingConfig;
use crate::targets;

const MAX_LOG_BYTES: u64 = 64 * 1024 * 1024;

struct LogFile {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

/// Drop logs older than `keep_days`, then the oldest files until the directory
/// is under the size cap. Returns the number of files removed.
pub fn run_retention(root: &Path, component: &str, cfg: &LoggingConfig) -> Result<usize> {
    let log_root = root.join("logs");
    if !log_root.exists() {
        return Ok(0);
    }
    let mut prefixes: Vec<String> = targets::ALL.iter().map(|t| targets::file_name(t)).collect();
    prefixes.push(targets::file_name(component));

    let mut entries = collect_log_files(&log_root, &prefixes)?;
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(cfg.keep_days.saturating_mul(24 * 60 * 60)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    entries.retain(|entry| {
        if entry.modified >= cutoff {
            return true;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                removed += 1;
                false
            }
            Err(err) => {
                tracing::warn!("Failed to remove old log {}: {}", entry.path.display(), err);
                true
            }
        }
    });

    let mut total_size: u64 = entries.iter().map(|e| e.size).sum();
    if total_size > MAX_LOG_BYTES {
        entries.sort_by_key(|e| e.modified);
        for entry in entries {
            if total_size <= MAX_LOG_BYTES {
                break;
            }
            if let Err(err) = fs::remove_file(&entry.path) {
                tracing::warn!(
                    "Failed to remove log {} during size cap cleanup: {}",
                    entry.path.display(),
                    err
                );
                continue;
            }
            removed += 1;
            total_size = total_size.saturating_sub(entry.size);
        }
    }

    Ok(removed)
}

fn collect_log_files(dir: &Path, prefixes: &[String]) -> Result<Vec<LogFile>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("iterating {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            continue;
        }

        let metadata = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        files.push(LogFile {
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
            path,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_fresh_logs_and_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("supplicant.log.2026-10-18"), "a").unwrap();
        fs::write(logs.join("stalinkd.log.2026-10-18"), "b").unwrap();
        fs::write(logs.join("notes.txt"), "c").unwrap();

        let removed = run_retention(dir.path(), "stalinkd", &LoggingConfig::default()).unwrap();
        assert_eq!(removed, 0);
        assert!(logs.join("notes.txt").exists());
    }

    #[test]
    fn zero_keep_days_prunes_matching_logs_only() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join("scan.log.2026-10-01"), "old").unwrap();
        fs::write(logs.join("notes.txt"), "keep").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let cfg = LoggingConfig {
            keep_days: 0,
            ..LoggingConfig::default()
        };
        let removed = run_retention(dir.path(), "stalinkd", &cfg).unwrap();
        assert_eq!(removed, 1);
        assert!(!logs.join("scan.log.2026-10-01").exists());
        assert!(logs.join("notes.txt").exists());
    }

    #[test]
    fn missing_log_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            run_retention(dir.path(), "stalinkd", &LoggingConfig::default()).unwrap(),
            0
        );
    }
}
