use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::config::LoggingConfig;
use crate::fs::{config_path, read_config};
use crate::init::apply;

pub const LOGS_DISABLED_ENV: &str = "STALINK_LOGS_DISABLED";

/// Mirror the enabled flag into the environment for child helpers.
pub fn apply_env(cfg: &LoggingConfig) {
    if cfg.enabled {
        std::env::remove_var(LOGS_DISABLED_ENV);
    } else {
        std::env::set_var(LOGS_DISABLED_ENV, "1");
    }
}

/// Watch `config/logging.json` and reload the filter whenever it changes.
pub fn spawn_watcher(root: &Path, component: &str) -> Result<JoinHandle<()>> {
    let root = root.to_path_buf();
    let component = component.to_string();
    let path = config_path(&root);
    let watch_dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("missing logging config parent dir"))?
        .to_path_buf();

    std::fs::create_dir_all(&watch_dir)
        .with_context(|| format!("creating logging config dir {}", watch_dir.display()))?;

    let handle = thread::Builder::new()
        .name("log-config-watch".to_string())
        .spawn(move || {
            let (tx, rx) = mpsc::channel();
            let mut watcher = match notify::recommended_watcher(tx) {
                Ok(watcher) => watcher,
                Err(err) => {
                    tracing::warn!("Failed to start logging watcher: {}", err);
                    return;
                }
            };

            if let Err(err) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
                tracing::warn!("Failed to watch logging config dir: {}", err);
                return;
            }

            while let Ok(event) = rx.recv() {
                if touches_config(event, &path) {
                    let cfg = read_config(&root);
                    if let Err(err) = apply(&cfg, &component) {
                        tracing::warn!("Failed to apply logging config: {}", err);
                    }
                }
            }
            tracing::debug!("Logging watcher stopped");
        })
        .context("spawning logging watcher thread")?;

    Ok(handle)
}

fn touches_config(event: notify::Result<Event>, path: &PathBuf) -> bool {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!("Logging watcher error: {}", err);
            return false;
        }
    };

    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| p == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind};

    #[test]
    fn only_writes_to_the_config_file_count() {
        let path = PathBuf::from("/tmp/x/config/logging.json");
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert!(touches_config(Ok(create), &path));

        let other = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/x/config/networks.json"));
        assert!(!touches_config(Ok(other), &path));

        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path(path.clone());
        assert!(!touches_config(Ok(access), &path));
    }
}
