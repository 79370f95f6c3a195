use std::path::Path;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_log::LogTracer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::targets::{self, T_CONNECTIVITY, T_SCAN, T_SUPPLICANT};
use crate::watch::apply_env;

static RELOAD: OnceCell<reload::Handle<EnvFilter, Registry>> = OnceCell::new();

/// Keeps the non-blocking file writers alive. Drop flushes them.
pub struct LoggingGuards {
    _file_guards: Vec<WorkerGuard>,
}

pub fn init(component: &str, root: &Path, cfg: &LoggingConfig) -> Result<LoggingGuards> {
    let (filter_layer, handle) = reload::Layer::new(build_filter(cfg));
    let _ = RELOAD.set(handle);

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    let base = tracing_subscriber::registry()
        .with(filter_layer)
        .with(ErrorLayer::default())
        .with(stdout_layer);

    let log_dir = root.join("logs");
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        base.try_init().ok();
        let _ = LogTracer::init();
        apply_env(cfg);
        tracing::warn!("File logging disabled ({}): {}", log_dir.display(), err);
        return Ok(LoggingGuards {
            _file_guards: Vec::new(),
        });
    }

    let mut warn_msg = None;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) =
            std::fs::set_permissions(&log_dir, std::fs::Permissions::from_mode(0o750))
        {
            warn_msg = Some(format!(
                "Failed to set log directory permissions ({}): {}",
                log_dir.display(),
                err
            ));
        }
    }

    let component_appender =
        tracing_appender::rolling::daily(&log_dir, targets::file_name(component));
    let (component_writer, component_guard) = tracing_appender::non_blocking(component_appender);
    let component_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_writer(component_writer)
        .with_filter(component_targets());

    let (supplicant_layer, supplicant_guard) = subsystem_layer(&log_dir, T_SUPPLICANT);
    let (connectivity_layer, connectivity_guard) = subsystem_layer(&log_dir, T_CONNECTIVITY);
    let (scan_layer, scan_guard) = subsystem_layer(&log_dir, T_SCAN);

    base.with(component_layer)
        .with(supplicant_layer)
        .with(connectivity_layer)
        .with(scan_layer)
        .try_init()
        .ok();
    let _ = LogTracer::init();
    apply_env(cfg);

    if let Some(message) = warn_msg {
        tracing::warn!("{message}");
    }

    Ok(LoggingGuards {
        _file_guards: vec![
            component_guard,
            supplicant_guard,
            connectivity_guard,
            scan_guard,
        ],
    })
}

/// Re-apply a changed config to the running subscriber.
pub fn apply(cfg: &LoggingConfig, component: &str) -> Result<()> {
    let handle = RELOAD
        .get()
        .ok_or_else(|| anyhow::anyhow!("logging not initialized for {component}"))?;
    handle.reload(build_filter(cfg))?;
    apply_env(cfg);
    tracing::info!(component, level = %cfg.level, enabled = cfg.enabled, "logging_reloaded");
    Ok(())
}

pub(crate) fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    if !cfg.enabled {
        return EnvFilter::new("off");
    }
    EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn component_targets() -> Targets {
    targets::ALL
        .iter()
        .fold(Targets::new().with_default(LevelFilter::TRACE), |acc, target| {
            acc.with_target(*target, LevelFilter::OFF)
        })
}

fn subsystem_layer<S>(
    log_dir: &Path,
    target: &'static str,
) -> (impl Layer<S> + Send + Sync, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(log_dir, targets::file_name(target));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_writer(writer)
        .with_filter(Targets::new().with_target(target, LevelFilter::TRACE));
    (layer, guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_turns_everything_off() {
        let cfg = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        assert_eq!(build_filter(&cfg).to_string(), "off");
    }

    #[test]
    fn invalid_level_falls_back_to_info() {
        let cfg = LoggingConfig {
            level: "supplicant=notalevel".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(build_filter(&cfg).to_string(), "info");
    }
}
