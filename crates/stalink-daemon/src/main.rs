#![deny(unsafe_op_in_unsafe_fn)]

use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use stalink_daemon::events::post;
use stalink_daemon::monitor::{spawn_liveness, spawn_monitor, MonitorConfig};
use stalink_daemon::scanner::DaemonScanner;
use stalink_daemon::store::JsonConfigStore;
use stalink_daemon::{Daemon, DaemonConfig, DaemonEvent};
use stalink_supplicant::wpa_ctrl::WpaCtrlChannel;
use stalink_supplicant::{Clock, MonotonicClock};
use tokio::runtime::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const COMPONENT: &str = "stalinkd";

// Two workers: scans and the liveness ping spend most of their time in
// spawn_blocking, and the event loop has its own blocking thread.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let config = DaemonConfig::from_env();
    let log_cfg = stalink_logging::fs::read_config(&config.root_path);
    let _logging_guards = stalink_logging::init(COMPONENT, &config.root_path, &log_cfg)?;

    install_panic_hook();

    let _log_watcher = match stalink_logging::spawn_watcher(&config.root_path, COMPONENT) {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!("Logging watcher disabled: {}", err);
            None
        }
    };

    let span = tracing::info_span!("stalinkd", component = COMPONENT);
    let _span_guard = span.enter();

    let global_cancel = CancellationToken::new();
    spawn_retention_task(config.root_path.clone(), global_cancel.clone());

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let store = Arc::new(
        JsonConfigStore::load(config.networks_path(), Arc::clone(&clock))
            .context("loading saved networks")?,
    );
    let channel = Arc::new(
        WpaCtrlChannel::new(config.ctrl_dir.clone(), config.global_ctrl_path.clone())
            .with_timeout(config.ctrl_timeout),
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Handle::current();
    let scanner = Arc::new(DaemonScanner::new(
        Arc::clone(&channel),
        config.iface.clone(),
        handle.clone(),
        tx.clone(),
        config.scan_result_wait,
    ));
    let daemon = Daemon::build(
        config.clone(),
        channel.clone(),
        scanner,
        store,
        clock,
        handle,
        tx.clone(),
    );

    // The first bring-up runs on the loop thread like every later one.
    post(&tx, DaemonEvent::Reinitialize);

    let monitor_handle = spawn_monitor(
        MonitorConfig {
            ctrl_dir: config.ctrl_dir.clone(),
            iface: config.iface.clone(),
            poll: config.monitor_poll,
            reattach_delay: config.reinit_delay,
        },
        tx.clone(),
        global_cancel.clone(),
    );
    let liveness_handle = spawn_liveness(
        Arc::clone(&channel),
        config.liveness_interval,
        global_cancel.clone(),
    );

    spawn_signal_handler(tx.clone());

    info!("stalinkd ready on {}", config.iface);
    let loop_handle = tokio::task::spawn_blocking(move || daemon.run_blocking(rx));
    if let Err(err) = loop_handle.await {
        error!("Event loop terminated abnormally: {}", err);
    }

    info!("Starting graceful shutdown...");
    global_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), liveness_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), monitor_handle).await;

    info!("stalinkd stopped");
    Ok(())
}

fn spawn_signal_handler(tx: stalink_daemon::events::EventTx) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to register SIGTERM handler: {}", err);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to register SIGINT handler: {}", err);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            },
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            },
        }

        post(&tx, DaemonEvent::Shutdown);
    });
}

fn spawn_retention_task(root: PathBuf, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Log retention task stopped by shutdown signal");
                    break;
                }
                _ = interval.tick() => {
                    let cfg = stalink_logging::fs::read_config(&root);
                    if let Err(err) = stalink_logging::run_retention(&root, COMPONENT, &cfg) {
                        warn!("Log retention failed: {}", err);
                    }
                }
            }
        }
    });
}

/// Logs panics with location and backtrace before the default hook runs.
fn install_panic_hook() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        let backtrace = std::backtrace::Backtrace::capture();
        error!(
            target: "stalinkd::panic",
            location = %location,
            message = %message,
            "PANIC: daemon panicked"
        );
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            error!(target: "stalinkd::panic", backtrace = %backtrace, "Panic backtrace");
        } else {
            error!(
                target: "stalinkd::panic",
                "Backtrace not available (set RUST_BACKTRACE=1 to enable)"
            );
        }

        default_hook(panic_info);
    }));
}
