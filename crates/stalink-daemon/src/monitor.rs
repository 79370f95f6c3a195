//! Blocking reader for the supplicant's unsolicited events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stalink_logging::targets::T_SUPPLICANT;
use stalink_supplicant::wpa_ctrl::{WpaCtrlChannel, WpaEventMonitor};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{post, DaemonEvent, EventTx};

pub struct MonitorConfig {
    pub ctrl_dir: PathBuf,
    pub iface: String,
    pub poll: Duration,
    pub reattach_delay: Duration,
}

/// Reads `CTRL-EVENT-*` lines on a blocking thread and posts them as
/// callbacks. A lost socket is re-attached after `reattach_delay`.
pub fn spawn_monitor(cfg: MonitorConfig, tx: EventTx, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || run_monitor(&cfg, &tx, &cancel))
}

fn run_monitor(cfg: &MonitorConfig, tx: &EventTx, cancel: &CancellationToken) {
    while !cancel.is_cancelled() {
        let monitor = match WpaEventMonitor::attach(&cfg.ctrl_dir, &cfg.iface, cfg.poll) {
            Ok(monitor) => monitor,
            Err(err) => {
                debug!(target: T_SUPPLICANT, iface = %cfg.iface, error = %err, "event_monitor_attach_failed");
                wait_or_cancel(cancel, cfg.reattach_delay, cfg.poll);
                continue;
            }
        };
        info!(target: T_SUPPLICANT, iface = %cfg.iface, "event_monitor_attached");

        while !cancel.is_cancelled() {
            match monitor.next_event() {
                Ok(Some(callback)) => post(
                    tx,
                    DaemonEvent::Callback {
                        iface: cfg.iface.clone(),
                        callback,
                    },
                ),
                Ok(None) => {}
                Err(err) => {
                    warn!(target: T_SUPPLICANT, iface = %cfg.iface, error = %err, "event_monitor_lost");
                    break;
                }
            }
        }
    }
    debug!(target: T_SUPPLICANT, iface = %cfg.iface, "event_monitor_stopped");
}

fn wait_or_cancel(cancel: &CancellationToken, total: Duration, step: Duration) {
    let deadline = Instant::now() + total;
    while !cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(step.min(deadline - now));
    }
}

/// Pings the global control socket every `interval`. A transport failure
/// is reported through the channel's death link.
pub fn spawn_liveness(
    channel: Arc<WpaCtrlChannel>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let channel = Arc::clone(&channel);
                    match tokio::task::spawn_blocking(move || channel.check_liveness()).await {
                        Ok(true) => {}
                        Ok(false) => debug!(target: T_SUPPLICANT, "liveness_check_failed"),
                        Err(err) => warn!(target: T_SUPPLICANT, error = %err, "liveness_task_failed"),
                    }
                }
            }
        }
    })
}
