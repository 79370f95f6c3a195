//! Single and background scans over the control socket.
//!
//! wpa_supplicant has no offload for preferred-network scans on most
//! drivers, so PNO is emulated with periodic scans that only report back
//! once a listed SSID shows up.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use stalink_connectivity::pno::PnoRequest;
use stalink_connectivity::{ConnectivityError, ScanData, ScanProvider, ScanRequest, ScanResult};
use stalink_logging::targets::T_SCAN;
use stalink_supplicant::channel::ChannelResult;
use stalink_supplicant::wpa_ctrl::{BssEntry, WpaCtrlChannel};
use stalink_supplicant::Ssid;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{post, DaemonEvent, EventTx};

/// The two socket commands a scan needs.
pub trait ScanBackend: Send + Sync + 'static {
    fn trigger(&self, iface: &str, frequencies: &[u32]) -> ChannelResult<()>;
    fn results(&self, iface: &str) -> ChannelResult<Vec<BssEntry>>;
}

impl ScanBackend for WpaCtrlChannel {
    fn trigger(&self, iface: &str, frequencies: &[u32]) -> ChannelResult<()> {
        self.scan(iface, frequencies)
    }

    fn results(&self, iface: &str) -> ChannelResult<Vec<BssEntry>> {
        self.scan_results(iface)
    }
}

pub fn to_scan_result(entry: &BssEntry) -> ScanResult {
    ScanResult {
        ssid: Ssid::from(entry.ssid.as_str()),
        bssid: entry.bssid.to_ascii_lowercase(),
        frequency_mhz: entry.frequency_mhz,
        rssi_dbm: entry.level_dbm,
        security: vec![entry.security()],
    }
}

/// Trigger, wait, then read the table. Runs the socket calls off the
/// async workers.
async fn scan_once<B: ScanBackend>(
    backend: &Arc<B>,
    iface: &str,
    channels: Vec<u32>,
    wait: Duration,
) -> Result<Vec<ScanResult>, String> {
    let trigger_backend = Arc::clone(backend);
    let trigger_iface = iface.to_string();
    tokio::task::spawn_blocking(move || trigger_backend.trigger(&trigger_iface, &channels))
        .await
        .map_err(|err| err.to_string())?
        .map_err(|err| err.to_string())?;

    tokio::time::sleep(wait).await;

    let read_backend = Arc::clone(backend);
    let read_iface = iface.to_string();
    let entries = tokio::task::spawn_blocking(move || read_backend.results(&read_iface))
        .await
        .map_err(|err| err.to_string())?
        .map_err(|err| err.to_string())?;
    Ok(entries.iter().map(to_scan_result).collect())
}

pub struct DaemonScanner<B: ScanBackend> {
    backend: Arc<B>,
    iface: String,
    handle: Handle,
    tx: EventTx,
    result_wait: Duration,
    pno: Mutex<Option<CancellationToken>>,
}

impl<B: ScanBackend> DaemonScanner<B> {
    pub fn new(
        backend: Arc<B>,
        iface: impl Into<String>,
        handle: Handle,
        tx: EventTx,
        result_wait: Duration,
    ) -> Self {
        Self {
            backend,
            iface: iface.into(),
            handle,
            tx,
            result_wait,
            pno: Mutex::new(None),
        }
    }

    pub fn is_pno_running(&self) -> bool {
        self.pno
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }
}

impl<B: ScanBackend> ScanProvider for DaemonScanner<B> {
    fn start_scan(&self, request: &ScanRequest) -> stalink_connectivity::Result<()> {
        let backend = Arc::clone(&self.backend);
        let iface = self.iface.clone();
        let tx = self.tx.clone();
        let wait = self.result_wait;
        let channels = request.channels.clone();
        let full_band = request.is_full_band();
        debug!(
            target: T_SCAN,
            iface = %iface,
            channels = channels.len(),
            scan_type = ?request.scan_type,
            "single_scan_start"
        );

        self.handle.spawn(async move {
            match scan_once(&backend, &iface, channels, wait).await {
                Ok(results) => {
                    info!(target: T_SCAN, iface = %iface, count = results.len(), full_band, "single_scan_done");
                    post(&tx, DaemonEvent::ScanResults(ScanData { results, full_band }));
                }
                Err(reason) => {
                    warn!(target: T_SCAN, iface = %iface, reason = %reason, "single_scan_failed");
                    post(&tx, DaemonEvent::ScanFailed { full_band, reason });
                }
            }
        });
        Ok(())
    }

    fn start_pno_scan(&self, request: &PnoRequest) -> stalink_connectivity::Result<()> {
        if request.networks.is_empty() {
            return Err(ConnectivityError::Pno {
                reason: "empty network list".into(),
            });
        }
        let token = CancellationToken::new();
        if let Some(previous) = self
            .pno
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            previous.cancel();
        }

        let wanted: Vec<Ssid> = request.networks.iter().map(|n| n.ssid.clone()).collect();
        // A network without a channel hint forces a full-band scan.
        let channels: Vec<u32> = if request.networks.iter().any(|n| n.frequencies.is_empty()) {
            Vec::new()
        } else {
            let mut set = Vec::new();
            for freq in request.networks.iter().flat_map(|n| n.frequencies.iter()) {
                if !set.contains(freq) {
                    set.push(*freq);
                }
            }
            set
        };
        let interval = Duration::from_millis(request.interval_ms.max(1));
        let backend = Arc::clone(&self.backend);
        let iface = self.iface.clone();
        let tx = self.tx.clone();
        let wait = self.result_wait;
        info!(
            target: T_SCAN,
            iface = %iface,
            networks = wanted.len(),
            interval_ms = request.interval_ms,
            "pno_scan_start"
        );

        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(target: T_SCAN, "pno_scan_stopped");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
                let outcome = tokio::select! {
                    _ = token.cancelled() => return,
                    outcome = scan_once(&backend, &iface, channels.clone(), wait) => outcome,
                };
                match outcome {
                    Ok(results) => {
                        let matched: Vec<ScanResult> = results
                            .into_iter()
                            .filter(|r| wanted.contains(&r.ssid))
                            .collect();
                        if matched.is_empty() {
                            continue;
                        }
                        token.cancel();
                        info!(target: T_SCAN, count = matched.len(), "pno_network_found");
                        post(&tx, DaemonEvent::PnoResults(matched));
                        return;
                    }
                    Err(reason) => {
                        token.cancel();
                        warn!(target: T_SCAN, reason = %reason, "pno_scan_failed");
                        post(&tx, DaemonEvent::PnoFailed { reason });
                        return;
                    }
                }
            }
        });
        Ok(())
    }

    fn stop_pno_scan(&self) {
        if let Some(token) = self
            .pno
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}
