//! Messages consumed by the daemon's single event loop, plus the adapters
//! that let library callbacks post onto it.

use stalink_connectivity::dialog::DialogId;
use stalink_connectivity::{ScanData, ScanResult, TimerKind};
use stalink_supplicant::{DaemonCallback, DeathRecipient, EventSink, SupplicantEvent, WifiConfig};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum DaemonEvent {
    Timer(TimerKind),
    ScanResults(ScanData),
    ScanFailed { full_band: bool, reason: String },
    PnoResults(Vec<ScanResult>),
    PnoFailed { reason: String },
    /// Raw callback read from the monitor socket.
    Callback { iface: String, callback: DaemonCallback },
    /// Classified event published by the session.
    Supplicant(SupplicantEvent),
    ChannelDied { generation: u64 },
    /// Posted by the session's death handler once state is cleared.
    SupplicantLost,
    Reinitialize,
    Connect {
        iface: String,
        config: WifiConfig,
        bssid: String,
    },
    Roam {
        iface: String,
        network_id: i32,
        bssid: String,
    },
    Disconnect { iface: String },
    DialogAnswer { id: DialogId, accepted: bool },
    Shutdown,
}

pub type EventTx = UnboundedSender<DaemonEvent>;

/// Posts an event, ignoring a closed queue during shutdown.
pub fn post(tx: &EventTx, event: DaemonEvent) {
    if tx.send(event).is_err() {
        debug!("event queue closed, dropping event");
    }
}

/// Publishes session events onto the queue.
pub struct QueueSink {
    tx: EventTx,
}

impl QueueSink {
    pub fn new(tx: EventTx) -> Self {
        Self { tx }
    }
}

impl EventSink for QueueSink {
    fn publish(&self, event: SupplicantEvent) {
        post(&self.tx, DaemonEvent::Supplicant(event));
    }
}

/// Forwards liveness loss onto the queue so the session handles it in order.
pub struct QueueDeathRecipient {
    tx: EventTx,
}

impl QueueDeathRecipient {
    pub fn new(tx: EventTx) -> Self {
        Self { tx }
    }
}

impl DeathRecipient for QueueDeathRecipient {
    fn channel_died(&self, generation: u64) {
        post(&self.tx, DaemonEvent::ChannelDied { generation });
    }
}
