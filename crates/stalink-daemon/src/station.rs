//! Client-mode interface state as the engine sees it, and the connect
//! primitives that feed the event loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stalink_connectivity::{
    ClientModeInfo, CmmRole, ConnectivityError, StationControl,
};
use stalink_logging::targets::T_CONNECTIVITY;
use stalink_supplicant::{Ssid, WifiConfig};
use tracing::info;

use crate::events::{DaemonEvent, EventTx};

/// Shared snapshot of the daemon's interfaces. The event loop updates it
/// from supplicant events; the engine reads it through [`DaemonStation`].
#[derive(Clone, Default)]
pub struct ClientTable {
    inner: Arc<Mutex<Vec<ClientModeInfo>>>,
}

impl ClientTable {
    fn lock(&self) -> MutexGuard<'_, Vec<ClientModeInfo>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, iface: &str, role: CmmRole) {
        let mut clients = self.lock();
        if !clients.iter().any(|c| c.iface == iface) {
            clients.push(ClientModeInfo::new(iface, role));
        }
    }

    pub fn remove(&self, iface: &str) {
        self.lock().retain(|c| c.iface != iface);
    }

    pub fn snapshot(&self) -> Vec<ClientModeInfo> {
        self.lock().clone()
    }

    pub fn get(&self, iface: &str) -> Option<ClientModeInfo> {
        self.lock().iter().find(|c| c.iface == iface).cloned()
    }

    pub fn update(&self, iface: &str, f: impl FnOnce(&mut ClientModeInfo)) -> bool {
        match self.lock().iter_mut().find(|c| c.iface == iface) {
            Some(client) => {
                f(client);
                true
            }
            None => false,
        }
    }

    pub fn set_connecting(&self, iface: &str, config: &WifiConfig, bssid: Option<&str>) {
        self.update(iface, |c| {
            c.connecting = Some(config.clone());
            c.connecting_bssid = bssid.map(str::to_string);
        });
    }

    /// Promotes the pending attempt, or keeps the current network when the
    /// completion belongs to a roam.
    pub fn set_connected(&self, iface: &str, network_id: i32, bssid: Option<&str>) -> Option<WifiConfig> {
        let mut connected = None;
        self.update(iface, |c| {
            let config = c
                .connecting
                .take()
                .filter(|cfg| cfg.network_id == network_id)
                .or_else(|| c.connected.take().filter(|cfg| cfg.network_id == network_id));
            c.connecting_bssid = None;
            if let Some(config) = config {
                c.connected = Some(config.clone());
                c.connected_bssid = bssid.map(str::to_string);
                connected = Some(config);
            }
        });
        connected
    }

    pub fn set_disconnected(&self, iface: &str) {
        self.update(iface, |c| {
            c.connected = None;
            c.connected_bssid = None;
            c.connecting = None;
            c.connecting_bssid = None;
            c.frequency_mhz = None;
            c.sufficient = false;
            c.affiliated_bssids.clear();
        });
    }

    pub fn clear_connecting(&self, iface: &str) -> Option<WifiConfig> {
        let mut pending = None;
        self.update(iface, |c| {
            pending = c.connecting.take();
            c.connecting_bssid = None;
        });
        pending
    }
}

/// Station control for a single primary interface. Connect and roam
/// requests are queued for the event loop, which owns the session.
pub struct DaemonStation {
    clients: ClientTable,
    tx: EventTx,
}

impl DaemonStation {
    pub fn new(clients: ClientTable, tx: EventTx) -> Self {
        Self { clients, tx }
    }

    fn send(&self, iface: &str, op: &'static str, event: DaemonEvent) -> stalink_connectivity::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| ConnectivityError::station(iface, op, "event loop stopped"))
    }
}

impl StationControl for DaemonStation {
    fn clients(&self) -> Vec<ClientModeInfo> {
        self.clients.snapshot()
    }

    fn connect(&self, iface: &str, config: &WifiConfig, target_bssid: &str) -> stalink_connectivity::Result<()> {
        if self.clients.get(iface).is_none() {
            return Err(ConnectivityError::station(iface, "connect", "unknown interface"));
        }
        self.clients
            .set_connecting(iface, config, config.candidate_bssid.as_deref());
        self.send(
            iface,
            "connect",
            DaemonEvent::Connect {
                iface: iface.to_string(),
                config: config.clone(),
                bssid: target_bssid.to_string(),
            },
        )
    }

    fn roam(&self, iface: &str, network_id: i32, target_bssid: &str) -> stalink_connectivity::Result<()> {
        self.send(
            iface,
            "roam",
            DaemonEvent::Roam {
                iface: iface.to_string(),
                network_id,
                bssid: target_bssid.to_string(),
            },
        )
    }

    fn disconnect(&self, iface: &str) -> stalink_connectivity::Result<()> {
        self.send(
            iface,
            "disconnect",
            DaemonEvent::Disconnect {
                iface: iface.to_string(),
            },
        )
    }

    fn can_request_secondary(&self, _role: CmmRole) -> bool {
        false
    }

    fn secondary_would_delete_privileged(&self) -> bool {
        false
    }

    fn request_secondary(
        &self,
        role: CmmRole,
        ssid: &Ssid,
        _bssid: Option<&str>,
    ) -> Option<ClientModeInfo> {
        info!(target: T_CONNECTIVITY, role = ?role, ssid = %ssid, "secondary_unsupported");
        None
    }

    fn stop_secondary_transients(&self) {}

    fn on_network_switch_accepted(&self, network_id: i32, bssid: Option<&str>) {
        info!(
            target: T_CONNECTIVITY,
            net_id = network_id,
            bssid = bssid.unwrap_or(""),
            "network_switch_accepted"
        );
    }

    fn on_network_switch_rejected(&self, network_id: i32, bssid: Option<&str>) {
        info!(
            target: T_CONNECTIVITY,
            net_id = network_id,
            bssid = bssid.unwrap_or(""),
            "network_switch_rejected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stalink_supplicant::SecurityType;
    use tokio::sync::mpsc;

    #[test]
    fn connect_marks_pending_and_queues_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let clients = ClientTable::default();
        clients.add("wlan0", CmmRole::Primary);
        let station = DaemonStation::new(clients.clone(), tx);

        let mut config = WifiConfig::new(1, "home", SecurityType::Psk);
        config.candidate_bssid = Some("aa:bb:cc:dd:ee:ff".into());
        station.connect("wlan0", &config, "any").unwrap();

        let info = clients.get("wlan0").unwrap();
        assert_eq!(info.connecting.map(|c| c.network_id), Some(1));
        assert_eq!(info.connecting_bssid.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        match rx.try_recv() {
            Ok(DaemonEvent::Connect { iface, bssid, .. }) => {
                assert_eq!(iface, "wlan0");
                assert_eq!(bssid, "any");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(station.connect("wlan9", &config, "any").is_err());
    }

    #[test]
    fn completion_promotes_pending_and_roam_keeps_current() {
        let clients = ClientTable::default();
        clients.add("wlan0", CmmRole::Primary);
        clients.set_connecting("wlan0", &WifiConfig::new(1, "home", SecurityType::Psk), None);

        assert!(clients.set_connected("wlan0", 1, Some("aa:00:00:00:00:01")).is_some());
        assert!(clients.set_connected("wlan0", 1, Some("aa:00:00:00:00:02")).is_some());
        let info = clients.get("wlan0").unwrap();
        assert_eq!(info.connected_bssid.as_deref(), Some("aa:00:00:00:00:02"));
        assert!(info.connecting.is_none());

        assert!(clients.set_connected("wlan0", 7, None).is_none());
        assert!(clients.get("wlan0").unwrap().connected.is_none());

        clients.set_disconnected("wlan0");
        assert!(!clients.get("wlan0").unwrap().is_connected());
    }

    #[test]
    fn closed_queue_fails_the_request() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let clients = ClientTable::default();
        clients.add("wlan0", CmmRole::Primary);
        let station = DaemonStation::new(clients, tx);
        assert!(station.roam("wlan0", 1, "aa:bb:cc:dd:ee:ff").is_err());
    }
}
