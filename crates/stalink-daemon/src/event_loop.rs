//! The daemon's serialized event loop.
//!
//! Every input (timer fires, scan completions, monitor callbacks, session
//! events, death notifications) arrives as a [`DaemonEvent`] on one mpsc
//! queue and is applied to the session and engine in order. Nothing else
//! touches either of them. Session calls block on the control socket, so
//! the loop runs on a blocking thread rather than an async worker.

use std::sync::Arc;

use stalink_connectivity::{
    AttemptOutcome, CmmRole, ConfigStore, ConnectivityEngine, FailureReason, ScanProvider,
    ScanResult, WifiState,
};
use stalink_logging::targets::{T_CONNECTIVITY, T_SUPPLICANT};
use stalink_supplicant::{
    AuthFailureReason, Clock, SessionChannel, StaState, SupplicantEvent, SupplicantSession,
    WifiConfig, SUPPLICANT_BSSID_ANY,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, trace, warn};

use crate::config::DaemonConfig;
use crate::dialogs::AutoAnswerDialogs;
use crate::events::{post, DaemonEvent, EventTx, QueueDeathRecipient, QueueSink};
use crate::selector::{RssiSelector, SUFFICIENT_RSSI_DBM};
use crate::station::{ClientTable, DaemonStation};
use crate::store::JsonConfigStore;
use crate::timers::TokioTimers;

pub struct Daemon {
    config: DaemonConfig,
    session: SupplicantSession,
    engine: ConnectivityEngine,
    store: Arc<JsonConfigStore>,
    timers: Arc<TokioTimers>,
    clients: ClientTable,
    handle: Handle,
    tx: EventTx,
}

impl Daemon {
    /// Wires the session and engine with the daemon's adapters. Scans go
    /// through `scanner`; everything posts back onto `tx`.
    pub fn build(
        config: DaemonConfig,
        channel: Arc<dyn SessionChannel>,
        scanner: Arc<dyn ScanProvider>,
        store: Arc<JsonConfigStore>,
        clock: Arc<dyn Clock>,
        handle: Handle,
        tx: EventTx,
    ) -> Self {
        let mut session = SupplicantSession::new(
            channel,
            Arc::new(QueueSink::new(tx.clone())),
            Arc::new(QueueDeathRecipient::new(tx.clone())),
            Arc::clone(&clock),
            config.session.clone(),
        );
        let death_tx = tx.clone();
        session.register_death_handler(Box::new(move || {
            post(&death_tx, DaemonEvent::SupplicantLost);
        }));

        let clients = ClientTable::default();
        clients.add(&config.iface, CmmRole::Primary);
        let timers = Arc::new(TokioTimers::new(handle.clone(), tx.clone()));
        let engine = ConnectivityEngine::new(
            config.engine.clone(),
            scanner,
            Arc::new(RssiSelector::new(store.clone(), config.min_rssi_dbm)),
            store.clone(),
            Arc::new(DaemonStation::new(clients.clone(), tx.clone())),
            Arc::new(AutoAnswerDialogs::new(tx.clone(), config.auto_accept_switch)),
            timers.clone(),
            clock,
        );

        Self {
            config,
            session,
            engine,
            store,
            timers,
            clients,
            handle,
            tx,
        }
    }

    pub fn engine(&self) -> &ConnectivityEngine {
        &self.engine
    }

    pub fn session(&self) -> &SupplicantSession {
        &self.session
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    /// Attach to the supplicant, set up the station interface and start the
    /// engine.
    pub fn bring_up(&mut self) -> stalink_supplicant::Result<()> {
        self.session.initialize()?;
        if !self.session.has_iface(&self.config.iface) {
            self.session.setup_iface(&self.config.iface)?;
        }
        self.clients.add(&self.config.iface, CmmRole::Primary);
        self.engine.set_trusted_connection_allowed(true);
        self.engine.handle_screen_state_changed(self.config.screen_on);
        self.engine.set_wifi_enabled(true);
        self.engine
            .handle_connection_state_changed(&self.config.iface, CmmRole::Primary, WifiState::Disconnected);
        info!(target: T_SUPPLICANT, iface = %self.config.iface, "station_ready");
        Ok(())
    }

    /// Drains the queue until [`DaemonEvent::Shutdown`] or until every
    /// sender is gone.
    pub fn run_blocking(mut self, mut rx: UnboundedReceiver<DaemonEvent>) {
        while let Some(event) = rx.blocking_recv() {
            if !self.handle_event(event) {
                break;
            }
        }
        self.shut_down();
    }

    /// Applies one event. Returns false once the loop should stop.
    pub fn handle_event(&mut self, event: DaemonEvent) -> bool {
        match event {
            DaemonEvent::Timer(kind) => self.engine.on_timer(kind),
            DaemonEvent::ScanResults(data) => {
                self.observe_scan(&data.results);
                self.engine.on_scan_results(data);
            }
            DaemonEvent::ScanFailed { full_band, reason } => {
                self.engine.on_single_scan_failure(full_band, &reason)
            }
            DaemonEvent::PnoResults(results) => {
                self.observe_scan(&results);
                self.engine.on_pno_results(results);
            }
            DaemonEvent::PnoFailed { reason } => self.engine.on_pno_failure(&reason),
            DaemonEvent::Callback { iface, callback } => {
                self.session.handle_callback(&iface, callback)
            }
            DaemonEvent::Supplicant(event) => self.on_supplicant_event(event),
            DaemonEvent::ChannelDied { generation } => self.session.on_channel_death(generation),
            DaemonEvent::SupplicantLost => self.on_supplicant_lost(),
            DaemonEvent::Reinitialize => {
                if let Err(err) = self.bring_up() {
                    warn!(target: T_SUPPLICANT, error = %err, "supplicant_reinit_failed");
                    self.schedule_reinit();
                }
            }
            DaemonEvent::Connect {
                iface,
                mut config,
                bssid,
            } => {
                config.selection_bssid = Some(bssid.clone());
                if let Err(err) = self.session.connect_to_network(&iface, &config, None) {
                    warn!(target: T_SUPPLICANT, iface = %iface, net_id = config.network_id, error = %err, "connect_request_failed");
                    self.clients.clear_connecting(&iface);
                    self.engine.handle_connection_attempt_ended(
                        &iface,
                        AttemptOutcome::Failure(FailureReason::Other),
                        &bssid,
                        &config,
                    );
                }
            }
            DaemonEvent::Roam {
                iface,
                network_id,
                bssid,
            } => self.roam(&iface, network_id, bssid),
            DaemonEvent::Disconnect { iface } => {
                if let Err(err) = self.session.disconnect(&iface) {
                    warn!(target: T_SUPPLICANT, iface = %iface, error = %err, "disconnect_request_failed");
                }
            }
            DaemonEvent::DialogAnswer { id, accepted } => {
                self.engine.on_switch_dialog_result(id, accepted)
            }
            DaemonEvent::Shutdown => return false,
        }
        true
    }

    fn roam(&mut self, iface: &str, network_id: i32, bssid: String) {
        let current = self
            .clients
            .get(iface)
            .and_then(|c| c.connected)
            .filter(|c| c.network_id == network_id)
            .or_else(|| self.store.configured_network(network_id));
        let Some(mut config) = current else {
            warn!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, "roam_unknown_network");
            return;
        };
        config.selection_bssid = Some(bssid);
        if let Err(err) = self.session.roam_to_network(iface, &config) {
            warn!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, error = %err, "roam_request_failed");
        }
    }

    /// Feeds channel history and refreshes link sufficiency from the
    /// connected BSS's latest RSSI.
    fn observe_scan(&self, results: &[ScanResult]) {
        self.store.record_scan(results);
        for client in self.clients.snapshot() {
            let Some(bssid) = client.connected_bssid.as_deref() else {
                continue;
            };
            if let Some(seen) = results.iter().find(|r| r.bssid.eq_ignore_ascii_case(bssid)) {
                let sufficient = seen.rssi_dbm >= SUFFICIENT_RSSI_DBM;
                self.clients.update(&client.iface, |c| {
                    c.sufficient = sufficient;
                    c.frequency_mhz = Some(seen.frequency_mhz);
                });
            }
        }
    }

    fn on_supplicant_event(&mut self, event: SupplicantEvent) {
        match event {
            SupplicantEvent::StateChanged {
                iface,
                state,
                network_id,
                bssid,
                ..
            } => self.on_state_changed(&iface, state, network_id, bssid),
            SupplicantEvent::Disconnection {
                iface,
                bssid,
                locally_generated,
                reason,
            } => {
                debug!(
                    target: T_SUPPLICANT,
                    iface = %iface,
                    bssid = bssid.as_deref().unwrap_or(""),
                    locally_generated,
                    reason,
                    "disconnection_reported"
                );
            }
            SupplicantEvent::AssociationRejection {
                iface,
                network_id,
                info,
            } => {
                let reason = if info.timed_out {
                    FailureReason::Timeout
                } else {
                    FailureReason::AssociationRejection
                };
                self.attempt_failed(&iface, network_id, reason, info.bssid.as_deref());
            }
            SupplicantEvent::AuthenticationFailure {
                iface,
                network_id,
                reason,
                bssid,
                ..
            } => {
                let reason = match reason {
                    AuthFailureReason::Timeout => FailureReason::Timeout,
                    AuthFailureReason::WrongPassword => FailureReason::AuthenticationFailure,
                    AuthFailureReason::EapFailure => FailureReason::EapFailure,
                };
                self.attempt_failed(&iface, network_id, reason, bssid.as_deref());
            }
            // The session has already applied the debounce window and walked
            // the fallback SSIDs before publishing.
            SupplicantEvent::NetworkNotFound {
                iface, network_id, ..
            } => self.attempt_failed(&iface, network_id, FailureReason::NetworkNotFound, None),
            SupplicantEvent::TargetBssid { iface, bssid } => {
                self.clients.update(&iface, |c| {
                    if c.connecting.is_some() {
                        c.connecting_bssid = Some(bssid);
                    }
                });
            }
            SupplicantEvent::AssociatedBssid { iface, bssid } => {
                self.clients.update(&iface, |c| {
                    if c.connected.is_some() {
                        c.connected_bssid = Some(bssid);
                    } else {
                        c.connecting_bssid = Some(bssid);
                    }
                });
            }
            SupplicantEvent::BssFrequencyChanged {
                iface,
                frequency_mhz,
            } => {
                self.clients
                    .update(&iface, |c| c.frequency_mhz = Some(frequency_mhz));
            }
            SupplicantEvent::PmkCacheAdded {
                iface, network_id, ..
            } => {
                trace!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, "pmk_cache_added");
            }
            SupplicantEvent::EapIdentityRequest { iface, network_id } => {
                info!(target: T_SUPPLICANT, iface = %iface, net_id = network_id, "eap_identity_requested");
            }
            SupplicantEvent::QosPolicyRequest {
                iface, request_id, ..
            } => {
                debug!(target: T_SUPPLICANT, iface = %iface, request_id, "qos_policy_request_ignored");
            }
        }
    }

    fn on_state_changed(&mut self, iface: &str, state: StaState, network_id: i32, bssid: Option<String>) {
        let Some(client) = self.clients.get(iface) else {
            return;
        };
        match state {
            StaState::Completed => {
                let was_connecting = client.connecting.is_some();
                let Some(config) = self
                    .clients
                    .set_connected(iface, network_id, bssid.as_deref())
                    .or_else(|| self.adopt_connected(iface, network_id, bssid.as_deref()))
                else {
                    warn!(target: T_CONNECTIVITY, iface = %iface, net_id = network_id, "completed_unknown_network");
                    return;
                };
                self.engine
                    .handle_connection_state_changed(iface, client.role, WifiState::Connected);
                if was_connecting {
                    self.engine.handle_connection_attempt_ended(
                        iface,
                        AttemptOutcome::Success,
                        bssid.as_deref().unwrap_or(SUPPLICANT_BSSID_ANY),
                        &config,
                    );
                }
            }
            StaState::Disconnected | StaState::InterfaceDisabled | StaState::Inactive => {
                if !client.is_connected() {
                    return;
                }
                self.clients.update(iface, |c| {
                    c.connected = None;
                    c.connected_bssid = None;
                    c.sufficient = false;
                });
                self.engine
                    .handle_connection_state_changed(iface, client.role, WifiState::Disconnected);
            }
            other => {
                trace!(target: T_SUPPLICANT, iface = %iface, state = ?other, "transitional_state");
            }
        }
    }

    /// A connection the engine did not ask for, such as the supplicant
    /// reassociating on its own after a restart.
    fn adopt_connected(&self, iface: &str, network_id: i32, bssid: Option<&str>) -> Option<WifiConfig> {
        let config = self.store.configured_network(network_id)?;
        self.clients.update(iface, |c| {
            c.connected = Some(config.clone());
            c.connected_bssid = bssid.map(str::to_string);
            c.connecting = None;
            c.connecting_bssid = None;
        });
        Some(config)
    }

    fn attempt_failed(&mut self, iface: &str, network_id: i32, reason: FailureReason, bssid: Option<&str>) {
        let config = self
            .clients
            .clear_connecting(iface)
            .filter(|c| c.network_id == network_id)
            .or_else(|| self.store.configured_network(network_id));
        let Some(config) = config else {
            debug!(target: T_CONNECTIVITY, iface = %iface, net_id = network_id, "failure_for_unknown_network");
            return;
        };
        info!(
            target: T_CONNECTIVITY,
            iface = %iface,
            net_id = network_id,
            reason = ?reason,
            "connection_attempt_failed"
        );
        self.engine.handle_connection_attempt_ended(
            iface,
            AttemptOutcome::Failure(reason),
            bssid.unwrap_or(SUPPLICANT_BSSID_ANY),
            &config,
        );
    }

    fn on_supplicant_lost(&mut self) {
        warn!(target: T_SUPPLICANT, iface = %self.config.iface, "supplicant_lost");
        let iface = self.config.iface.clone();
        self.clients.set_disconnected(&iface);
        self.engine
            .handle_connection_state_changed(&iface, CmmRole::Primary, WifiState::Disconnected);
        self.engine.set_wifi_enabled(false);
        self.schedule_reinit();
    }

    fn schedule_reinit(&self) {
        let tx = self.tx.clone();
        let delay = self.config.reinit_delay;
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            post(&tx, DaemonEvent::Reinitialize);
        });
    }

    fn shut_down(&mut self) {
        info!(target: T_SUPPLICANT, "event_loop_stopping");
        self.engine.set_wifi_enabled(false);
        self.timers.cancel_all();
        if self.session.has_iface(&self.config.iface) {
            if let Err(err) = self.session.teardown_iface(&self.config.iface) {
                debug!(target: T_SUPPLICANT, error = %err, "teardown_on_shutdown_failed");
            }
        }
    }
}
