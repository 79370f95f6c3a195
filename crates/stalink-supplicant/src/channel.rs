//! Contract for the RPC connection to the remote supplicant daemon.
//!
//! Calls are typed per operation instead of a generic `call(op, args)`. An
//! implementation maps its transport failures to [`ChannelError::Transport`]
//! and explicit refusals or failed status codes to [`ChannelError::Rejected`].

use std::sync::Arc;

use thiserror::Error;

use crate::qos::{MscsParams, QosPolicyScsData, QosPolicyStatus};
use crate::records::{Ssid, WifiConfig};

/// Status code used by implementations for operations they do not support.
pub const STATUS_UNSUPPORTED: i32 = -2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The remote is unreachable or the connection broke. Invalidates the
    /// whole session.
    #[error("Transport failure during {op}: {reason}")]
    Transport { op: &'static str, reason: String },

    /// The remote answered but refused the request.
    #[error("{op} rejected by supplicant (status {code})")]
    Rejected { op: &'static str, code: i32 },
}

impl ChannelError {
    pub fn transport(op: &'static str, reason: impl Into<String>) -> Self {
        ChannelError::Transport {
            op,
            reason: reason.into(),
        }
    }

    pub fn rejected(op: &'static str, code: i32) -> Self {
        ChannelError::Rejected { op, code }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ChannelError::Transport { .. })
    }
}

pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// A station interface the remote daemon created for us.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceHandle {
    pub name: String,
    /// Opaque reference to the remote interface object.
    pub remote_ref: u64,
}

/// Receives liveness loss. Implementations forward it onto the owner's
/// serialized event queue; it must not touch session state directly.
pub trait DeathRecipient: Send + Sync {
    fn channel_died(&self, generation: u64);
}

/// SIM authentication answers relayed to the supplicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimAuthResponse {
    Gsm { kc_sres: Vec<(Vec<u8>, Vec<u8>)> },
    UmtsAuth { ik: Vec<u8>, ck: Vec<u8>, res: Vec<u8> },
    UmtsAuts { auts: Vec<u8> },
    UmtsFailure,
}

pub trait SessionChannel: Send + Sync {
    /// Connect and return the remote interface version.
    fn negotiate_version(&self) -> ChannelResult<u32>;

    /// Register for liveness loss; `generation` is echoed back on death.
    fn link_to_death(&self, generation: u64, recipient: Arc<dyn DeathRecipient>)
        -> ChannelResult<()>;

    /// `Ok(None)` means the daemon answered without a usable handle.
    fn add_sta_interface(&self, name: &str) -> ChannelResult<Option<InterfaceHandle>>;
    fn remove_interface(&self, name: &str) -> ChannelResult<()>;
    fn register_callback(&self, iface: &InterfaceHandle) -> ChannelResult<()>;

    fn list_networks(&self, iface: &str) -> ChannelResult<Vec<i32>>;
    /// `Ok(None)` means the daemon answered without a network id.
    fn add_network(&self, iface: &str) -> ChannelResult<Option<i32>>;
    fn remove_network(&self, iface: &str, network_id: i32) -> ChannelResult<()>;
    /// Push the full configuration, using `ssid` as the advertised name.
    fn save_network(
        &self,
        iface: &str,
        network_id: i32,
        config: &WifiConfig,
        ssid: &Ssid,
    ) -> ChannelResult<()>;
    fn select_network(&self, iface: &str, network_id: i32) -> ChannelResult<()>;
    fn enable_network(&self, iface: &str, network_id: i32, no_connect: bool)
        -> ChannelResult<()>;
    fn disable_network(&self, iface: &str, network_id: i32) -> ChannelResult<()>;
    fn set_bssid(&self, iface: &str, network_id: i32, bssid: &str) -> ChannelResult<()>;
    fn set_pmk_cache(&self, iface: &str, network_id: i32, blob: &[u8]) -> ChannelResult<()>;
    fn set_anonymous_identity(
        &self,
        iface: &str,
        network_id: i32,
        identity: &str,
    ) -> ChannelResult<()>;

    fn reassociate(&self, iface: &str) -> ChannelResult<()>;
    fn reconnect(&self, iface: &str) -> ChannelResult<()>;
    fn disconnect(&self, iface: &str) -> ChannelResult<()>;
    fn cancel_wps(&self, iface: &str) -> ChannelResult<()>;

    fn send_eap_identity_response(
        &self,
        iface: &str,
        network_id: i32,
        identity: &str,
        encrypted_identity: Option<&[u8]>,
    ) -> ChannelResult<()>;
    fn send_sim_auth_response(
        &self,
        iface: &str,
        network_id: i32,
        response: &SimAuthResponse,
    ) -> ChannelResult<()>;

    fn add_qos_policies(
        &self,
        iface: &str,
        policies: &[QosPolicyScsData],
    ) -> ChannelResult<Vec<QosPolicyStatus>>;
    fn remove_qos_policies(&self, iface: &str, policy_ids: &[u8])
        -> ChannelResult<Vec<QosPolicyStatus>>;
    fn remove_all_qos_policies(&self, iface: &str) -> ChannelResult<()>;
    fn send_qos_policy_response(
        &self,
        iface: &str,
        request_id: i32,
        more_policies: bool,
        statuses: &[QosPolicyStatus],
    ) -> ChannelResult<()>;
    fn configure_mscs(&self, iface: &str, params: &MscsParams) -> ChannelResult<()>;
    fn disable_mscs(&self, iface: &str) -> ChannelResult<()>;
}
