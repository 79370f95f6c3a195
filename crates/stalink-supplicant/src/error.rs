use thiserror::Error;

use crate::channel::ChannelError;

/// Errors surfaced by [`crate::session::SupplicantSession`].
///
/// Operations never panic across the session boundary; a caller that only
/// cares about success can use `.is_ok()`.
#[derive(Error, Debug)]
pub enum SupplicantError {
    #[error("Supplicant session is not initialized")]
    NotInitialized,

    #[error("Interface '{name}' is already set up")]
    InterfaceExists { name: String },

    #[error("No interface handle for '{name}'")]
    InterfaceNotFound { name: String },

    #[error("Supplicant returned no handle for {op} on '{iface}'")]
    NullHandle { iface: String, op: &'static str },

    #[error("No current network on '{iface}'")]
    NoCurrentNetwork { iface: String },

    #[error("Network {requested} is not the current network {current} on '{iface}'")]
    NetworkMismatch {
        iface: String,
        requested: i32,
        current: i32,
    },

    #[error("Reconciliation step '{step}' failed on '{iface}': {source}")]
    Reconciliation {
        iface: String,
        step: &'static str,
        #[source]
        source: ChannelError,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("I/O failure during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SupplicantError>;

impl SupplicantError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        SupplicantError::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SupplicantError::InvalidArgument(msg.into())
    }

    /// True when the failure came from the transport rather than a refusal.
    pub fn is_transport(&self) -> bool {
        match self {
            SupplicantError::Channel(err) | SupplicantError::Reconciliation { source: err, .. } => {
                err.is_transport()
            }
            _ => false,
        }
    }
}
