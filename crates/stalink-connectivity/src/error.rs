use thiserror::Error;

/// Failures reported by the engine's collaborators.
///
/// The engine never propagates these to its caller: scan failures feed the
/// restart logic and connect failures are logged and left to the next scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("Scan request failed: {reason}")]
    Scan { reason: String },

    #[error("PNO request failed: {reason}")]
    Pno { reason: String },

    #[error("Station '{iface}' rejected {op}: {reason}")]
    Station {
        iface: String,
        op: &'static str,
        reason: String,
    },

    #[error("No client-mode interface in role {role}")]
    NoInterface { role: String },

    #[error("Config store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, ConnectivityError>;

impl ConnectivityError {
    pub fn scan(reason: impl Into<String>) -> Self {
        ConnectivityError::Scan {
            reason: reason.into(),
        }
    }

    pub fn station(iface: impl Into<String>, op: &'static str, reason: impl Into<String>) -> Self {
        ConnectivityError::Station {
            iface: iface.into(),
            op,
            reason: reason.into(),
        }
    }
}
