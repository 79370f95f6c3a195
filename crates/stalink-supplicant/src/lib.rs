//! # stalink-supplicant
//!
//! Client-side session with a station supplicant daemon.
//!
//! [`SupplicantSession`] keeps the daemon's network table consistent with
//! the framework's desired [`WifiConfig`], forwards credentials, and turns
//! raw [`DaemonCallback`]s into classified [`SupplicantEvent`]s. The remote
//! end is reached through a [`SessionChannel`]; [`wpa_ctrl::WpaCtrlChannel`]
//! implements it over the wpa_supplicant control sockets.
pub mod channel;
pub mod classify;
pub mod clock;
pub mod error;
pub mod events;
pub mod qos;
pub mod records;
pub mod session;
pub mod sim;
pub mod wpa_ctrl;

pub use channel::{ChannelError, DeathRecipient, InterfaceHandle, SessionChannel};
pub use clock::{Clock, MonotonicClock};
pub use error::{Result, SupplicantError};
pub use events::{AuthFailureReason, DaemonCallback, EventSink, StaState, SupplicantEvent};
pub use records::{SecurityType, Ssid, WifiConfig, INVALID_NETWORK_ID, SUPPLICANT_BSSID_ANY};
pub use session::{SessionConfig, SupplicantSession};
