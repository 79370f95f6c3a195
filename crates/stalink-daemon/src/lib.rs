//! # stalink-daemon
//!
//! Runs one station interface against wpa_supplicant: a
//! [`stalink_supplicant::SupplicantSession`] over the control socket and a
//! [`stalink_connectivity::ConnectivityEngine`] deciding when to scan and
//! where to connect, both driven from a single event queue.
pub mod config;
pub mod dialogs;
pub mod event_loop;
pub mod events;
pub mod monitor;
pub mod scanner;
pub mod selector;
pub mod station;
pub mod store;
pub mod timers;

pub use config::DaemonConfig;
pub use event_loop::Daemon;
pub use events::DaemonEvent;
