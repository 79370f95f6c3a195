//! # stalink-logging
//!
//! Shared tracing setup for the station-link daemon and its libraries.
//!
//! ## Features
//!
//! - **Subsystem files**: events tagged with [`targets::T_SUPPLICANT`],
//!   [`targets::T_CONNECTIVITY`] or [`targets::T_SCAN`] land in their own
//!   daily-rolling file, everything else goes to the component file
//! - **Runtime reload**: [`apply`] swaps the level filter without restarting
//! - **On-disk config**: `config/logging.json` under the daemon root, watched
//!   for changes by [`spawn_watcher`]
//! - **Retention**: [`run_retention`] prunes old and oversized logs
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! let root = Path::new("/var/lib/stalink");
//! let cfg = stalink_logging::fs::read_config(root);
//! let _guards = stalink_logging::init("stalinkd", root, &cfg)?;
//! tracing::info!(target: stalink_logging::targets::T_SUPPLICANT, "ready");
//! # Ok::<(), anyhow::Error>(())
//! ```
#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;
pub mod fs;
pub mod init;
pub mod retention;
pub mod targets;
pub mod watch;

pub use config::LoggingConfig;
pub use init::{apply, init, LoggingGuards};
pub use retention::run_retention;
pub use watch::{apply_env, spawn_watcher};
