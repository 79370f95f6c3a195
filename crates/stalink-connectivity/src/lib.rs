//! # stalink-connectivity
//!
//! Decides when to scan and which network each station interface should
//! (re)connect to.
//!
//! [`ConnectivityEngine`] consumes screen, mobility and connection-state
//! notifications, drives single and PNO scans through a [`ScanProvider`],
//! asks a [`NetworkSelector`] for candidates and issues connect or roam
//! requests through [`StationControl`]. Failed attempts are retried on the
//! cached candidate list with the failed BSSID blocked; attempts are rate
//! limited while the screen is off.
//!
//! All entry points take `&mut self` and are expected to be called from one
//! serialized event loop. Timers are requested through [`TimerScheduler`]
//! and delivered back with [`ConnectivityEngine::on_timer`].
pub mod blocklist;
pub mod candidates;
pub mod channels;
pub mod collaborators;
pub mod config;
pub mod dialog;
pub mod engine;
pub mod error;
pub mod mobility;
pub mod multi_internet;
pub mod pno;
pub mod rate_limit;
pub mod schedule;
pub mod types;

pub use collaborators::{
    ConfigStore, DialogProvider, NetworkSelector, ScanProvider, SelectionContext, StationControl,
    TimerKind, TimerScheduler,
};
pub use config::EngineConfig;
pub use engine::ConnectivityEngine;
pub use error::{ConnectivityError, Result};
pub use types::{
    AttemptOutcome, Band, Candidate, CandidateKey, ClientModeInfo, CmmRole, FailureReason,
    MobilityState, ScanData, ScanRequest, ScanResult, ScanType, WifiState,
};
