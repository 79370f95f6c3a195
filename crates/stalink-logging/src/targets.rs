//! Tracing targets that get their own log file.

/// Session lifecycle, reconciliation and daemon callbacks.
pub const T_SUPPLICANT: &str = "supplicant";
/// Candidate selection, retries, rate limiting and the switch gate.
pub const T_CONNECTIVITY: &str = "connectivity";
/// Single, partial and PNO scan scheduling.
pub const T_SCAN: &str = "scan";

pub const ALL: [&str; 3] = [T_SUPPLICANT, T_CONNECTIVITY, T_SCAN];

/// File name for a subsystem target.
pub fn file_name(target: &str) -> String {
    format!("{target}.log")
}
