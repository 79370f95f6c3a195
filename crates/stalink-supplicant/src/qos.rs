//! QoS policy (SCS) and mirrored stream classification (MSCS) parameters.

use crate::error::{Result, SupplicantError};

/// Highest 802.11 user priority.
pub const MAX_USER_PRIORITY: u8 = 7;
/// MSCS stream timeout bound from 802.11-2020 (60 s in microseconds).
pub const MAX_MSCS_STREAM_TIMEOUT_US: u32 = 60_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QosPolicyScsData {
    pub policy_id: u8,
    pub user_priority: u8,
    pub classifier: QosClassifier,
}

/// TCLAS type 4 style classifier; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QosClassifier {
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub protocol: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosPolicyStatusCode {
    Sent,
    Accepted,
    Rejected,
    Unknown,
    InvalidParameters,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosPolicyStatus {
    pub policy_id: u8,
    pub code: QosPolicyStatusCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MscsParams {
    pub user_priority_bitmap: u8,
    pub user_priority_limit: u8,
    pub stream_timeout_us: u32,
    pub frame_classifier_mask: u8,
}

impl MscsParams {
    pub fn validate(&self) -> Result<()> {
        if self.user_priority_limit > MAX_USER_PRIORITY {
            return Err(SupplicantError::invalid(format!(
                "MSCS user priority limit {} exceeds {}",
                self.user_priority_limit, MAX_USER_PRIORITY
            )));
        }
        if self.stream_timeout_us == 0 || self.stream_timeout_us > MAX_MSCS_STREAM_TIMEOUT_US {
            return Err(SupplicantError::invalid(format!(
                "MSCS stream timeout {}us out of range",
                self.stream_timeout_us
            )));
        }
        Ok(())
    }
}

pub fn validate_scs_policies(policies: &[QosPolicyScsData]) -> Result<()> {
    if policies.is_empty() {
        return Err(SupplicantError::invalid("empty SCS policy list"));
    }
    for policy in policies {
        if policy.user_priority > MAX_USER_PRIORITY {
            return Err(SupplicantError::invalid(format!(
                "SCS policy {} has user priority {}",
                policy.policy_id, policy.user_priority
            )));
        }
    }
    let mut ids: Vec<u8> = policies.iter().map(|p| p.policy_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != policies.len() {
        return Err(SupplicantError::invalid("duplicate SCS policy id"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(id: u8, up: u8) -> QosPolicyScsData {
        QosPolicyScsData {
            policy_id: id,
            user_priority: up,
            classifier: QosClassifier::default(),
        }
    }

    #[test]
    fn scs_validation_rejects_duplicates_and_bad_priority() {
        assert!(validate_scs_policies(&[policy(1, 5), policy(2, 7)]).is_ok());
        assert!(validate_scs_policies(&[]).is_err());
        assert!(validate_scs_policies(&[policy(1, 5), policy(1, 6)]).is_err());
        assert!(validate_scs_policies(&[policy(3, 8)]).is_err());
    }

    #[test]
    fn mscs_validation_bounds() {
        let ok = MscsParams {
            user_priority_bitmap: 0xf0,
            user_priority_limit: 7,
            stream_timeout_us: 60_000,
            frame_classifier_mask: 0x5f,
        };
        assert!(ok.validate().is_ok());
        assert!(MscsParams { user_priority_limit: 8, ..ok }.validate().is_err());
        assert!(MscsParams { stream_timeout_us: 0, ..ok }.validate().is_err());
    }
}
