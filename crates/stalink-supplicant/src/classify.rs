//! Failure classification for daemon callbacks.
//!
//! Ambiguous cases fall to "not a password failure" so users are not told
//! their key is wrong when it may not be.

use crate::events::{AuthFailureReason, StaState};
use crate::records::SecurityType;

/// 802.11 reason: IE in 4-way handshake differs from (re)association frame.
pub const REASON_IE_IN_4WAY_DIFFERS: u16 = 17;
/// 802.11 reason: AP unable to handle all associated stations.
pub const REASON_DISASSOC_AP_BUSY: u16 = 5;

/// 802.11 status: unspecified failure.
pub const STATUS_UNSPECIFIED_FAILURE: u16 = 1;
/// 802.11 status: authentication rejected because of challenge failure.
pub const STATUS_CHALLENGE_FAIL: u16 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressWhen {
    Any,
    LocallyGenerated,
    RemotelyGenerated,
}

/// Disconnect reasons that never count as a handshake password failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectSuppression {
    entries: Vec<(u16, SuppressWhen)>,
}

impl Default for DisconnectSuppression {
    fn default() -> Self {
        Self {
            entries: vec![
                (REASON_IE_IN_4WAY_DIFFERS, SuppressWhen::LocallyGenerated),
                (REASON_DISASSOC_AP_BUSY, SuppressWhen::Any),
            ],
        }
    }
}

impl DisconnectSuppression {
    pub fn with_entry(mut self, reason: u16, when: SuppressWhen) -> Self {
        self.entries.retain(|(r, _)| *r != reason);
        self.entries.push((reason, when));
        self
    }

    pub fn suppresses(&self, reason: u16, locally_generated: bool) -> bool {
        self.entries.iter().any(|(r, when)| {
            *r == reason
                && match when {
                    SuppressWhen::Any => true,
                    SuppressWhen::LocallyGenerated => locally_generated,
                    SuppressWhen::RemotelyGenerated => !locally_generated,
                }
        })
    }
}

/// Association status codes that mean a wrong key for a security type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionPolicy {
    entries: Vec<(SecurityType, u16)>,
}

impl Default for RejectionPolicy {
    fn default() -> Self {
        Self {
            entries: vec![
                (SecurityType::Sae, STATUS_UNSPECIFIED_FAILURE),
                (SecurityType::Sae, STATUS_CHALLENGE_FAIL),
                (SecurityType::Wep, STATUS_CHALLENGE_FAIL),
            ],
        }
    }
}

impl RejectionPolicy {
    pub fn is_wrong_password(
        &self,
        security: Option<SecurityType>,
        status_code: u16,
        timed_out: bool,
    ) -> bool {
        if timed_out {
            return false;
        }
        let Some(security) = security else {
            return false;
        };
        self.entries
            .iter()
            .any(|(s, code)| *s == security && *code == status_code)
    }
}

/// Per-interface view of the last reported states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackTracker {
    current: StaState,
    before_disconnect: StaState,
}

impl Default for CallbackTracker {
    fn default() -> Self {
        Self {
            current: StaState::Disconnected,
            before_disconnect: StaState::Disconnected,
        }
    }
}

impl CallbackTracker {
    pub fn current(&self) -> StaState {
        self.current
    }

    pub fn before_disconnect(&self) -> StaState {
        self.before_disconnect
    }

    /// A DISCONNECTED blip does not clobber the pre-disconnect state.
    pub fn on_state_changed(&mut self, state: StaState) {
        self.current = state;
        if state != StaState::Disconnected {
            self.before_disconnect = state;
        }
    }

    /// The network went away mid-handshake; a later disconnect is not a
    /// password failure.
    pub fn on_network_removed(&mut self) {
        self.before_disconnect = StaState::Disconnected;
    }

    /// Consume the pre-disconnect state for one disconnect.
    pub fn take_before_disconnect(&mut self) -> StaState {
        std::mem::replace(&mut self.before_disconnect, StaState::Disconnected)
    }
}

pub fn classify_disconnect(
    before: StaState,
    security: Option<SecurityType>,
    reason: u16,
    locally_generated: bool,
    suppression: &DisconnectSuppression,
) -> Option<AuthFailureReason> {
    let security = security?;
    match before {
        StaState::FourwayHandshake
            if security.is_psk_like() && !suppression.suppresses(reason, locally_generated) =>
        {
            Some(AuthFailureReason::WrongPassword)
        }
        StaState::Associated | StaState::Associating if security.is_enterprise() => {
            Some(AuthFailureReason::EapFailure)
        }
        _ => None,
    }
}

pub fn classify_auth_timeout(
    current: StaState,
    security: Option<SecurityType>,
    ever_connected: bool,
) -> AuthFailureReason {
    let first_psk_attempt = security.map(SecurityType::is_psk_like).unwrap_or(false) && !ever_connected;
    if current == StaState::FourwayHandshake && first_psk_attempt {
        AuthFailureReason::WrongPassword
    } else {
        AuthFailureReason::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ie_differs_only_suppressed_when_local() {
        let table = DisconnectSuppression::default();
        assert!(table.suppresses(REASON_IE_IN_4WAY_DIFFERS, true));
        assert!(!table.suppresses(REASON_IE_IN_4WAY_DIFFERS, false));
        assert!(table.suppresses(REASON_DISASSOC_AP_BUSY, false));
        assert!(!table.suppresses(2, true));
    }

    #[test]
    fn suppression_table_is_extensible() {
        let table = DisconnectSuppression::default().with_entry(3, SuppressWhen::RemotelyGenerated);
        assert!(table.suppresses(3, false));
        assert!(!table.suppresses(3, true));
    }

    #[test]
    fn handshake_disconnect_on_psk_is_wrong_password() {
        let table = DisconnectSuppression::default();
        assert_eq!(
            classify_disconnect(StaState::FourwayHandshake, Some(SecurityType::Psk), 15, false, &table),
            Some(AuthFailureReason::WrongPassword)
        );
        assert_eq!(
            classify_disconnect(StaState::FourwayHandshake, Some(SecurityType::WapiPsk), 15, false, &table),
            Some(AuthFailureReason::WrongPassword)
        );
        assert_eq!(
            classify_disconnect(StaState::FourwayHandshake, Some(SecurityType::Psk), REASON_DISASSOC_AP_BUSY, false, &table),
            None
        );
        assert_eq!(
            classify_disconnect(StaState::FourwayHandshake, Some(SecurityType::Eap), 15, false, &table),
            None
        );
    }

    #[test]
    fn associated_disconnect_on_eap_is_eap_failure() {
        let table = DisconnectSuppression::default();
        for before in [StaState::Associated, StaState::Associating] {
            assert_eq!(
                classify_disconnect(before, Some(SecurityType::Eap), 23, false, &table),
                Some(AuthFailureReason::EapFailure)
            );
        }
        assert_eq!(
            classify_disconnect(StaState::Disconnected, Some(SecurityType::Eap), 23, false, &table),
            None
        );
        assert_eq!(
            classify_disconnect(StaState::Completed, Some(SecurityType::Eap), 23, false, &table),
            None
        );
    }

    #[test]
    fn timed_out_rejection_is_never_wrong_password() {
        let policy = RejectionPolicy::default();
        assert!(policy.is_wrong_password(Some(SecurityType::Sae), STATUS_CHALLENGE_FAIL, false));
        assert!(policy.is_wrong_password(Some(SecurityType::Sae), STATUS_UNSPECIFIED_FAILURE, false));
        assert!(policy.is_wrong_password(Some(SecurityType::Wep), STATUS_CHALLENGE_FAIL, false));
        assert!(!policy.is_wrong_password(Some(SecurityType::Wep), STATUS_UNSPECIFIED_FAILURE, false));
        assert!(!policy.is_wrong_password(Some(SecurityType::Sae), STATUS_CHALLENGE_FAIL, true));
        assert!(!policy.is_wrong_password(Some(SecurityType::Psk), STATUS_CHALLENGE_FAIL, false));
    }

    #[test]
    fn tracker_keeps_state_across_disconnected_blips() {
        let mut tracker = CallbackTracker::default();
        tracker.on_state_changed(StaState::Associated);
        tracker.on_state_changed(StaState::Disconnected);
        assert_eq!(tracker.current(), StaState::Disconnected);
        assert_eq!(tracker.take_before_disconnect(), StaState::Associated);
        assert_eq!(tracker.before_disconnect(), StaState::Disconnected);
    }

    #[test]
    fn auth_timeout_classification() {
        assert_eq!(
            classify_auth_timeout(StaState::FourwayHandshake, Some(SecurityType::Psk), false),
            AuthFailureReason::WrongPassword
        );
        assert_eq!(
            classify_auth_timeout(StaState::FourwayHandshake, Some(SecurityType::Psk), true),
            AuthFailureReason::Timeout
        );
        assert_eq!(
            classify_auth_timeout(StaState::Completed, Some(SecurityType::Psk), false),
            AuthFailureReason::Timeout
        );
    }
}
