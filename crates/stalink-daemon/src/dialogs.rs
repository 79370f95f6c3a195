use stalink_connectivity::dialog::DialogId;
use stalink_connectivity::DialogProvider;
use stalink_logging::targets::T_CONNECTIVITY;
use stalink_supplicant::WifiConfig;
use tracing::info;

use crate::events::{post, DaemonEvent, EventTx};

/// Headless stand-in for the switch prompt: logs it and answers with a
/// fixed policy through the event queue.
pub struct AutoAnswerDialogs {
    tx: EventTx,
    accept: bool,
}

impl AutoAnswerDialogs {
    pub fn new(tx: EventTx, accept: bool) -> Self {
        Self { tx, accept }
    }
}

impl DialogProvider for AutoAnswerDialogs {
    fn show_switch_dialog(&self, id: DialogId, current: &WifiConfig, candidate: &WifiConfig) {
        info!(
            target: T_CONNECTIVITY,
            dialog = id,
            from = %current.ssid,
            to = %candidate.ssid,
            accept = self.accept,
            "switch_dialog_auto_answer"
        );
        post(
            &self.tx,
            DaemonEvent::DialogAnswer {
                id,
                accepted: self.accept,
            },
        );
    }

    fn dismiss_dialog(&self, id: DialogId) {
        info!(target: T_CONNECTIVITY, dialog = id, "switch_dialog_dismissed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stalink_supplicant::SecurityType;
    use tokio::sync::mpsc;

    #[test]
    fn prompt_is_answered_with_policy() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dialogs = AutoAnswerDialogs::new(tx, true);
        dialogs.show_switch_dialog(
            4,
            &WifiConfig::new(1, "home", SecurityType::Psk),
            &WifiConfig::new(2, "work", SecurityType::Psk),
        );
        match rx.try_recv() {
            Ok(DaemonEvent::DialogAnswer { id, accepted }) => {
                assert_eq!(id, 4);
                assert!(accepted);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
