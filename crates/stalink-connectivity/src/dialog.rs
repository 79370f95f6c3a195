//! Gate asking the user before switching away from a network they picked.

/// Handle of a dialog shown through [`crate::DialogProvider`].
pub type DialogId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// User rejected a switch to this candidate.
    Rejected,
    /// Dialogs are disabled for a while; the switch does not happen.
    TemporarilyDisabled,
    /// A dialog for this candidate is already on screen.
    AlreadyShowing,
    /// A new dialog has to be shown.
    Ask,
}

#[derive(Debug, Clone)]
struct OpenDialog<P> {
    id: DialogId,
    candidate_net_id: i32,
    pending: P,
}

/// Switch-dialog state. `P` is the connection to resume when the user
/// accepts.
#[derive(Debug, Clone)]
pub struct NetworkSwitchGate<P> {
    rejected_net_id: Option<i32>,
    reenable_at_ms: u64,
    open: Option<OpenDialog<P>>,
    next_id: DialogId,
}

impl<P> Default for NetworkSwitchGate<P> {
    fn default() -> Self {
        Self {
            rejected_net_id: None,
            reenable_at_ms: 0,
            open: None,
            next_id: 1,
        }
    }
}

/// Result of the user's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome<P> {
    Accepted { candidate_net_id: i32, pending: P },
    Rejected { candidate_net_id: i32, pending: P },
}

impl<P> NetworkSwitchGate<P> {
    pub fn evaluate(&self, candidate_net_id: i32, now_ms: u64) -> GateDecision {
        if self.rejected_net_id == Some(candidate_net_id) {
            return GateDecision::Rejected;
        }
        if now_ms < self.reenable_at_ms {
            return GateDecision::TemporarilyDisabled;
        }
        if self
            .open
            .as_ref()
            .map(|d| d.candidate_net_id == candidate_net_id)
            .unwrap_or(false)
        {
            return GateDecision::AlreadyShowing;
        }
        GateDecision::Ask
    }

    /// Records a new dialog. Any previous dialog and rejection are dropped;
    /// the returned id of the replaced dialog must be dismissed.
    pub fn open(&mut self, candidate_net_id: i32, pending: P) -> (DialogId, Option<DialogId>) {
        let replaced = self.open.take().map(|d| d.id);
        self.rejected_net_id = None;
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.open = Some(OpenDialog {
            id,
            candidate_net_id,
            pending,
        });
        (id, replaced)
    }

    /// Applies the user's answer. Answers for a dialog that is no longer
    /// open are ignored.
    pub fn answer(&mut self, id: DialogId, accepted: bool) -> Option<DialogOutcome<P>> {
        if self.open.as_ref().map(|d| d.id) != Some(id) {
            return None;
        }
        let dialog = self.open.take()?;
        if accepted {
            self.rejected_net_id = None;
            self.reenable_at_ms = 0;
            Some(DialogOutcome::Accepted {
                candidate_net_id: dialog.candidate_net_id,
                pending: dialog.pending,
            })
        } else {
            self.rejected_net_id = Some(dialog.candidate_net_id);
            Some(DialogOutcome::Rejected {
                candidate_net_id: dialog.candidate_net_id,
                pending: dialog.pending,
            })
        }
    }

    pub fn dismiss(&mut self) -> Option<DialogId> {
        self.open.take().map(|d| d.id)
    }

    /// Dismisses any dialog and suppresses switching until `now + duration`.
    pub fn disable_for(&mut self, now_ms: u64, duration_ms: u64) -> Option<DialogId> {
        self.reenable_at_ms = now_ms.saturating_add(duration_ms);
        self.dismiss()
    }

    /// Forgets rejections and the disable deadline, e.g. after a disconnect.
    pub fn reset(&mut self) -> Option<DialogId> {
        self.rejected_net_id = None;
        self.reenable_at_ms = 0;
        self.dismiss()
    }

    pub fn is_showing(&self) -> bool {
        self.open.is_some()
    }
}
