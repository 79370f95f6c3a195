use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use stalink_connectivity::{TimerKind, TimerScheduler};
use stalink_logging::targets::T_CONNECTIVITY;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{post, DaemonEvent, EventTx};

/// Single-shot timers on the tokio runtime. Each kind owns at most one
/// pending sleep; rescheduling or cancelling drops it through its token.
pub struct TokioTimers {
    handle: Handle,
    tx: EventTx,
    pending: Mutex<HashMap<TimerKind, CancellationToken>>,
}

impl TokioTimers {
    pub fn new(handle: Handle, tx: EventTx) -> Self {
        Self {
            handle,
            tx,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|token| !token.is_cancelled())
            .unwrap_or(false)
    }

    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, token) in pending.drain() {
            token.cancel();
        }
    }
}

impl TimerScheduler for TokioTimers {
    fn schedule(&self, kind: TimerKind, delay_ms: u64) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, token.clone())
        {
            previous.cancel();
        }
        debug!(target: T_CONNECTIVITY, timer = ?kind, delay_ms, "timer_scheduled");

        let tx = self.tx.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                    token.cancel();
                    post(&tx, DaemonEvent::Timer(kind));
                }
            }
        });
    }

    fn cancel(&self, kind: TimerKind) {
        if let Some(token) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fired_timer_posts_its_kind() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TokioTimers::new(Handle::current(), tx);
        timers.schedule(TimerKind::PeriodicScan, 1_000);
        assert!(timers.is_pending(TimerKind::PeriodicScan));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        match rx.recv().await {
            Some(DaemonEvent::Timer(kind)) => assert_eq!(kind, TimerKind::PeriodicScan),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!timers.is_pending(TimerKind::PeriodicScan));
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TokioTimers::new(Handle::current(), tx);
        timers.schedule(TimerKind::RestartSingleScan, 1_000);
        timers.schedule(TimerKind::RestartSingleScan, 5_000);
        timers.schedule(TimerKind::DelayedPartialScan, 2_000);
        timers.cancel(TimerKind::DelayedPartialScan);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        match rx.try_recv() {
            Ok(DaemonEvent::Timer(kind)) => assert_eq!(kind, TimerKind::RestartSingleScan),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
