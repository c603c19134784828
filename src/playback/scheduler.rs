//! Cancellable scheduled work for a playback session.
//!
//! Every scheduled firing is a spawned sleep that posts a `TimerFired` back
//! onto the session channel. Cancellation never interrupts the sleep: it only
//! invalidates the token, and a firing with a stale token is ignored.

use crate::playback::service::SessionMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Progress sampling period while playing
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Pause in polling after a seek
pub const SEEK_SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Delay between end-of-media and the completed presentation event
pub const COMPLETION_GRACE: Duration = Duration::from_millis(1000);
/// Delay between an engine error and the close request
pub const ERROR_GRACE: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    ProgressTick,
    CompletionGrace,
    ErrorGrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Poll,
    Grace,
}

impl TimerKind {
    fn slot(&self) -> Slot {
        match self {
            TimerKind::ProgressTick => Slot::Poll,
            TimerKind::CompletionGrace | TimerKind::ErrorGrace => Slot::Grace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub token: TimerToken,
}

pub struct ProgressScheduler {
    tx: mpsc::UnboundedSender<SessionMessage>,
    next_generation: u64,
    /// At most one outstanding progress tick
    poll: Option<TimerToken>,
    /// At most one outstanding completion/error one-shot
    grace: Option<(TimerKind, TimerToken)>,
}

impl ProgressScheduler {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionMessage>) -> Self {
        Self {
            tx,
            next_generation: 1,
            poll: None,
            grace: None,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn pending_grace(&self) -> Option<TimerKind> {
        self.grace.map(|(kind, _)| kind)
    }

    /// (Re)start polling with the regular period. Any pending tick is invalidated.
    pub fn start_polling(&mut self) {
        self.start_polling_after(POLL_INTERVAL);
    }

    /// (Re)start polling with a custom first delay, e.g. the seek settle delay
    pub fn start_polling_after(&mut self, delay: Duration) {
        let token = self.spawn(TimerKind::ProgressTick, delay);
        self.poll = Some(token);
    }

    pub fn stop_polling(&mut self) {
        if self.poll.take().is_some() {
            debug!("Progress polling stopped");
        }
    }

    pub fn schedule_completion(&mut self) {
        let token = self.spawn(TimerKind::CompletionGrace, COMPLETION_GRACE);
        self.grace = Some((TimerKind::CompletionGrace, token));
    }

    pub fn schedule_error_close(&mut self) {
        let token = self.spawn(TimerKind::ErrorGrace, ERROR_GRACE);
        self.grace = Some((TimerKind::ErrorGrace, token));
    }

    pub fn cancel_grace(&mut self) {
        self.grace = None;
    }

    /// Invalidate everything outstanding
    pub fn cancel_all(&mut self) {
        self.poll = None;
        self.grace = None;
    }

    /// Consume a firing. Returns its kind if the token is still current.
    pub fn accept(&mut self, fired: &TimerFired) -> Option<TimerKind> {
        let current = match fired.kind.slot() {
            Slot::Poll => self.poll.filter(|token| *token == fired.token).map(|_| {
                self.poll = None;
                fired.kind
            }),
            Slot::Grace => self
                .grace
                .filter(|(kind, token)| *kind == fired.kind && *token == fired.token)
                .map(|_| {
                    self.grace = None;
                    fired.kind
                }),
        };

        if current.is_none() {
            debug!("Discarding stale {:?} firing", fired.kind);
        }
        current
    }

    fn spawn(&mut self, kind: TimerKind, delay: Duration) -> TimerToken {
        let token = TimerToken {
            generation: self.next_generation,
        };
        self.next_generation += 1;

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SessionMessage::Timer(TimerFired { kind, token }));
        });

        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_fired(rx: &mut mpsc::UnboundedReceiver<SessionMessage>) -> TimerFired {
        match rx.recv().await {
            Some(SessionMessage::Timer(fired)) => fired,
            _ => panic!("expected a timer firing"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_after_poll_interval() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = ProgressScheduler::new(tx);
        let started = tokio::time::Instant::now();

        scheduler.start_polling();
        let fired = next_fired(&mut rx).await;

        assert!(started.elapsed() >= POLL_INTERVAL);
        assert_eq!(scheduler.accept(&fired), Some(TimerKind::ProgressTick));
        assert!(!scheduler.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_invalidates_previous_tick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = ProgressScheduler::new(tx);

        scheduler.start_polling();
        scheduler.start_polling_after(Duration::from_millis(800));

        let first = next_fired(&mut rx).await;
        assert_eq!(scheduler.accept(&first), None);

        let second = next_fired(&mut rx).await;
        assert_eq!(scheduler.accept(&second), Some(TimerKind::ProgressTick));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_turns_firings_into_no_ops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = ProgressScheduler::new(tx);

        scheduler.start_polling();
        scheduler.schedule_error_close();
        scheduler.cancel_all();

        let a = next_fired(&mut rx).await;
        let b = next_fired(&mut rx).await;
        assert_eq!(scheduler.accept(&a), None);
        assert_eq!(scheduler.accept(&b), None);
    }

    #[tokio::test(start_paused = true)]
    async fn error_close_replaces_pending_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = ProgressScheduler::new(tx);

        scheduler.schedule_completion();
        scheduler.schedule_error_close();
        assert_eq!(scheduler.pending_grace(), Some(TimerKind::ErrorGrace));

        let completion = next_fired(&mut rx).await;
        assert_eq!(completion.kind, TimerKind::CompletionGrace);
        assert_eq!(scheduler.accept(&completion), None);

        let close = next_fired(&mut rx).await;
        assert_eq!(scheduler.accept(&close), Some(TimerKind::ErrorGrace));
    }
}
