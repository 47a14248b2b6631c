use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Absolute point in time after which a call is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline {
            at: Instant::now() + timeout,
        }
    }

    pub fn at(at: Instant) -> Self {
        Deadline { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// The earlier of `self` and a deadline `cap` from now.
    pub fn capped(self, cap: Duration) -> Self {
        self.min(Deadline::after(cap))
    }
}

/// Fires a callback once when a deadline passes.
///
/// Dropping the timer disarms it. The background task then exits without
/// running the callback.
#[derive(Debug)]
pub struct DeadlineTimer {
    _disarm: oneshot::Sender<()>,
}

impl DeadlineTimer {
    /// Spawns the timer task. Must be called within a tokio runtime.
    pub fn arm<F>(deadline: Deadline, on_expiry: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline.instant()) => on_expiry.await,
                _ = rx => {}
            }
        });
        DeadlineTimer { _disarm: tx }
    }
}
