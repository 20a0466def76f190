//! Reusable wait tokens

use std::time::Duration;

use crate::core::time::HostClock;

/// Which clock a token measures against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitKind {
    /// Scaled game time; freezes while the host is paused
    Scaled,
    /// Unscaled time; keeps running while the host is paused
    Realtime,
}

/// "Pause for `duration`" measured on the host clock.
///
/// Tokens carry no per-wait state, so one instance can serve any number of
/// concurrent waits.
#[derive(Debug, PartialEq, Eq)]
pub struct WaitToken {
    duration: Duration,
    kind: WaitKind,
}

impl WaitToken {
    pub fn new(duration: Duration, kind: WaitKind) -> Self {
        Self { duration, kind }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn kind(&self) -> WaitKind {
        self.kind
    }

    /// Current reading of the clock this token measures against
    pub fn started_at(&self, clock: &dyn HostClock) -> Duration {
        match self.kind {
            WaitKind::Scaled => clock.time(),
            WaitKind::Realtime => clock.realtime(),
        }
    }

    /// Whether a wait that began at `started_at` has run its course
    pub fn is_elapsed(&self, started_at: Duration, clock: &dyn HostClock) -> bool {
        self.started_at(clock).saturating_sub(started_at) >= self.duration
    }

    /// Wait until the duration has passed, checking the clock every `poll`.
    pub async fn wait(&self, clock: &dyn HostClock, poll: Duration) {
        let started_at = self.started_at(clock);
        while !self.is_elapsed(started_at, clock) {
            tokio::time::sleep(poll).await;
        }
    }
}
