//! Burst coalescing for filesystem events.
//!
//! Every qualifying event re-arms the deadline to `duration` from now, so a
//! fire always reflects a quiet period of at least `duration` since the
//! *last* event of a burst, never the first.

use std::time::Duration;

use tokio::time::Instant;

/// Far enough out that a disarmed deadline never wakes the scheduler; the
/// select arm is additionally guarded by [`Debouncer::is_armed`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400);

pub struct Debouncer {
    duration: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
        }
    }

    /// Record a qualifying event: reset (not merely start) the timer.
    pub fn record(&mut self) {
        self.deadline = Some(Instant::now() + self.duration);
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Deadline for the scheduler's sleep arm.
    pub fn deadline(&self) -> Instant {
        self.deadline
            .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
    }

    /// Disarm after a fire; the next qualifying event re-arms.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}
