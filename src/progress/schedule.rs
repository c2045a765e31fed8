use std::time::Duration;

/// Poll interval state machine: `next = min(current * 1.5, max)`.
///
/// Arithmetic is done on whole nanoseconds (`* 3 / 2`) so the schedule is exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    /// `initial` is clamped to `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// Delay the next call to [`Backoff::next_delay`] will return.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns the wait before the next tick and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = grow(self.current).min(self.max);
        delay
    }
}

fn grow(delay: Duration) -> Duration {
    delay.checked_mul(3).map_or(Duration::MAX, |d| d / 2)
}
