use std::time::{Duration, Instant};

/// Trailing-edge debounce: the last scheduled value is released once no new
/// value has arrived for `delay`.
///
/// Time is passed in by the caller so the host's event loop stays the only
/// clock.
#[derive(Debug)]
pub struct Debouncer<T> {
    pending: Option<T>,
    deadline: Option<Instant>,
    delay: Duration,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: None,
            deadline: None,
            delay,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending value and restart the settle period.
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.deadline = Some(now + self.delay);
    }

    /// Release the pending value if it has settled.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }
}

/// Leading-edge throttle: the first call fires, then calls are dropped until
/// `interval` has passed since the last one that fired.
#[derive(Debug)]
pub struct Throttle {
    last_fired: Option<Instant>,
    interval: Duration,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_fired: None,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn try_fire(&mut self, now: Instant) -> bool {
        let ready = self
            .last_fired
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last_fired = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
