//! Debounced failure logging.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Kinds of registry failures that are throttled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The request never got a response (connect, timeout, I/O).
    Transport,
    /// The registry answered outside the 200..=206 range.
    Status,
}

/// Lets one warning per failure class through per interval.
#[derive(Debug)]
pub struct LogLimiter {
    interval: Duration,
    last_emitted: HashMap<FailureClass, Instant>,
    emitted: u64,
    suppressed: u64,
}

impl LogLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emitted: HashMap::new(),
            emitted: 0,
            suppressed: 0,
        }
    }

    /// Whether a warning of `class` may be logged now. Records the emission.
    pub fn allow(&mut self, class: FailureClass) -> bool {
        self.allow_at(class, Instant::now())
    }

    fn allow_at(&mut self, class: FailureClass, now: Instant) -> bool {
        let should_log = match self.last_emitted.get(&class) {
            Some(last) => now.saturating_duration_since(*last) >= self.interval,
            None => true,
        };

        if should_log {
            self.last_emitted.insert(class, now);
            self.emitted += 1;
        } else {
            self.suppressed += 1;
        }
        should_log
    }

    /// Warnings let through so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Warnings swallowed so far.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
