//! Interval gating for the periodic senders driven by `tick`.

/// Fires when at least `period_ms` has elapsed since it last fired. Fires on first poll.
#[derive(Debug, Clone)]
pub struct Interval {
    period_ms: u64,
    last_fired: Option<u64>,
}

impl Interval {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            last_fired: None,
        }
    }

    /// Returns true and records `now_ms` if the interval has elapsed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        let due = match self.last_fired {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.period_ms,
        };
        if due {
            self.last_fired = Some(now_ms);
        }
        due
    }

    /// Mark as fired without polling (e.g. after an out-of-band send).
    pub fn mark(&mut self, now_ms: u64) {
        self.last_fired = Some(now_ms);
    }

    /// Forget the last firing so the next poll fires immediately.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}
