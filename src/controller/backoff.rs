//! # Fibonacci Backoff
//!
//! Progressive retry intervals for failing resources: 1m, 1m, 2m, 3m, 5m, ...
//! capped at a maximum.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    max_minutes: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            min_minutes,
            max_minutes: max_minutes.max(min_minutes),
            previous: 0,
            current: min_minutes,
        }
    }

    /// Next interval in seconds, advancing the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let minutes = self.current.min(self.max_minutes);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next;
        minutes * 60
    }

    pub fn reset(&mut self) {
        self.previous = 0;
        self.current = self.min_minutes;
    }

    /// Interval for the `error_count`-th consecutive error (0-indexed)
    pub fn calculate_for_error_count(error_count: u32, min_minutes: u64, max_minutes: u64) -> Duration {
        let mut backoff = Self::new(min_minutes, max_minutes);
        let mut seconds = backoff.next_backoff_seconds();
        for _ in 0..error_count {
            seconds = backoff.next_backoff_seconds();
            if seconds >= backoff.max_minutes * 60 {
                break;
            }
        }
        Duration::from_secs(seconds)
    }
}
