use crate::domain::model::LockedExternalTask;
use std::time::Duration;

pub trait BackoffStrategy: Send + Sync + std::fmt::Debug {
    /// Called after every fetch with the tasks it returned.
    fn reconfigure(&mut self, tasks: &[LockedExternalTask]);

    /// Time to wait before the next fetch.
    fn calculate_backoff_time(&self) -> Duration;
}

/// Waits `init_time * factor^(level - 1)` (capped at `max_time`) after
/// consecutive empty fetches; a non-empty fetch resets the level.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoffStrategy {
    init_time: u64,
    factor: f64,
    max_time: u64,
    level: u32,
}

impl ExponentialBackoffStrategy {
    pub const DEFAULT_INIT_TIME: u64 = 500;
    pub const DEFAULT_FACTOR: f64 = 2.0;
    pub const DEFAULT_MAX_TIME: u64 = 60_000;

    pub fn new(init_time: u64, factor: f64, max_time: u64) -> Self {
        Self {
            init_time,
            factor,
            max_time,
            level: 0,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl Default for ExponentialBackoffStrategy {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_INIT_TIME,
            Self::DEFAULT_FACTOR,
            Self::DEFAULT_MAX_TIME,
        )
    }
}

impl BackoffStrategy for ExponentialBackoffStrategy {
    fn reconfigure(&mut self, tasks: &[LockedExternalTask]) {
        if tasks.is_empty() {
            self.level = self.level.saturating_add(1);
        } else {
            self.level = 0;
        }
    }

    fn calculate_backoff_time(&self) -> Duration {
        if self.level == 0 {
            return Duration::ZERO;
        }

        let exponent = (self.level - 1).min(i32::MAX as u32) as i32;
        let millis = self.init_time as f64 * self.factor.powi(exponent);
        let millis = if millis.is_finite() {
            millis.min(self.max_time as f64) as u64
        } else {
            self.max_time
        };
        Duration::from_millis(millis)
    }
}
