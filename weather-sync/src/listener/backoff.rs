//! Reconnect backoff for the change listener.
//!
//! Failures are counted inside a sliding window. The first failure retries
//! after `base`; every further failure in the window doubles the delay, up to
//! `max`. A connection that stays healthy for longer than the window starts
//! from `base` again.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(300);

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub failure_window: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_BACKOFF,
            max: DEFAULT_MAX_BACKOFF,
            failure_window: DEFAULT_FAILURE_WINDOW,
        }
    }
}

#[derive(Debug)]
pub struct ReconnectBackoff {
    config: BackoffConfig,
    failures: VecDeque<Instant>,
    total_restarts: u64,
}

impl ReconnectBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: VecDeque::new(),
            total_restarts: 0,
        }
    }

    /// Records a failure now and returns how long to wait before retrying.
    pub fn record_failure(&mut self) -> Duration {
        self.record_failure_at(Instant::now())
    }

    fn record_failure_at(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) < self.config.failure_window {
                break;
            }
            self.failures.pop_front();
        }
        self.failures.push_back(now);
        self.total_restarts += 1;
        self.delay_for(self.failures.len())
    }

    fn delay_for(&self, failures: usize) -> Duration {
        let exponent = failures.saturating_sub(1).min(MAX_EXPONENT as usize) as u32;
        self.config
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.config.max)
    }

    pub fn recent_failures(&self) -> usize {
        self.failures.len()
    }

    pub fn total_restarts(&self) -> u64 {
        self.total_restarts
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
