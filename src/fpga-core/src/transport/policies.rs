// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Reconnect and register polling policies.

use std::time::Duration;

use super::machine::ConnectionState;
use super::TransportError;

/// Policy for reopening a transport after it dropped.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, attempt: u32, error: &TransportError) -> bool;

    /// Delay before attempt number `attempt` (0-based).
    fn delay(&self, attempt: u32) -> Duration;

    fn max_attempts(&self) -> u32;
}

/// Delays double with every attempt, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, attempt: u32, error: &TransportError) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Policy for the background register poller.
pub trait PollingPolicy: Send + Sync {
    fn interval(&self) -> Duration;

    fn should_poll(&self, state: &ConnectionState) -> bool;
}

/// Poll at a constant rate while the link is up.
#[derive(Debug, Clone)]
pub struct FixedPolling {
    interval: Duration,
}

impl FixedPolling {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl PollingPolicy for FixedPolling {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn should_poll(&self, state: &ConnectionState) -> bool {
        state.is_connected()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPolling;

impl PollingPolicy for NoPolling {
    fn interval(&self) -> Duration {
        Duration::from_secs(3600)
    }

    fn should_poll(&self, _state: &ConnectionState) -> bool {
        false
    }
}
