/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Exponential backoff between publish retries.
//!
//! An agent that fails to publish keeps retrying while its timeout budget
//! lasts. The delay between attempts starts at `initial_backoff_ms` and is
//! multiplied by `backoff_multiplier` after every failure, capped at
//! `max_backoff_ms`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Configuration for publish retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Growth factor applied after each failed attempt.
    ///
    /// With multiplier 2.0 and initial 10ms the delays are 10ms, 20ms, 40ms, ...
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 10,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Get the initial backoff duration.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Get the maximum backoff duration.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Tracks consecutive failures of one publish and the budget left for it.
#[derive(Debug)]
pub(crate) struct RetryBackoff {
    config: RetryConfig,
    attempts: u32,
    deadline: Option<Instant>,
}

impl RetryBackoff {
    /// Starts a retry sequence that may run for at most `budget`.
    ///
    /// A budget too large to represent as an `Instant` is unbounded.
    pub(crate) fn new(config: RetryConfig, budget: Duration) -> Self {
        Self {
            config,
            attempts: 0,
            deadline: Instant::now().checked_add(budget),
        }
    }

    /// Records a failed attempt and returns how long to wait before the next one,
    /// or `None` once waiting would exceed the budget.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.peek_delay();
        self.attempts = self.attempts.saturating_add(1);
        match self.deadline {
            Some(deadline) if Instant::now() + delay >= deadline => None,
            _ => Some(delay),
        }
    }

    /// Failed attempts recorded so far.
    pub(crate) const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn peek_delay(&self) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let backoff_ms = self.config.initial_backoff_ms as f64
            * self
                .config
                .backoff_multiplier
                .powi(i32::try_from(self.attempts).unwrap_or(i32::MAX));
        #[allow(
            clippy::cast_sign_loss,
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss
        )]
        let capped_backoff_ms = (backoff_ms.min(self.config.max_backoff_ms as f64).max(0.0)) as u64;

        Duration::from_millis(capped_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let mut backoff = RetryBackoff::new(config(), Duration::MAX);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn backoff_is_capped() {
        let mut backoff = RetryBackoff::new(config(), Duration::MAX);
        for _ in 0..10 {
            let _ = backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn exhausted_budget_stops_retrying() {
        let mut backoff = RetryBackoff::new(config(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut backoff = RetryBackoff::new(RetryConfig::default(), Duration::ZERO);
        assert_eq!(backoff.next_delay(), None);
    }
}
