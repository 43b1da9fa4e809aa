/*
 *  Copyright 2025-2026 Rollcall Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Retry policies and backoff strategies.
//!
//! The policy is pure configuration plus one pure function:
//! `calculate_delay` maps an attempt number to a wait duration. The worker
//! applies it by writing `now + delay` into `next_attempt_at`; nothing
//! here touches storage.

use rand::Rng;
use std::time::Duration;

/// How the delay grows across attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay every attempt.
    Fixed,
    /// Delay grows linearly with the attempt number.
    Linear { multiplier: f64 },
    /// Delay grows as `base^(attempt-1)`.
    Exponential { base: f64, multiplier: f64 },
}

/// Retry configuration for a record kind.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of Processing attempts before the record is failed.
    pub max_attempts: i32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any computed delay, jitter included.
    pub max_delay: Duration,
    pub backoff_strategy: BackoffStrategy,
    /// Randomize each delay within +/-50% to spread thundering herds.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_strategy: BackoffStrategy::Exponential {
                base: 2.0,
                multiplier: 1.0,
            },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Computes the delay before the next attempt, given the attempt that
    /// just failed (1-based; claiming increments the counter, so a record
    /// failing its first run passes `attempt = 1`).
    ///
    /// The result is clamped to `max_delay` after jitter is applied.
    pub fn calculate_delay(&self, attempt: i32) -> Duration {
        let n = attempt.max(1);
        let base_ms = self.initial_delay.as_millis() as f64;

        let raw_ms = match self.backoff_strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear { multiplier } => base_ms * multiplier * n as f64,
            BackoffStrategy::Exponential { base, multiplier } => {
                base_ms * multiplier * base.powi(n - 1)
            }
        };

        let jittered_ms = if self.jitter {
            raw_ms * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            raw_ms
        };

        let capped_ms = jittered_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }
}
