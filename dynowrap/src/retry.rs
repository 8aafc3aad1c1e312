/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Retry configuration for batch operations.
//!
//! Batch calls retry the items the store reports as unprocessed. Delays grow
//! exponentially and use full jitter: before retry `n` (starting at zero) the delay is
//! `base * initial_backoff * 2^n` capped at `max_backoff`, where `base` is drawn from
//! `[0, 1)`.

use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Retry configuration for batch chunks.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    base: fn() -> f64,
}

impl RetryConfig {
    /// The default configuration: 8 attempts, 50ms initial backoff, 5s maximum backoff.
    pub fn standard() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            base: fastrand::f64,
        }
    }

    /// Sends each chunk once; unprocessed items are reported immediately.
    pub fn disabled() -> Self {
        Self::standard().with_max_attempts(1)
    }

    /// Sets the total number of attempts per chunk, including the first. Values below one
    /// are treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the backoff scale for the first retry.
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Sets the upper bound for any single delay.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// For deterministic tests, use a static base instead of a random one.
    pub fn with_static_base(mut self, base: fn() -> f64) -> Self {
        self.base = base;
        self
    }

    /// Total attempts per chunk.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The backoff scale for the first retry.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Upper bound for any single delay.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Delay before retry number `retry` (zero based).
    pub fn backoff(&self, retry: u32) -> Duration {
        calculate_exponential_backoff(
            (self.base)(),
            self.initial_backoff.as_secs_f64(),
            retry,
            self.max_backoff,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::standard()
    }
}

pub(crate) fn calculate_exponential_backoff(
    base: f64,
    initial_backoff: f64,
    retry_attempts: u32,
    max_backoff: Duration,
) -> Duration {
    let result = match 2_u32
        .checked_pow(retry_attempts)
        .map(|power| (power as f64) * initial_backoff)
    {
        Some(backoff) => match Duration::try_from_secs_f64(backoff) {
            Ok(result) => result.min(max_backoff),
            Err(_) => max_backoff,
        },
        None => max_backoff,
    };
    result.mul_f64(base.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn backoff_doubles_until_the_cap() {
        let config = RetryConfig::standard()
            .with_initial_backoff(Duration::from_secs(1))
            .with_max_backoff(Duration::from_secs(3))
            .with_static_base(|| 1.0);
        assert_eq!(config.backoff(0), Duration::from_secs(1));
        assert_eq!(config.backoff(1), Duration::from_secs(2));
        assert_eq!(config.backoff(2), Duration::from_secs(3));
        assert_eq!(config.backoff(40), Duration::from_secs(3));
    }

    #[test]
    fn jitter_scales_the_delay() {
        let config = RetryConfig::standard()
            .with_initial_backoff(Duration::from_secs(1))
            .with_static_base(|| 0.5);
        assert_eq!(config.backoff(2), Duration::from_secs(2));
    }

    proptest! {
        #[test]
        fn delays_never_exceed_the_cap(base in 0.0..1.0f64, initial_ms in 1u64..10_000, retry in 0u32..64) {
            let delay = calculate_exponential_backoff(
                base,
                Duration::from_millis(initial_ms).as_secs_f64(),
                retry,
                Duration::from_secs(5),
            );
            prop_assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn disabled_means_one_attempt() {
        assert_eq!(RetryConfig::disabled().max_attempts(), 1);
        assert_eq!(RetryConfig::standard().with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryConfig::default().max_attempts(), 8);
    }
}
