// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Exponential backoff for POSTs to the control plane:
/// `initial_delay * 2^(attempt - 1)`, uniform jitter over that value,
/// capped at `max_retries` additional attempts beyond the first.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub(crate) max_retries: u32,
    pub(crate) initial_delay: Duration,
    pub(crate) jitter: bool,
}

impl RetryConfig {
    /// Defaults: 10 retries, 200ms initial delay, jitter on — the
    /// the ~10 attempt budget the control-plane uplink is built to.
    pub fn new() -> Self {
        RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(200),
            jitter: true,
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        if self.jitter {
            let base_nanos = base.as_nanos() as u64;
            if base_nanos == 0 {
                return Duration::ZERO;
            }
            Duration::from_nanos(fastrand::u64(0..base_nanos))
        } else {
            base
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}
