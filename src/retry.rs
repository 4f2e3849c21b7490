//! Bounded retry with a fixed delay.
//!
//! Wraps source opens, transformer stages and destination calls alike.
//! Every failed attempt is logged as a warning through the [`Monitor`];
//! exhausting all attempts logs an error and returns the last failure.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::emit;
use crate::metrics::Monitor;
use crate::metrics::events::RetryScheduled;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// A policy making `attempts` tries (at least one) `delay` apart.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[derive(Clone)]
pub struct Retry {
    policy: RetryPolicy,
    monitor: Arc<Monitor>,
}

impl Retry {
    pub fn new(policy: RetryPolicy, monitor: Arc<Monitor>) -> Self {
        Self { policy, monitor }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op` until it succeeds or the policy's attempts are used up.
    ///
    /// `op` is called afresh for each attempt. No backoff and no jitter.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.policy.attempts;
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            self.monitor.log_warning(&format!(
                "{label}: attempt {attempt}/{attempts} failed: {err}"
            ));

            if attempt >= attempts {
                self.monitor.log_error(&format!(
                    "{label}: giving up after {attempts} attempts: {err}"
                ));
                return Err(err);
            }

            emit!(RetryScheduled { label, attempt });
            if !self.policy.delay.is_zero() {
                tokio::time::sleep(self.policy.delay).await;
            }
            attempt += 1;
        }
    }
}
