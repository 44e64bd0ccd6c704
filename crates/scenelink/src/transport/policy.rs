//! Reconnect policy.

use std::time::Duration;

use rand::Rng;

/// How the delay grows between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay every time
    Fixed,
    /// `base_delay * factor^attempt`, capped at `max_delay`
    Exponential { factor: f64, max_delay: Duration },
}

/// When and how often the transport retries after an abnormal close.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub backoff: Backoff,
    pub base_delay: Duration,
    /// Randomize each delay within `[delay / 2, delay]`
    pub jitter: bool,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl ReconnectPolicy {
    /// Fixed interval, unbounded attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed,
            base_delay: delay,
            jitter: false,
            max_attempts: None,
        }
    }

    /// Exponential backoff, unbounded attempts.
    pub fn exponential(base_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential { factor, max_delay },
            base_delay,
            jitter: false,
            max_attempts: None,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt is allowed after `attempts` tries.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }

    /// Delay before attempt number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match &self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { factor, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let secs = self.base_delay.as_secs_f64() * factor.max(1.0).powi(exponent);
                if secs.is_finite() && secs < max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    *max_delay
                }
            }
        };

        if self.jitter && !delay.is_zero() {
            let secs = delay.as_secs_f64();
            Duration::from_secs_f64(rand::thread_rng().gen_range(secs / 2.0..=secs))
        } else {
            delay
        }
    }
}
