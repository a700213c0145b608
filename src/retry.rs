use backoff::ExponentialBackoff;
use std::time::Duration;

use crate::types::GatewayError;

/// Retry schedule for translation requests.
///
/// Rate-limit rejections get a longer schedule than ordinary transient
/// failures so the executor backs off instead of hammering the upstream.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub rate_limit_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 400,
            multiplier: 2.0,
            rate_limit_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Build the backoff schedule for one failed request.
    ///
    /// A rate-limited request carrying an upstream wait hint is scheduled
    /// from that hint instead of the configured delay. The attempt counter
    /// bounds the retry loop, so the schedule itself carries no
    /// elapsed-time cutoff.
    pub fn backoff_for(
        &self,
        class: ErrorClass,
        retry_after: Option<Duration>,
    ) -> ExponentialBackoff {
        let (base, cap_factor) = match (class, retry_after) {
            (ErrorClass::RateLimited, Some(hint)) => {
                (u64::try_from(hint.as_millis()).unwrap_or(u64::MAX), 8)
            }
            (ErrorClass::RateLimited, None) => (self.rate_limit_delay_ms, 8),
            (ErrorClass::Transient, _) => (self.base_delay_ms, 32),
        };
        ExponentialBackoff {
            current_interval: Duration::from_millis(base),
            initial_interval: Duration::from_millis(base),
            max_interval: Duration::from_millis(base.saturating_mul(cap_factor)),
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Coarse failure classification driving the retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    Transient,
}

impl ErrorClass {
    pub fn classify(err: &GatewayError) -> Self {
        match err {
            GatewayError::RateLimited { .. } => ErrorClass::RateLimited,
            GatewayError::Http(e) if is_too_many_requests(e) => ErrorClass::RateLimited,
            _ => ErrorClass::Transient,
        }
    }
}

fn is_too_many_requests(err: &reqwest::Error) -> bool {
    err.status()
        .map(|s| s == reqwest::StatusCode::TOO_MANY_REQUESTS)
        .unwrap_or(false)
}
