//! Retry policy and response classification for GitHub REST calls.
//!
//! GitHub signals two kinds of throttling. The primary limit reports
//! `x-ratelimit-remaining: 0` and a reset epoch in `x-ratelimit-reset`; it is
//! never retried here and surfaces as `RateLimitExceeded` immediately. The
//! secondary limit answers 429 (or 403 with `Retry-After`) while quota
//! remains; it is retried like any other transient failure.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Bounded exponential backoff: `base_delay * 2^(attempt - 1)`, capped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before retrying after the given 1-indexed failed attempt.
    /// A server-provided `Retry-After` wins over the computed value.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)));

        retry_after.unwrap_or(computed).min(self.max_delay)
    }
}

/// What to do with a received response.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseClass {
    /// Hand the response to the caller, whatever its status.
    Deliver,
    /// Primary quota is exhausted.
    RateLimited { reset_at: String },
    /// Retry after backing off.
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
}

pub fn classify_response(status: StatusCode, headers: &HeaderMap) -> ResponseClass {
    if status.is_server_error() {
        return ResponseClass::Transient {
            reason: format!("server error {status}"),
            retry_after: retry_after(headers),
        };
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        if header_str(headers, RATE_LIMIT_REMAINING) == Some("0") {
            return ResponseClass::RateLimited {
                reset_at: reset_time(headers),
            };
        }

        let retry_after = retry_after(headers);
        if status == StatusCode::TOO_MANY_REQUESTS || retry_after.is_some() {
            return ResponseClass::Transient {
                reason: format!("secondary rate limit ({status})"),
                retry_after,
            };
        }
    }

    ResponseClass::Deliver
}

/// Transport failures while sending: timeouts, refused connects and
/// connections closed or reset before a response arrived.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER.as_str())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn reset_time(headers: &HeaderMap) -> String {
    header_str(headers, RATE_LIMIT_RESET)
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
        .map_or_else(
            || "an unknown time".to_string(),
            |reset| reset.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
}
