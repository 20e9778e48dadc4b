//! Retry decisions, kept free of I/O so they can be tested on their own.

use crate::{Response, RetryConfig, TransportError};

/// What one attempt produced.
#[derive(Clone, Copy, Debug)]
pub enum Outcome<'a> {
    Response(&'a Response),
    Error(&'a TransportError),
}

/// Kind of an outcome under a config, ignoring the remaining budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// A response whose status is not retriable, successful or not.
    Terminal,
    RetriableStatus,
    RetriableError,
    /// A transport error whose code is not retriable.
    Fatal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryDecision {
    pub retry: bool,
    /// Wait to use after the upcoming sleep, in seconds. Equals the current
    /// wait when `retry` is false.
    pub next_backoff_secs: u64,
}

pub fn classify(outcome: Outcome<'_>, config: &RetryConfig) -> Classification {
    match outcome {
        Outcome::Response(response) if config.is_retriable_status(response.status_code) => {
            Classification::RetriableStatus
        }
        Outcome::Response(_) => Classification::Terminal,
        Outcome::Error(err) if config.is_retriable_error(err.code()) => {
            Classification::RetriableError
        }
        Outcome::Error(_) => Classification::Fatal,
    }
}

/// Decides whether attempt `attempt_index` (zero-based) is followed by
/// another one.
///
/// A retry needs a retriable outcome and `attempt_index + 1 < retry_count`,
/// so a dispatch call makes at most `retry_count` attempts and never more
/// than one when `retry_count` is `0` or `1`.
pub fn should_retry(
    outcome: Outcome<'_>,
    attempt_index: usize,
    backoff_secs: u64,
    config: &RetryConfig,
) -> RetryDecision {
    let retriable = matches!(
        classify(outcome, config),
        Classification::RetriableStatus | Classification::RetriableError
    );
    let has_budget = attempt_index.saturating_add(1) < config.retry_count;

    if retriable && has_budget {
        RetryDecision {
            retry: true,
            next_backoff_secs: next_backoff(backoff_secs, config.retry_interval_secs),
        }
    } else {
        RetryDecision {
            retry: false,
            next_backoff_secs: backoff_secs,
        }
    }
}

/// Grows a wait as `current * base + base`.
///
/// Starting from `base`, this yields `b, b² + b, b³ + b² + b, ...`
/// (`2, 6, 14, 30` for `b = 2`), which is steeper than doubling. Saturates
/// instead of overflowing.
pub fn next_backoff(current_secs: u64, base_secs: u64) -> u64 {
    current_secs.saturating_mul(base_secs).saturating_add(base_secs)
}
