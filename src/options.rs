use serde::{Deserialize, Serialize};

use crate::codes;

const ENV_RETRY_COUNT: &str = "RESILIENT_HTTP_RETRY_COUNT";
const ENV_RETRY_INTERVAL_SECS: &str = "RESILIENT_HTTP_RETRY_INTERVAL_SECS";
const ENV_RETRIABLE_STATUS_CODES: &str = "RESILIENT_HTTP_RETRIABLE_STATUS_CODES";
const ENV_RETRIABLE_ERROR_CODES: &str = "RESILIENT_HTTP_RETRIABLE_ERROR_CODES";

/// Configures how a dispatch call classifies and retries outcomes.
///
/// Every field has a default, so a config document (or struct update syntax)
/// only needs to name what it overrides.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    ///
    /// `0` and `1` both mean the request is sent exactly once.
    pub retry_count: usize,
    /// Base backoff interval in seconds. Also the growth multiplier, see
    /// [`next_backoff`](crate::next_backoff).
    pub retry_interval_secs: u64,
    /// HTTP statuses that warrant another attempt.
    pub retriable_status_codes: Vec<u16>,
    /// Transport error codes that warrant another attempt.
    pub retriable_error_codes: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: 5,
            retry_interval_secs: 2,
            retriable_status_codes: vec![408, 409, 500, 502, 503, 504],
            retriable_error_codes: codes::DEFAULT_RETRIABLE
                .iter()
                .map(|code| (*code).to_owned())
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn with_retry_count(mut self, retry_count: usize) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_interval_secs(mut self, secs: u64) -> Self {
        self.retry_interval_secs = secs;
        self
    }

    pub fn with_retriable_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retriable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_retriable_error_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retriable_error_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_retriable_status(&self, status: u16) -> bool {
        self.retriable_status_codes.contains(&status)
    }

    pub fn is_retriable_error(&self, code: &str) -> bool {
        self.retriable_error_codes.iter().any(|c| c == code)
    }

    /// Builds a config from environment variables, keeping defaults for
    /// anything unset.
    ///
    /// Reads:
    /// - `RESILIENT_HTTP_RETRY_COUNT`
    /// - `RESILIENT_HTTP_RETRY_INTERVAL_SECS`
    /// - `RESILIENT_HTTP_RETRIABLE_STATUS_CODES` (comma-separated)
    /// - `RESILIENT_HTTP_RETRIABLE_ERROR_CODES` (comma-separated)
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_RETRY_COUNT) {
            config.retry_count = parse_number(ENV_RETRY_COUNT, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_INTERVAL_SECS) {
            config.retry_interval_secs = parse_number(ENV_RETRY_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRIABLE_STATUS_CODES) {
            config.retriable_status_codes = split_list(&value)
                .map(|item| parse_number(ENV_RETRIABLE_STATUS_CODES, item))
                .collect::<std::result::Result<Vec<u16>, String>>()?;
        }
        if let Some(value) = lookup(ENV_RETRIABLE_ERROR_CODES) {
            config.retriable_error_codes = split_list(&value).map(str::to_owned).collect();
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> std::result::Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("{key} has an invalid value '{value}'"))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Configures the bundled reqwest transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportOptions {
    /// Per-attempt timeout in milliseconds. `None` leaves reqwest's default.
    pub timeout_ms: Option<u64>,
    /// Value sent as `User-Agent` unless the request sets its own.
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            user_agent: concat!("resilient-http/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}
