//! Retry decisions with exponential backoff.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::debug;

use crate::core::{PlatformError, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, STATUS_UNAUTHORIZED};

/// Method of the operation being retried.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// `SUBSCRIBE`
    Subscribe,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// Anything else, upper-cased.
    Other(String),
}

impl RequestMethod {
    /// Check if repeating the operation is harmless.
    pub fn is_safe(&self) -> bool {
        matches!(
            self,
            RequestMethod::Get | RequestMethod::Head | RequestMethod::Options | RequestMethod::Subscribe
        )
    }

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Head => "HEAD",
            RequestMethod::Options => "OPTIONS",
            RequestMethod::Subscribe => "SUBSCRIBE",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Other(name) => name,
        }
    }
}

impl FromStr for RequestMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "GET" => RequestMethod::Get,
            "HEAD" => RequestMethod::Head,
            "OPTIONS" => RequestMethod::Options,
            "SUBSCRIBE" => RequestMethod::Subscribe,
            "POST" => RequestMethod::Post,
            "PUT" => RequestMethod::Put,
            "PATCH" => RequestMethod::Patch,
            "DELETE" => RequestMethod::Delete,
            _ => RequestMethod::Other(upper),
        })
    }
}

impl From<&str> for RequestMethod {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a retry check.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision<E = PlatformError> {
    /// Try again after this long.
    Retry(Duration),
    /// Give up; the original failure is handed back.
    DoNotRetry(E),
}

/// Retry policy parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Method of the operation being retried.
    pub method: RequestMethod,
    /// Retry unsafe methods as if they were safe.
    pub retry_unsafe_requests: bool,
    /// Maximum number of retries; `None` is unlimited.
    pub limit: Option<u32>,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on the wait.
    pub max_backoff: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new(RequestMethod::Subscribe)
    }
}

impl RetryOptions {
    /// Default policy for `method`.
    pub fn new(method: impl Into<RequestMethod>) -> Self {
        Self {
            method: method.into(),
            retry_unsafe_requests: false,
            limit: None,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Retry unsafe methods too.
    pub fn with_retry_unsafe_requests(mut self, enabled: bool) -> Self {
        self.retry_unsafe_requests = enabled;
        self
    }

    /// Cap the number of retries.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the maximum backoff.
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }
}

impl From<RequestMethod> for RetryOptions {
    fn from(method: RequestMethod) -> Self {
        Self::new(method)
    }
}

/// Exponential backoff retry policy for one operation.
///
/// Pure decision logic; scheduling the wait is left to the caller.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    options: RetryOptions,
    retry_count: u32,
    current_backoff: Duration,
}

impl ExponentialBackoff {
    /// Create a policy.
    pub fn new(options: RetryOptions) -> Self {
        let current_backoff = options.initial_backoff;
        Self {
            options,
            retry_count: 0,
            current_backoff,
        }
    }

    /// Policy parameters.
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Retries granted since the last reset.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Backoff used by the most recent decision.
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// Decide whether to retry after `error`.
    ///
    /// A `Retry` decision is granted: it counts against the limit.
    pub fn should_retry(&mut self, error: PlatformError) -> RetryDecision {
        let decision = self.decide(error);
        if let RetryDecision::Retry(wait) = &decision {
            self.retry_count += 1;
            debug!("retry #{} of {} in {:?}", self.retry_count, self.options.method, wait);
        }
        decision
    }

    /// Start over after the operation succeeded.
    pub fn reset(&mut self) {
        self.retry_count = 0;
        self.current_backoff = self.options.initial_backoff;
    }

    fn decide(&mut self, error: PlatformError) -> RetryDecision {
        if let Some(limit) = self.options.limit
            && self.retry_count >= limit
        {
            debug!("retry count is over the limit of {}", limit);
            return RetryDecision::DoNotRetry(error);
        }

        if let Some(wait) = error.retry_after() {
            debug!("server asked to retry after {:?}", wait);
            return RetryDecision::Retry(wait);
        }

        if error.is_network() || self.options.method.is_safe() || self.options.retry_unsafe_requests {
            return self.decide_safe(error);
        }

        debug!("{} is not retryable: {}", self.options.method, error);
        RetryDecision::DoNotRetry(error)
    }

    fn decide_safe(&mut self, error: PlatformError) -> RetryDecision {
        match &error {
            PlatformError::Network(_) => RetryDecision::Retry(self.next_backoff()),
            PlatformError::Server(response) if response.is_server_fault() => {
                RetryDecision::Retry(self.next_backoff())
            }
            // Most likely an expired token; the caller refreshes it before retrying.
            PlatformError::Server(response) if response.status_code == STATUS_UNAUTHORIZED => {
                RetryDecision::Retry(Duration::ZERO)
            }
            _ => {
                debug!("error is not retryable: {}", error);
                RetryDecision::DoNotRetry(error)
            }
        }
    }

    fn next_backoff(&mut self) -> Duration {
        let max = self.options.max_backoff;
        if self.current_backoff >= max || self.current_backoff.saturating_mul(2) >= max {
            self.current_backoff = max;
        } else if self.retry_count > 0 {
            self.current_backoff = self.current_backoff.saturating_mul(2);
        }
        self.current_backoff
    }
}
