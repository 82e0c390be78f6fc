// src/retry/policy.rs

use crate::config::ProxySettings;
use hyper::{Method, StatusCode};

/// Upper bound on candidates tried for one request.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_on_5xx: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retry_on_5xx: true }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self {
            retry_on_5xx: settings.retry_on_5xx(),
        }
    }

    /// Only methods without side effects may be replayed on another target.
    pub fn is_retryable_method(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    pub fn plan(&self, method: &Method, candidates: usize) -> AttemptPlan {
        let retryable = Self::is_retryable_method(method);
        let max_attempts = if retryable {
            candidates.min(MAX_ATTEMPTS)
        } else {
            1
        };

        AttemptPlan {
            retryable,
            failover_on_5xx: retryable && self.retry_on_5xx,
            max_attempts,
        }
    }
}

/// Attempt budget and failover rules for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    pub retryable: bool,
    pub failover_on_5xx: bool,
    pub max_attempts: usize,
}

impl AttemptPlan {
    /// Same plan limited to the primary, for requests that cannot be replayed.
    pub fn single_attempt(self) -> Self {
        Self {
            max_attempts: self.max_attempts.min(1),
            ..self
        }
    }

    fn has_next(&self, attempt: usize) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Decide whether a response from attempt `attempt` (0-based) should be
    /// discarded in favour of the next candidate.
    pub fn on_response(&self, status: StatusCode, attempt: usize) -> RetryDecision {
        if status.is_server_error() && self.failover_on_5xx && self.has_next(attempt) {
            RetryDecision::Retry
        } else {
            RetryDecision::NoRetry
        }
    }

    pub fn on_transport_error(&self, attempt: usize) -> RetryDecision {
        if self.has_next(attempt) {
            RetryDecision::Retry
        } else {
            RetryDecision::NoRetry
        }
    }
}
