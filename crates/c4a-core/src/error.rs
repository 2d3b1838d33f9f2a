use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Payload shared by every [`CloudError`] variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    pub message: String,
    /// HTTP status, absent for pure network/timeout failures and client-side checks.
    pub status_code: Option<u16>,
    /// Raw server payload (empty object when nothing was returned).
    pub response: Value,
    /// Response headers, keys lower-cased.
    pub headers: BTreeMap<String, String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            response: Value::Object(Default::default()),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = response;
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    fn header_u64(&self, name: &str) -> Option<u64> {
        self.headers.get(name).and_then(|v| v.trim().parse().ok())
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Discriminant of a [`CloudError`], handy for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    QuotaExceeded,
    Validation,
    NotFound,
    Timeout,
    Server,
    Generic,
}

/// Which quota a [`CloudError::QuotaExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaType {
    Daily,
    Concurrent,
    Storage,
}

/// Every failure surfaced by the SDK.
///
/// Classification happens once, in the request executor; higher layers
/// propagate these values unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudError {
    /// 401: invalid or missing API key.
    #[error("Authentication error: {0}")]
    Authentication(ErrorDetails),

    /// 429 whose detail mentions a rate limit. Retry after [`CloudError::retry_after`].
    #[error("Rate limit exceeded: {0}")]
    RateLimit(ErrorDetails),

    /// 429 for daily, concurrent or storage quota.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(ErrorDetails),

    /// 400, or a request rejected client-side before any network call.
    #[error("Validation error: {0}")]
    Validation(ErrorDetails),

    /// 404: unknown job or resource.
    #[error("Not found: {0}")]
    NotFound(ErrorDetails),

    /// 504, client-side timeout, exhausted network retries, or an expired wait.
    #[error("Timeout: {0}")]
    Timeout(ErrorDetails),

    /// 5xx after internal retries were exhausted.
    #[error("Server error: {0}")]
    Server(ErrorDetails),

    /// Any other non-success outcome.
    #[error("{0}")]
    Generic(ErrorDetails),
}

impl CloudError {
    /// Map a non-success HTTP status to its error kind.
    pub fn from_status(
        status: u16,
        detail: impl Into<String>,
        response: Value,
        headers: BTreeMap<String, String>,
    ) -> Self {
        let detail = detail.into();
        let rate_limited = detail.to_lowercase().contains("rate limit");
        let details = ErrorDetails::new(detail)
            .with_status(status)
            .with_response(response)
            .with_headers(headers);

        match status {
            401 => CloudError::Authentication(details),
            404 => CloudError::NotFound(details),
            429 if rate_limited => CloudError::RateLimit(details),
            429 => CloudError::QuotaExceeded(details),
            400 => CloudError::Validation(details),
            504 => CloudError::Timeout(details),
            s if s >= 500 => CloudError::Server(details),
            _ => CloudError::Generic(details),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CloudError::Validation(ErrorDetails::new(message))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        CloudError::Timeout(ErrorDetails::new(message))
    }

    pub fn generic(message: impl Into<String>) -> Self {
        CloudError::Generic(ErrorDetails::new(message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::Authentication(_) => ErrorKind::Authentication,
            CloudError::RateLimit(_) => ErrorKind::RateLimit,
            CloudError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            CloudError::Validation(_) => ErrorKind::Validation,
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::Timeout(_) => ErrorKind::Timeout,
            CloudError::Server(_) => ErrorKind::Server,
            CloudError::Generic(_) => ErrorKind::Generic,
        }
    }

    pub fn details(&self) -> &ErrorDetails {
        match self {
            CloudError::Authentication(d)
            | CloudError::RateLimit(d)
            | CloudError::QuotaExceeded(d)
            | CloudError::Validation(d)
            | CloudError::NotFound(d)
            | CloudError::Timeout(d)
            | CloudError::Server(d)
            | CloudError::Generic(d) => d,
        }
    }

    pub fn message(&self) -> &str {
        &self.details().message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.details().status_code
    }

    pub fn response(&self) -> &Value {
        &self.details().response
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.details().headers
    }

    /// Returns true if the caller may reasonably retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CloudError::RateLimit(_) | CloudError::Timeout(_) | CloudError::Server(_)
        )
    }

    /// Seconds until the rate limit resets, from `x-ratelimit-reset`.
    ///
    /// `None` for every other kind. A missing or malformed header yields `Some(0)`.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            CloudError::RateLimit(d) => Some(d.header_u64("x-ratelimit-reset").unwrap_or(0)),
            _ => None,
        }
    }

    /// Requests allowed per window, from `x-ratelimit-limit`.
    pub fn rate_limit(&self) -> Option<u64> {
        match self {
            CloudError::RateLimit(d) => Some(d.header_u64("x-ratelimit-limit").unwrap_or(0)),
            _ => None,
        }
    }

    /// Requests left in the current window, from `x-ratelimit-remaining`.
    pub fn rate_limit_remaining(&self) -> Option<u64> {
        match self {
            CloudError::RateLimit(d) => Some(d.header_u64("x-ratelimit-remaining").unwrap_or(0)),
            _ => None,
        }
    }

    /// Quota class, inferred from the message text.
    pub fn quota_type(&self) -> Option<QuotaType> {
        match self {
            CloudError::QuotaExceeded(d) => {
                let msg = d.message.to_lowercase();
                Some(if msg.contains("storage") {
                    QuotaType::Storage
                } else if msg.contains("concurrent") {
                    QuotaType::Concurrent
                } else {
                    QuotaType::Daily
                })
            }
            _ => None,
        }
    }
}
