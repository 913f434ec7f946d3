//! Failures raised while opening a fragment stream
//!
//! Once a stream is open, provider failures travel in-band as
//! `Fragment::Error`. `LlmError` covers only the call that produces the
//! stream, and its kind decides whether the run pipeline re-runs.

use std::time::Duration;
use thiserror::Error;

/// Stream-open failure reported by a `LanguageModel`
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Provider-requested wait before the next attempt
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Classify an HTTP status returned while opening the stream.
    ///
    /// A JSON body carrying `error.retry_after` (seconds) sets the delay
    /// for rate-limit responses.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!("stream rejected ({status}): {body}")),
            429 => {
                let err = Self::rate_limit(format!("stream rate limited: {body}"));
                match parse_retry_after(body) {
                    Some(delay) => err.with_retry_after(delay),
                    None => err,
                }
            }
            400 | 422 => Self::invalid_request(format!("request refused ({status}): {body}")),
            408 => Self::network(format!("stream open timed out: {body}")),
            500..=599 => Self::server_error(format!("provider failed ({status}): {body}")),
            _ => Self::unknown(format!("unexpected status {status}: {body}")),
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Whether re-running the pipeline could succeed
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }
}

fn parse_retry_after(body: &str) -> Option<Duration> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let seconds = parsed.get("error")?.get("retry_after")?.as_f64()?;
    Duration::try_from_secs_f64(seconds).ok()
}

/// Why a stream could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection reset or timed out before the first fragment
    Network,
    RateLimit,
    /// Provider-side 5xx
    ServerError,
    /// Credentials rejected
    Auth,
    /// The request itself is malformed; re-sending it cannot help
    InvalidRequest,
    Unknown,
}

impl LlmErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(LlmError::network("x").is_retryable());
        assert!(LlmError::rate_limit("x").is_retryable());
        assert!(LlmError::server_error("x").is_retryable());
        assert!(!LlmError::auth("x").is_retryable());
        assert!(!LlmError::invalid_request("x").is_retryable());
        assert!(!LlmError::unknown("x").is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = LlmError::rate_limit("slow down").with_retry_after(Duration::from_secs(3));
        assert_eq!(err.retry_after, Some(Duration::from_secs(3)));
        assert_eq!(err.to_string(), "slow down");
    }

    #[test]
    fn test_from_status_classification() {
        assert_eq!(LlmError::from_status(401, "").kind, LlmErrorKind::Auth);
        assert_eq!(LlmError::from_status(400, "").kind, LlmErrorKind::InvalidRequest);
        assert_eq!(LlmError::from_status(408, "").kind, LlmErrorKind::Network);
        assert_eq!(LlmError::from_status(503, "").kind, LlmErrorKind::ServerError);
        assert_eq!(LlmError::from_status(418, "").kind, LlmErrorKind::Unknown);
    }

    #[test]
    fn test_rate_limit_body_sets_retry_after() {
        let err = LlmError::from_status(429, r#"{"error":{"retry_after":1.5}}"#);
        assert_eq!(err.kind, LlmErrorKind::RateLimit);
        assert_eq!(err.retry_after, Some(Duration::from_millis(1500)));

        let err = LlmError::from_status(429, "not json");
        assert!(err.retry_after.is_none());
        assert!(err.is_retryable());
    }
}
