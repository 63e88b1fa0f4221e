//! Remote sync error types

use std::fmt;

/// Errors that can occur when talking to the remote scoring service
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// 401 Unauthorized - credentials invalid or expired
    Unauthorized,
    /// 403 Forbidden - credentials lack required permissions
    Forbidden,
    /// 429 Rate Limited
    RateLimited { retry_after_secs: Option<u64> },
    /// Network or timeout error
    NetworkError { message: String },
    /// Other HTTP errors
    HttpError { status: u16, message: String },
    /// The service answered with a body we could not use
    InvalidResponse { message: String },
    /// The service answered an update with a different session id
    SessionMismatch { expected: String, received: String },
    /// No base URL configured for the service
    NotConfigured,
}

impl SyncError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::Unauthorized | SyncError::Forbidden)
    }

    /// Check if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::NetworkError { .. } | SyncError::RateLimited { .. } => true,
            SyncError::HttpError { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Get retry-after seconds if rate limited
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            SyncError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }

    /// Create a rate limited error
    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        SyncError::RateLimited {
            retry_after_secs: retry_after,
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        SyncError::NetworkError {
            message: message.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        SyncError::HttpError {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        SyncError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a session mismatch error
    pub fn session_mismatch(expected: impl Into<String>, received: impl Into<String>) -> Self {
        SyncError::SessionMismatch {
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        match status {
            401 => SyncError::Unauthorized,
            403 => SyncError::Forbidden,
            429 => SyncError::rate_limited(retry_after),
            _ => SyncError::http(status, body),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Unauthorized => write!(f, "Unauthorized (401)"),
            SyncError::Forbidden => write!(f, "Forbidden (403) - insufficient permissions"),
            SyncError::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "Rate limited - retry after {}s", secs)
                } else {
                    write!(f, "Rate limited")
                }
            }
            SyncError::NetworkError { message } => write!(f, "Network error - {}", message),
            SyncError::HttpError { status, message } => {
                write!(f, "HTTP {} - {}", status, message)
            }
            SyncError::InvalidResponse { message } => {
                write!(f, "Invalid response - {}", message)
            }
            SyncError::SessionMismatch { expected, received } => write!(
                f,
                "Session mismatch - sent '{}' but service answered '{}'",
                expected, received
            ),
            SyncError::NotConfigured => write!(f, "Not configured (no remote base URL)"),
        }
    }
}

impl std::error::Error for SyncError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_auth_error() {
        assert!(SyncError::Unauthorized.is_auth_error());
        assert!(SyncError::Forbidden.is_auth_error());
        assert!(!SyncError::rate_limited(None).is_auth_error());
        assert!(!SyncError::network("timeout").is_auth_error());
    }

    #[test]
    fn test_is_transient() {
        assert!(SyncError::network("connection reset").is_transient());
        assert!(SyncError::rate_limited(Some(2)).is_transient());
        assert!(SyncError::http(503, "unavailable").is_transient());
        assert!(!SyncError::http(400, "bad request").is_transient());
        assert!(!SyncError::http(500, "internal").is_transient());
        assert!(!SyncError::Unauthorized.is_transient());
        assert!(!SyncError::session_mismatch("a", "b").is_transient());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(
            SyncError::from_status(401, String::new(), None),
            SyncError::Unauthorized
        );
        assert_eq!(
            SyncError::from_status(429, String::new(), Some(5)).retry_after(),
            Some(5)
        );
        assert_eq!(
            SyncError::from_status(404, "missing".to_string(), None),
            SyncError::http(404, "missing")
        );
    }

    #[test]
    fn test_display() {
        let err = SyncError::rate_limited(Some(30));
        assert_eq!(err.to_string(), "Rate limited - retry after 30s");

        let err = SyncError::NotConfigured;
        assert_eq!(err.to_string(), "Not configured (no remote base URL)");
    }
}
