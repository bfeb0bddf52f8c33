//! Remote API error types.
//!
//! Every outbound failure is classified once, where the response is seen, so
//! that callers decide on the kind rather than on raw status codes:
//!
//! - **Authentication** (401/403): credentials are the problem; never retried
//! - **NotFound** (404): during probing this means "wrong API shape"
//! - **Conflict** (409, or a duplicate message on 400/422): the resource
//!   already exists, which create calls treat as success
//! - **Transient** (429, 5xx, timeouts, connection failures): retriable, and
//!   recorded per sub-operation otherwise
//! - **Permanent**: everything else

use std::fmt;
use thiserror::Error;

/// The kind of remote API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    Authentication,
    NotFound,
    Conflict,
    Transient,
    Permanent,
}

impl RemoteErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RemoteErrorKind::Transient)
    }

    /// Classifies an HTTP status code plus response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => RemoteErrorKind::Authentication,
            404 => RemoteErrorKind::NotFound,
            409 => RemoteErrorKind::Conflict,
            400 | 422 if is_duplicate_message(body) => RemoteErrorKind::Conflict,
            429 => RemoteErrorKind::Transient,
            code if (500..600).contains(&code) => RemoteErrorKind::Transient,
            _ => RemoteErrorKind::Permanent,
        }
    }
}

/// A remote API error with its classification.
#[derive(Debug, Error)]
pub struct RemoteApiError {
    pub kind: RemoteErrorKind,

    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying transport error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for RemoteApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "remote API error (HTTP {}): {}", code, self.message),
            None => write!(f, "remote API error: {}", self.message),
        }
    }
}

/// Longest response-body excerpt kept in an error message.
const MAX_BODY_EXCERPT: usize = 300;

impl RemoteApiError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Permanent, message)
    }

    /// Builds an error from a non-success response.
    pub fn from_response(status: u16, body: &str) -> Self {
        Self {
            kind: RemoteErrorKind::from_status(status, body),
            status_code: Some(status),
            message: excerpt(body),
            source: None,
        }
    }

    /// Categorizes a transport-level reqwest error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        let kind = if err.is_timeout() || err.is_connect() {
            RemoteErrorKind::Transient
        } else if let Some(code) = status_code {
            RemoteErrorKind::from_status(code, "")
        } else if err.is_request() || err.is_body() {
            // Connection reset mid-flight and similar.
            RemoteErrorKind::Transient
        } else {
            RemoteErrorKind::Permanent
        };

        Self {
            kind,
            status_code,
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == RemoteErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Checks whether a 400/422 body describes a uniqueness violation.
fn is_duplicate_message(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("already exists") || lower.contains("duplicate")
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty response body)".to_string();
    }
    match trimmed.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(RemoteErrorKind::from_status(401, ""), RemoteErrorKind::Authentication);
        assert_eq!(RemoteErrorKind::from_status(403, ""), RemoteErrorKind::Authentication);
        assert_eq!(RemoteErrorKind::from_status(404, ""), RemoteErrorKind::NotFound);
        assert_eq!(RemoteErrorKind::from_status(409, ""), RemoteErrorKind::Conflict);
        assert_eq!(RemoteErrorKind::from_status(429, ""), RemoteErrorKind::Transient);
        assert_eq!(RemoteErrorKind::from_status(502, ""), RemoteErrorKind::Transient);
        assert_eq!(RemoteErrorKind::from_status(400, "bad field"), RemoteErrorKind::Permanent);
    }

    #[test]
    fn duplicate_messages_on_validation_errors_are_conflicts() {
        assert_eq!(
            RemoteErrorKind::from_status(400, r#"{"message":"Revision already exists"}"#),
            RemoteErrorKind::Conflict
        );
        assert_eq!(
            RemoteErrorKind::from_status(422, "Duplicate entry for key"),
            RemoteErrorKind::Conflict
        );
        // Only 400 and 422 carry the message-based rule.
        assert_eq!(
            RemoteErrorKind::from_status(500, "duplicate"),
            RemoteErrorKind::Transient
        );
    }

    #[test]
    fn only_transient_is_retriable() {
        assert!(RemoteErrorKind::Transient.is_retriable());
        assert!(!RemoteErrorKind::Authentication.is_retriable());
        assert!(!RemoteErrorKind::Conflict.is_retriable());
        assert!(!RemoteErrorKind::NotFound.is_retriable());
        assert!(!RemoteErrorKind::Permanent.is_retriable());
    }

    #[test]
    fn display_includes_status() {
        let err = RemoteApiError::from_response(404, "no such thing");
        assert_eq!(err.to_string(), "remote API error (HTTP 404): no such thing");
        assert!(err.is_not_found());

        let err = RemoteApiError::transient("timed out");
        assert_eq!(err.to_string(), "remote API error: timed out");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = RemoteApiError::from_response(500, &body);
        assert!(err.message.len() < 400);
        assert!(err.message.ends_with("..."));
    }

    #[test]
    fn empty_body_has_placeholder_message() {
        let err = RemoteApiError::from_response(409, "  ");
        assert!(err.is_conflict());
        assert_eq!(err.message, "(empty response body)");
    }
}
