//! Error handling for catalog requests.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Common error type for requests sent through [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server rejected the credential (HTTP 401).
    ///
    /// By the time this is returned the session has already been invalidated.
    #[error("session expired, please log in again")]
    SessionExpired,
    /// The server answered with a non-success status.
    #[error("{}", fmt_status_error(.status, .message))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    /// The request never produced a response.
    #[error("request failed")]
    Network(#[source] reqwest::Error),
    #[error("could not encode request body")]
    Encode(#[source] serde_json::Error),
    /// The response body was not what we expected.
    #[error("could not decode response")]
    Decode(#[source] serde_json::Error),
    #[error("invalid catalog url '{url}'")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("could not build http client")]
    Build(#[source] reqwest::Error),
}

impl TransportError {
    /// The message reported by the upstream server, if any.
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            TransportError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// The HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, TransportError::SessionExpired)
    }
}

/// Error bodies of the catalog API look like `{ "message": "..." }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Extract the upstream `message` field from an error body.
///
/// Bodies that are not JSON (proxies like to send HTML) yield `None`.
pub(crate) fn parse_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
}

fn fmt_status_error(status: &StatusCode, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{status}: {message}"),
        None => format!("{status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upstream_message() {
        assert_eq!(
            parse_error_message(r#"{"message":"Recipe with id '999' not found"}"#).as_deref(),
            Some("Recipe with id '999' not found")
        );
    }

    #[test]
    fn ignores_non_json_bodies() {
        assert_eq!(parse_error_message("<html>bad gateway</html>"), None);
        assert_eq!(parse_error_message(r#"{"message":"  "}"#), None);
        assert_eq!(parse_error_message(r#"{"detail":"nope"}"#), None);
    }

    #[test]
    fn display_includes_status_and_message() {
        let err = TransportError::Status {
            status: StatusCode::NOT_FOUND,
            message: Some("gone".to_string()),
        };
        assert_eq!(err.to_string(), "404 Not Found: gone");
        assert_eq!(err.upstream_message(), Some("gone"));

        let err = TransportError::Status {
            status: StatusCode::BAD_GATEWAY,
            message: None,
        };
        assert_eq!(err.to_string(), "502 Bad Gateway");
        assert_eq!(err.upstream_message(), None);
    }
}
