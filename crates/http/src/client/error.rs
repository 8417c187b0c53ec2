//! Client error types

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Body of a failed response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    /// Human-readable message extracted from the JSON payload, if any
    pub message: Option<String>,
    /// Raw response text
    pub raw: String,
}

impl ErrorBody {
    pub fn from_text(raw: String) -> Self {
        Self {
            message: extract_message(&raw),
            raw,
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.raw.trim()) {
            (Some(message), _) => f.write_str(message),
            (None, "") => f.write_str("<empty body>"),
            (None, raw) => f.write_str(raw),
        }
    }
}

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: ErrorBody },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(ErrorBody),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(ErrorBody),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(ErrorBody),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(ErrorBody),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code and response text
    pub fn from_status(status: reqwest::StatusCode, text: String) -> Self {
        let body = ErrorBody::from_text(text);
        match status.as_u16() {
            400 => Self::BadRequest(body),
            401 => Self::AuthenticationFailed(body),
            403 => Self::Forbidden(body),
            404 => Self::NotFound(body),
            _ => Self::ServerError {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// HTTP status of the failed response, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::ServerError { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Serialization(_) | Self::Configuration(_) => None,
        }
    }

    /// Message the server put in its error payload
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::BadRequest(body)
            | Self::AuthenticationFailed(body)
            | Self::Forbidden(body)
            | Self::NotFound(body)
            | Self::ServerError { body, .. } => body.message.as_deref(),
            _ => None,
        }
    }

    /// Server message, or `fallback` when the payload carried none
    pub fn message_or(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}

/// Pull a human-readable message out of an error payload
///
/// Looks at `message`, then `error.message`, then a string `error`, then
/// `title`; a bare JSON string counts as the message itself. Blank values are
/// skipped.
pub fn extract_message(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;

    let candidates = [
        value.get("message"),
        value.get("error").and_then(|error| error.get("message")),
        value.get("error"),
        value.get("title"),
        Some(&value),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}
