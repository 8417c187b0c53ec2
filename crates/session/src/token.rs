//! Access token decoding
//!
//! Tokens are JWT-shaped: `header.payload.signature`. Only the payload is
//! read, and only to learn when the token lapses. Nothing here verifies a
//! signature; that is the server's job.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token does not have three dot-separated segments")]
    Malformed,

    #[error("token payload is not valid base64")]
    Encoding,

    #[error("token payload is not a JSON object")]
    Payload,

    #[error("token payload has no numeric `exp` claim")]
    MissingExpiry,

    #[error("token `exp` claim is out of range")]
    ExpiryOutOfRange,
}

/// Decode the payload segment into its claims
///
/// # Errors
///
/// Returns a [`TokenError`] describing the first structural problem found
pub fn decode_claims(token: &str) -> Result<Map<String, Value>, TokenError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed);
    };
    if payload.is_empty() {
        return Err(TokenError::Malformed);
    }

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|_| TokenError::Encoding)?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        _ => Err(TokenError::Payload),
    }
}

/// Expiry instant carried in the `exp` claim (seconds since the epoch)
///
/// # Errors
///
/// Returns a [`TokenError`] if the token cannot be decoded or has no usable
/// `exp` claim
pub fn expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let claims = decode_claims(token)?;
    let exp = claims.get("exp").ok_or(TokenError::MissingExpiry)?;

    let instant = if let Some(secs) = exp.as_i64() {
        DateTime::from_timestamp(secs, 0)
    } else if let Some(secs) = exp.as_f64().filter(|secs| secs.is_finite()) {
        #[allow(clippy::cast_possible_truncation)]
        DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
    } else {
        return Err(TokenError::MissingExpiry);
    };

    instant.ok_or(TokenError::ExpiryOutOfRange)
}

/// Expiry instant, or `None` when it cannot be determined
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    match expiry(token) {
        Ok(instant) => Some(instant),
        Err(e) => {
            tracing::debug!(error = %e, "Access token expiry unknown");
            None
        }
    }
}
