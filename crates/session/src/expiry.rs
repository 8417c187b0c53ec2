//! Expiry classification of access tokens

use crate::token;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Where a token stands relative to its expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    /// The token could not be decoded; nothing is known
    Unknown,
    /// More than the warning threshold remains
    Valid { remaining: Duration },
    /// Inside the warning window but not yet lapsed
    ExpiringSoon { remaining: Duration },
    /// The expiry instant has been reached
    Expired,
}

impl ExpiryStatus {
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }

    pub const fn is_expiring_soon(&self) -> bool {
        matches!(self, Self::ExpiringSoon { .. })
    }
}

/// Decides when a token counts as expiring soon
///
/// With expiry `T` and threshold `h`: expired when `now >= T`, expiring soon
/// when `T - h < now < T`, valid otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    warning_threshold: Duration,
}

impl ExpiryPolicy {
    pub const fn new(warning_threshold: Duration) -> Self {
        Self { warning_threshold }
    }

    pub const fn warning_threshold(&self) -> Duration {
        self.warning_threshold
    }

    /// Classify a known expiry instant
    pub fn classify_at(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> ExpiryStatus {
        let remaining = expires_at - now;
        if remaining <= TimeDelta::zero() {
            return ExpiryStatus::Expired;
        }

        // Positive, so the conversion cannot fail
        let remaining = remaining.to_std().unwrap_or_default();
        if remaining < self.warning_threshold {
            ExpiryStatus::ExpiringSoon { remaining }
        } else {
            ExpiryStatus::Valid { remaining }
        }
    }

    /// Classify a raw access token; undecodable tokens are [`ExpiryStatus::Unknown`]
    pub fn classify(&self, token: &str, now: DateTime<Utc>) -> ExpiryStatus {
        token::expires_at(token).map_or(ExpiryStatus::Unknown, |expires_at| {
            self.classify_at(expires_at, now)
        })
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
