//! Postcode attempt lockout.
//!
//! The registry keeps the attempt counter and the time of the last failed
//! attempt; everything here is pure logic over those two values.
//!
//! A code is locked while `attempts >= threshold` and the window since the
//! last attempt has not elapsed. An elapsed window means the counter is stale
//! and has to be reset before it is trusted again.

use crate::upstream::UacRecord;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

pub const MAX_POSTCODE_ATTEMPTS: u32 = 5;
pub const LOCKOUT_WINDOW_MINUTES: i64 = 30;

const REGISTRY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

#[derive(Debug, Error)]
pub enum Error {
    #[error("attempt timestamp missing while attempts = {0}")]
    MissingTimestamp(u32),
    #[error("malformed attempt timestamp: {0}")]
    Timestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl LockoutState {
    /// Derive the state from a registry record.
    ///
    /// The timestamp is only consulted once at least one attempt is recorded.
    ///
    /// # Errors
    /// Returns an error if attempts are recorded but the timestamp is missing
    /// or cannot be parsed.
    pub fn from_record(record: &UacRecord) -> Result<Self, Error> {
        let attempts = record.postcode_attempt_count;
        if attempts == 0 {
            return Ok(Self::default());
        }
        let raw = record
            .postcode_attempt_timestamp
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(Error::MissingTimestamp(attempts))?;
        Ok(Self {
            attempts,
            last_attempt_at: Some(parse_attempt_timestamp(raw)?),
        })
    }
}

/// Parse a registry attempt timestamp.
///
/// The registry writes `YYYY-MM-DD HH:MM:SS[.fffffffff] ±hhmm ZONE`, sometimes
/// followed by a monotonic clock suffix. Only the first three fields carry
/// meaning. RFC 3339 is accepted as well.
///
/// # Errors
/// Returns [`Error::Timestamp`] if neither form matches.
pub fn parse_attempt_timestamp(raw: &str) -> Result<DateTime<Utc>, Error> {
    let raw = raw.trim();
    let leading: Vec<&str> = raw.split_whitespace().take(3).collect();
    if leading.len() == 3 {
        if let Ok(parsed) = DateTime::parse_from_str(&leading.join(" "), REGISTRY_TIMESTAMP_FORMAT) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| Error::Timestamp(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u32,
    window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: MAX_POSTCODE_ATTEMPTS,
            window: Duration::minutes(LOCKOUT_WINDOW_MINUTES),
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self { threshold, window }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// True once `now >= last_attempt_at + window`. A state with no recorded
    /// attempt is always expired.
    #[must_use]
    pub fn is_expired(&self, state: &LockoutState, now: DateTime<Utc>) -> bool {
        state
            .last_attempt_at
            .map_or(true, |last| now >= last + self.window)
    }

    #[must_use]
    pub fn is_locked_out(&self, state: &LockoutState) -> bool {
        state.attempts >= self.threshold
    }

    #[must_use]
    pub fn too_many_unexpired_attempts(&self, state: &LockoutState, now: DateTime<Utc>) -> bool {
        self.is_locked_out(state) && !self.is_expired(state, now)
    }

    /// Lock check straight from a registry record. The timestamp is parsed
    /// only when the counter has reached the threshold.
    ///
    /// # Errors
    /// Returns an error if a locked-out record carries a bad timestamp.
    pub fn record_locked(&self, record: &UacRecord, now: DateTime<Utc>) -> Result<bool, Error> {
        if record.postcode_attempt_count < self.threshold {
            return Ok(false);
        }
        let state = LockoutState::from_record(record)?;
        Ok(self.too_many_unexpired_attempts(&state, now))
    }

    /// Whether a record holds stale attempts that must be reset first.
    ///
    /// # Errors
    /// Returns an error if attempts are recorded with a bad timestamp.
    pub fn needs_reset(&self, record: &UacRecord, now: DateTime<Utc>) -> Result<bool, Error> {
        if record.postcode_attempt_count == 0 {
            return Ok(false);
        }
        let state = LockoutState::from_record(record)?;
        Ok(self.is_expired(&state, now))
    }
}
