//! Signed session claims.
//!
//! A claim records which UAC authenticated, the instrument and case it was
//! issued for, and whether the postcode challenge has been passed. It travels
//! as an HS256 JWT inside the session cookie and is only ever trusted after
//! [`ClaimCodec::verify`] succeeds.

mod jwt;

use crate::upstream::UacRecord;
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, field};
use uuid::Uuid;

pub use jwt::{ALGORITHM, sign_hs256, verify_hs256};

/// Issuer written into, and required from, every session claim.
pub const DEFAULT_ISSUER: &str = "surveygate";

#[derive(Debug, Error)]
pub enum Error {
    #[error("no session token")]
    Missing,
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaim {
    pub uac: String,
    pub instrument: String,
    pub case_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub postcode_validated: bool,
    /// Session timeout in minutes, reused on every sliding refresh.
    pub auth_timeout: i64,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaim {
    /// Attach the authorised scope to the current span. Never records the UAC.
    pub fn record_scope(&self, span: &Span) {
        span.record("authed_instrument", field::display(&self.instrument));
        span.record("authed_case", field::display(&self.case_id));
        span.record("jti", field::display(&self.jti));
    }
}

/// Creates and checks session claims.
pub trait ClaimCodec: Send + Sync {
    /// Build a fresh claim for a resolved UAC and sign it.
    ///
    /// # Errors
    /// Returns an error if the claim cannot be encoded or signed.
    fn issue(&self, uac: &str, record: &UacRecord, timeout_minutes: i64) -> Result<String, Error>;

    /// Verify a token taken from the session.
    ///
    /// # Errors
    /// Returns an error if the token is absent, malformed, badly signed, from
    /// another issuer, or expired.
    fn verify(&self, token: Option<&str>) -> Result<SessionClaim, Error>;

    /// Re-sign `claim` with `postcode_validated = true`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    fn mark_postcode_validated(&self, claim: &SessionClaim) -> Result<String, Error>;

    /// Re-sign `claim` with a new expiry of `now + auth_timeout` minutes.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    fn refresh(&self, claim: &SessionClaim) -> Result<String, Error>;
}

/// HMAC-SHA256 implementation of [`ClaimCodec`].
#[derive(Debug, Clone)]
pub struct SessionCodec {
    secret: SecretString,
    issuer: String,
}

impl SessionCodec {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub(crate) fn issue_at(
        &self,
        uac: &str,
        record: &UacRecord,
        timeout_minutes: i64,
        now_unix_seconds: i64,
    ) -> Result<String, Error> {
        let claim = SessionClaim {
            uac: uac.to_string(),
            instrument: record.instrument.clone(),
            case_id: record.case_id.clone(),
            postcode_validated: false,
            auth_timeout: timeout_minutes,
            iss: self.issuer.clone(),
            iat: now_unix_seconds,
            exp: now_unix_seconds + timeout_minutes * 60,
            jti: Uuid::new_v4().to_string(),
        };
        sign_hs256(&self.secret, &claim)
    }

    pub(crate) fn verify_at(
        &self,
        token: Option<&str>,
        now_unix_seconds: i64,
    ) -> Result<SessionClaim, Error> {
        let token = token.filter(|t| !t.is_empty()).ok_or(Error::Missing)?;
        verify_hs256(token, &self.secret, &self.issuer, now_unix_seconds)
    }

    pub(crate) fn refresh_at(
        &self,
        claim: &SessionClaim,
        now_unix_seconds: i64,
    ) -> Result<String, Error> {
        let refreshed = SessionClaim {
            exp: now_unix_seconds + claim.auth_timeout * 60,
            ..claim.clone()
        };
        sign_hs256(&self.secret, &refreshed)
    }
}

impl ClaimCodec for SessionCodec {
    fn issue(&self, uac: &str, record: &UacRecord, timeout_minutes: i64) -> Result<String, Error> {
        self.issue_at(uac, record, timeout_minutes, Utc::now().timestamp())
    }

    fn verify(&self, token: Option<&str>) -> Result<SessionClaim, Error> {
        self.verify_at(token, Utc::now().timestamp())
    }

    fn mark_postcode_validated(&self, claim: &SessionClaim) -> Result<String, Error> {
        let validated = SessionClaim {
            postcode_validated: true,
            ..claim.clone()
        };
        sign_hs256(&self.secret, &validated)
    }

    fn refresh(&self, claim: &SessionClaim) -> Result<String, Error> {
        self.refresh_at(claim, Utc::now().timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> SessionCodec {
        SessionCodec::new(SecretString::from("test-secret".to_string()))
    }

    fn record() -> UacRecord {
        UacRecord {
            instrument: "foo".to_string(),
            case_id: "bar".to_string(),
            ..UacRecord::default()
        }
    }

    #[test]
    fn issue_then_verify_preserves_scope() -> Result<(), Error> {
        let codec = codec();
        let token = codec.issue_at("123456789012", &record(), 15, NOW)?;
        let claim = codec.verify_at(Some(&token), NOW + 60)?;

        assert_eq!(claim.uac, "123456789012");
        assert_eq!(claim.instrument, "foo");
        assert_eq!(claim.case_id, "bar");
        assert_eq!(claim.auth_timeout, 15);
        assert_eq!(claim.exp, NOW + 15 * 60);
        assert_eq!(claim.iss, DEFAULT_ISSUER);
        assert!(!claim.postcode_validated);
        assert!(Uuid::parse_str(&claim.jti).is_ok());
        Ok(())
    }

    #[test]
    fn verify_rejects_missing_and_empty_tokens() {
        let codec = codec();
        assert!(matches!(codec.verify_at(None, NOW), Err(Error::Missing)));
        assert!(matches!(codec.verify_at(Some(""), NOW), Err(Error::Missing)));
    }

    #[test]
    fn verify_rejects_expired_token() -> Result<(), Error> {
        let codec = codec();
        let token = codec.issue_at("123456789012", &record(), 15, NOW)?;
        let result = codec.verify_at(Some(&token), NOW + 15 * 60);
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn verify_rejects_other_secret_and_issuer() -> Result<(), Error> {
        let token = codec().issue_at("123456789012", &record(), 15, NOW)?;

        let other_secret = SessionCodec::new(SecretString::from("another-secret".to_string()));
        assert!(matches!(
            other_secret.verify_at(Some(&token), NOW),
            Err(Error::InvalidSignature)
        ));

        let other_issuer = codec().with_issuer("someone-else".to_string());
        assert!(matches!(
            other_issuer.verify_at(Some(&token), NOW),
            Err(Error::InvalidIssuer)
        ));
        Ok(())
    }

    #[test]
    fn mark_postcode_validated_keeps_other_fields() -> Result<(), Error> {
        let codec = codec();
        let token = codec.issue_at("123456789012", &record(), 15, NOW)?;
        let claim = codec.verify_at(Some(&token), NOW)?;

        let validated = codec.mark_postcode_validated(&claim)?;
        let validated = codec.verify_at(Some(&validated), NOW)?;

        assert!(validated.postcode_validated);
        assert_eq!(
            SessionClaim {
                postcode_validated: false,
                ..validated
            },
            claim
        );
        Ok(())
    }

    #[test]
    fn refresh_slides_expiry_only() -> Result<(), Error> {
        let codec = codec();
        let token = codec.issue_at("123456789012", &record(), 15, NOW)?;
        let claim = codec.verify_at(Some(&token), NOW)?;

        let refreshed = codec.refresh_at(&claim, NOW + 600)?;
        let refreshed = codec.verify_at(Some(&refreshed), NOW + 600)?;

        assert_eq!(refreshed.exp, NOW + 600 + 15 * 60);
        assert_eq!(refreshed.iat, claim.iat);
        assert_eq!(refreshed.jti, claim.jti);
        assert_eq!(refreshed.case_id, claim.case_id);
        Ok(())
    }
}
