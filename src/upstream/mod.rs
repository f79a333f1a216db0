//! Clients for the services the gateway consumes: the UAC registry ("bus")
//! and the survey data REST API (postcodes and instrument settings).

pub mod blaise;
pub mod bus;

pub use blaise::BlaiseRestApi;
pub use bus::BusApi;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin, time::Duration};
use thiserror::Error;

/// Placeholder the registry uses for instruments and cases it cannot name.
pub const UNKNOWN_SENTINEL: &str = "unknown";

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("case not found")]
    CaseNotFound,
    #[error("instrument not installed")]
    InstrumentNotInstalled,
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

pub type UpstreamFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UacRecord {
    #[serde(rename = "instrument_name", default)]
    pub instrument: String,
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(rename = "postcode_attempts", default)]
    pub postcode_attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode_attempt_timestamp: Option<String>,
}

impl UacRecord {
    /// Whether the record can be used to authenticate at all.
    #[must_use]
    pub fn is_valid_target(&self) -> bool {
        let named = |value: &str| {
            let value = value.trim();
            !value.is_empty() && !value.eq_ignore_ascii_case(UNKNOWN_SENTINEL)
        };
        !self.disabled && named(&self.instrument) && named(&self.case_id)
    }
}

pub const STRICT_INTERVIEWING: &str = "StrictInterviewing";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "sessionTimeout", default)]
    pub session_timeout: i64,
    #[serde(rename = "saveSessionOnTimeout", default)]
    pub save_session_on_timeout: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentSettings {
    pub blocks: Vec<SettingsBlock>,
}

impl InstrumentSettings {
    #[must_use]
    pub fn strict_interviewing(&self) -> Option<&SettingsBlock> {
        self.blocks.iter().find(|block| block.kind == STRICT_INTERVIEWING)
    }

    /// Session timeout configured for strict interviewing, if positive.
    #[must_use]
    pub fn session_timeout_minutes(&self) -> Option<i64> {
        self.strict_interviewing()
            .map(|block| block.session_timeout)
            .filter(|minutes| *minutes > 0)
    }
}

/// The UAC registry.
pub trait CredentialResolver: Send + Sync {
    /// Resolve a UAC. An unknown code yields an empty record, not an error.
    fn resolve<'a>(&'a self, uac: &'a str) -> UpstreamFuture<'a, UacRecord>;

    fn increment_postcode_attempts<'a>(&'a self, uac: &'a str) -> UpstreamFuture<'a, UacRecord>;

    fn reset_postcode_attempts<'a>(&'a self, uac: &'a str) -> UpstreamFuture<'a, UacRecord>;
}

pub trait PostcodeLookup: Send + Sync {
    fn postcode<'a>(&'a self, instrument: &'a str, case_id: &'a str)
        -> UpstreamFuture<'a, String>;
}

pub trait SettingsProvider: Send + Sync {
    fn settings<'a>(&'a self, instrument: &'a str) -> UpstreamFuture<'a, InstrumentSettings>;
}

/// Shared outbound client with the gateway's user agent and timeouts.
///
/// # Errors
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .timeout(timeout)
        .build()?)
}

/// Join `path` onto `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<url::Url, Error> {
    let base = url::Url::parse(base)?;
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(url::Url::parse(&joined)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn record(instrument: &str, case_id: &str) -> UacRecord {
        UacRecord {
            instrument: instrument.to_string(),
            case_id: case_id.to_string(),
            ..UacRecord::default()
        }
    }

    #[test]
    fn valid_target_requires_named_instrument_and_case() {
        assert!(record("dia2101a", "100001").is_valid_target());
        assert!(!record("", "100001").is_valid_target());
        assert!(!record("dia2101a", " ").is_valid_target());
        assert!(!record("unknown", "100001").is_valid_target());
        assert!(!record("dia2101a", "UNKNOWN").is_valid_target());
        assert!(!UacRecord::default().is_valid_target());
    }

    #[test]
    fn disabled_record_is_never_valid() {
        let disabled = UacRecord {
            disabled: true,
            ..record("dia2101a", "100001")
        };
        assert!(!disabled.is_valid_target());
    }

    #[test]
    fn decodes_registry_json() -> Result<()> {
        let json = r#"{
            "instrument_name": "dia2101a",
            "case_id": "100001",
            "postcode_attempts": 3,
            "postcode_attempt_timestamp": "2024-03-01 09:30:00 +0000 UTC"
        }"#;
        let record: UacRecord = serde_json::from_str(json)?;
        assert_eq!(record.instrument, "dia2101a");
        assert_eq!(record.postcode_attempt_count, 3);
        assert!(!record.disabled);
        assert_eq!(
            record.postcode_attempt_timestamp.as_deref(),
            Some("2024-03-01 09:30:00 +0000 UTC")
        );
        Ok(())
    }

    #[test]
    fn settings_use_strict_interviewing_block() -> Result<()> {
        let blocks: Vec<SettingsBlock> = serde_json::from_str(
            r#"[
                {"type": "CawiDefault", "sessionTimeout": 60},
                {"type": "StrictInterviewing", "sessionTimeout": 20, "saveSessionOnTimeout": true}
            ]"#,
        )?;
        let settings = InstrumentSettings { blocks };
        assert_eq!(settings.session_timeout_minutes(), Some(20));

        let zero = InstrumentSettings {
            blocks: vec![SettingsBlock {
                kind: STRICT_INTERVIEWING.to_string(),
                ..SettingsBlock::default()
            }],
        };
        assert_eq!(zero.session_timeout_minutes(), None);
        assert_eq!(InstrumentSettings::default().session_timeout_minutes(), None);
        Ok(())
    }

    #[test]
    fn endpoint_url_keeps_base_path() -> Result<()> {
        let url = endpoint_url("http://bus.local/v2/", "/uacs/uac")?;
        assert_eq!(url.as_str(), "http://bus.local/v2/uacs/uac");

        let url = endpoint_url("http://bus.local", "uacs/uac")?;
        assert_eq!(url.as_str(), "http://bus.local/uacs/uac");
        Ok(())
    }
}
