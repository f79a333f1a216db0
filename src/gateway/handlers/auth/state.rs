//! Auth configuration and the collaborators the handlers share.

use crate::{
    claims::ClaimCodec,
    lockout::LockoutPolicy,
    upstream::{CredentialResolver, PostcodeLookup, SettingsProvider},
};
use std::{fmt, str::FromStr, sync::Arc};

pub const DEFAULT_AUTH_TIMEOUT_MINUTES: i64 = 15;
pub const DEFAULT_SESSION_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;

/// Which access code format respondents are issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UacKind {
    #[default]
    Uac,
    Uac16,
}

impl UacKind {
    #[must_use]
    pub fn code_length(self) -> usize {
        match self {
            Self::Uac => 12,
            Self::Uac16 => 16,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uac => "uac",
            Self::Uac16 => "uac16",
        }
    }
}

impl fmt::Display for UacKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UacKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uac" => Ok(Self::Uac),
            "uac16" => Ok(Self::Uac16),
            other => Err(format!("unknown UAC kind: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    uac_kind: UacKind,
    postcode_gate: bool,
    default_auth_timeout_minutes: i64,
    session_max_age_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            uac_kind: UacKind::default(),
            postcode_gate: false,
            default_auth_timeout_minutes: DEFAULT_AUTH_TIMEOUT_MINUTES,
            session_max_age_seconds: DEFAULT_SESSION_MAX_AGE_SECONDS,
        }
    }

    #[must_use]
    pub fn with_uac_kind(mut self, kind: UacKind) -> Self {
        self.uac_kind = kind;
        self
    }

    #[must_use]
    pub fn with_postcode_gate(mut self, enabled: bool) -> Self {
        self.postcode_gate = enabled;
        self
    }

    #[must_use]
    pub fn with_default_auth_timeout_minutes(mut self, minutes: i64) -> Self {
        self.default_auth_timeout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_session_max_age_seconds(mut self, seconds: i64) -> Self {
        self.session_max_age_seconds = seconds;
        self
    }

    #[must_use]
    pub fn uac_kind(&self) -> UacKind {
        self.uac_kind
    }

    #[must_use]
    pub fn postcode_gate(&self) -> bool {
        self.postcode_gate
    }

    #[must_use]
    pub fn default_auth_timeout_minutes(&self) -> i64 {
        self.default_auth_timeout_minutes
    }

    #[must_use]
    pub fn session_max_age_seconds(&self) -> i64 {
        self.session_max_age_seconds
    }
}

pub struct AuthState {
    config: AuthConfig,
    codec: Arc<dyn ClaimCodec>,
    resolver: Arc<dyn CredentialResolver>,
    postcodes: Arc<dyn PostcodeLookup>,
    settings: Arc<dyn SettingsProvider>,
    lockout: LockoutPolicy,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        codec: Arc<dyn ClaimCodec>,
        resolver: Arc<dyn CredentialResolver>,
        postcodes: Arc<dyn PostcodeLookup>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            config,
            codec,
            resolver,
            postcodes,
            settings,
            lockout: LockoutPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_lockout_policy(mut self, policy: LockoutPolicy) -> Self {
        self.lockout = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn codec(&self) -> &dyn ClaimCodec {
        self.codec.as_ref()
    }

    pub(super) fn resolver(&self) -> &dyn CredentialResolver {
        self.resolver.as_ref()
    }

    pub(super) fn postcodes(&self) -> &dyn PostcodeLookup {
        self.postcodes.as_ref()
    }

    pub(super) fn settings(&self) -> &dyn SettingsProvider {
        self.settings.as_ref()
    }

    pub(super) fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }
}
