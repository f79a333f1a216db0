//! Respondent authentication.
//!
//! Stage 1 exchanges an access code for a signed claim scoped to one
//! instrument and one case. Postcode-gated deployments add stage 2, which
//! confirms the case postcode before the claim can reach the instrument.
//!
//! ## Postcode lockout
//!
//! - **Threshold:** 5 failed postcode attempts lock the access code.
//! - **Window:** the lock lifts 30 minutes after the last failed attempt.
//!
//! The counter lives in the registry, so every gateway instance sees the same
//! lock state.

pub mod error;
pub mod gate;
pub mod login;
pub mod postcode;
pub mod session;
mod state;
pub mod views;

pub use error::GatewayError;
pub use gate::{VerifiedClaim, require_stage1, require_stage2};
pub use state::{
    AuthConfig, AuthState, DEFAULT_AUTH_TIMEOUT_MINUTES, DEFAULT_SESSION_MAX_AGE_SECONDS, UacKind,
};
