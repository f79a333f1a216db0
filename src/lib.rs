//! # Surveygate (access-code gateway for self-administered surveys)
//!
//! `surveygate` sits in front of a web interview engine. A respondent enters a
//! single-use access code (UAC); the gateway resolves it against the UAC
//! registry, optionally asks for the postcode on record for the case, and then
//! issues a signed session claim that scopes every later request to exactly one
//! instrument and one case.
//!
//! ## Authentication
//!
//! - **Stage 1:** the UAC is normalised, length-checked and resolved. Disabled,
//!   unknown or incomplete registry records are rejected.
//! - **Stage 2 (postcode-gated deployments):** the entered postcode is compared
//!   with the case postcode ignoring whitespace and letter case. Five failures
//!   lock the code for 30 minutes.
//!
//! ## Authorization
//!
//! Requests under `/{instrument}/` are only forwarded when the claim covers the
//! instrument. Starting an interview additionally checks that the case in the
//! request body is the claim's case. Claims are stateless HS256 tokens kept in
//! an `HttpOnly` cookie; there is no server-side session store.

pub mod claims;
pub mod cli;
pub mod gateway;
pub mod lockout;
pub mod upstream;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
