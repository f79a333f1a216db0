//! Map validated CLI arguments to the action to run.

use crate::cli::{
    actions::{Action, server::Args},
    commands::{ARG_PORT, session, upstream},
};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let upstream = upstream::Options::parse(matches)?;
    let session = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        bus_url: upstream.bus_url,
        blaise_rest_api_url: upstream.blaise_rest_api_url,
        serverpark: upstream.serverpark,
        cati_url: upstream.cati_url,
        http_timeout_seconds: upstream.http_timeout_seconds,
        jwt_secret: session.jwt_secret,
        jwt_issuer: session.jwt_issuer,
        uac_kind: session.uac_kind,
        postcode_gate: session.postcode_gate,
        default_auth_timeout_minutes: session.default_auth_timeout_minutes,
        session_max_age_seconds: session.session_max_age_seconds,
        inject_session_check: session.inject_session_check,
        body_limit_bytes: session.body_limit_bytes,
    }))
}
