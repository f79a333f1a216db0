use crate::{
    claims::SessionCodec,
    gateway::{
        self,
        handlers::{
            auth::{AuthConfig, AuthState, UacKind},
            instrument::EngineProxy,
        },
    },
    upstream::{self, BlaiseRestApi, BusApi},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub bus_url: String,
    pub blaise_rest_api_url: String,
    pub serverpark: String,
    pub cati_url: Url,
    pub http_timeout_seconds: u64,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub uac_kind: UacKind,
    pub postcode_gate: bool,
    pub default_auth_timeout_minutes: i64,
    pub session_max_age_seconds: i64,
    pub inject_session_check: bool,
    pub body_limit_bytes: usize,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the HTTP client cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let client = upstream::http_client(Duration::from_secs(args.http_timeout_seconds))
        .context("Failed to build HTTP client")?;

    let config = AuthConfig::new()
        .with_uac_kind(args.uac_kind)
        .with_postcode_gate(args.postcode_gate)
        .with_default_auth_timeout_minutes(args.default_auth_timeout_minutes)
        .with_session_max_age_seconds(args.session_max_age_seconds);

    let codec = SessionCodec::new(args.jwt_secret).with_issuer(args.jwt_issuer);
    let bus = Arc::new(BusApi::new(args.bus_url, client.clone()));
    let rest = Arc::new(BlaiseRestApi::new(
        args.blaise_rest_api_url,
        args.serverpark,
        client.clone(),
    ));

    let auth_state = AuthState::new(config, Arc::new(codec), bus, rest.clone(), rest);
    let engine = EngineProxy::new(args.cati_url, client)
        .with_session_check(args.inject_session_check)
        .with_body_limit(args.body_limit_bytes);

    gateway::new(args.port, Arc::new(auth_state), Arc::new(engine)).await
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        bus_url = %args.bus_url,
        blaise_rest_api_url = %args.blaise_rest_api_url,
        serverpark = %args.serverpark,
        cati_url = %args.cati_url,
        uac_kind = %args.uac_kind,
        postcode_gate = args.postcode_gate,
        inject_session_check = args.inject_session_check,
        "Starting surveygate"
    );
}
