//! Stage 1: access code login.
//!
//! Flow Overview:
//! 1) Normalise the code and check its length against the deployment's kind.
//! 2) Resolve it against the registry and reject unusable records.
//! 3) In postcode-gated deployments, refuse codes that are currently locked.
//! 4) Look up the instrument's session timeout and issue the claim.
//! 5) Redirect to the instrument, or to the postcode form when gated.

use super::{
    error::GatewayError,
    session::{has_session, is_welsh, lang_cookie, session_cookie, timeout_cookie},
    state::AuthState,
    views,
};
use crate::{
    gateway::handlers::RequestSource,
    upstream::{self, UacRecord},
};
use axum::{
    Form,
    extract::{ConnectInfo, Extension, Query},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

pub const POSTCODE_FORM_PATH: &str = "/auth/login/postcode";

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub uac: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LangQuery {
    /// `cy` for Welsh, `en` for English.
    pub lang: Option<String>,
}

/// A claim issued at stage 1.
#[derive(Debug)]
pub(crate) struct Issued {
    pub token: String,
    pub instrument: String,
    pub timeout_minutes: i64,
}

/// Strip every whitespace character from an entered code.
pub(crate) fn normalize_uac(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Run stage 1 for an entered access code.
///
/// # Errors
/// Returns the [`GatewayError`] category the respondent should see.
#[instrument(skip_all)]
pub(crate) async fn login(state: &AuthState, raw: &str) -> Result<Issued, GatewayError> {
    let kind = state.config().uac_kind();
    let uac = normalize_uac(raw);
    if uac.is_empty() {
        return Err(GatewayError::EmptyCode);
    }
    if uac.chars().count() != kind.code_length() {
        return Err(GatewayError::InvalidLength(kind));
    }

    let record = match state.resolver().resolve(&uac).await {
        Ok(record) => record,
        Err(err) => {
            warn!("Failed to resolve access code: {err}");
            return Err(GatewayError::CodeNotRecognized);
        }
    };
    if !record.is_valid_target() {
        return Err(GatewayError::CodeNotRecognized);
    }

    if state.config().postcode_gate()
        && state
            .lockout()
            .record_locked(&record, Utc::now())
            .map_err(GatewayError::internal)?
    {
        return Err(GatewayError::LockedOut);
    }

    let timeout_minutes = session_timeout(state, &record).await?;
    let token = state
        .codec()
        .issue(&uac, &record, timeout_minutes)
        .map_err(GatewayError::internal)?;

    Ok(Issued {
        token,
        instrument: record.instrument,
        timeout_minutes,
    })
}

async fn session_timeout(state: &AuthState, record: &UacRecord) -> Result<i64, GatewayError> {
    let default = state.config().default_auth_timeout_minutes();
    match state.settings().settings(&record.instrument).await {
        Ok(settings) => Ok(settings.session_timeout_minutes().unwrap_or(default)),
        Err(upstream::Error::InstrumentNotInstalled) => Err(GatewayError::Unavailable(format!(
            "instrument {} is not installed",
            record.instrument
        ))),
        Err(err) => {
            warn!(
                instrument = %record.instrument,
                "Failed to read instrument settings, using default timeout: {err}"
            );
            Ok(default)
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/login",
    params(LangQuery),
    responses(
        (status = 200, description = "Login page", body = String, content_type = "text/html"),
        (status = 307, description = "Already signed in; redirect to the instrument")
    ),
    tag = "auth"
)]
pub async fn login_page(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    query: Option<Query<LangQuery>>,
) -> Response {
    if let Some(claim) = has_session(&auth_state, &headers) {
        return temporary(&format!("/{}/", claim.instrument));
    }

    let mut welsh = is_welsh(&headers);
    let mut response_headers = HeaderMap::new();
    let requested = query.and_then(|Query(query)| query.lang);
    match requested.as_deref() {
        Some("cy") if !welsh => {
            welsh = true;
            response_headers.append(SET_COOKIE, lang_cookie(true));
        }
        Some("en") if welsh => {
            welsh = false;
            response_headers.append(SET_COOKIE, lang_cookie(false));
        }
        _ => {}
    }

    let page = views::login_page(auth_state.config().uac_kind(), welsh, None);
    (StatusCode::OK, response_headers, Html(page)).into_response()
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Claim issued; continue to the instrument or the postcode form"),
        (status = 401, description = "Code missing, malformed, unknown, or locked", body = String, content_type = "text/html"),
        (status = 503, description = "Instrument not installed", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn submit_login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    form: Option<Form<LoginForm>>,
) -> Response {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    let config = auth_state.config();

    match login(&auth_state, &form.uac).await {
        Ok(issued) => {
            let location = if config.postcode_gate() {
                POSTCODE_FORM_PATH.to_string()
            } else {
                format!("/{}/", issued.instrument)
            };
            info!(instrument = %issued.instrument, "access code accepted");

            let mut response_headers = HeaderMap::new();
            match (
                session_cookie(config, &issued.token),
                timeout_cookie(config, issued.timeout_minutes),
            ) {
                (Ok(session), Ok(timeout)) => {
                    response_headers.append(SET_COOKIE, session);
                    response_headers.append(SET_COOKIE, timeout);
                }
                _ => {
                    return GatewayError::internal("failed to build session cookie")
                        .into_response();
                }
            }
            found(&location, response_headers)
        }
        Err(err) => {
            let source = RequestSource::new(&headers, peer.map(|ConnectInfo(addr)| addr));
            info!(
                reason = %err,
                source_ip = source.ip(),
                source_xff = source.forwarded_for(),
                "login rejected"
            );
            err.render(config.uac_kind(), is_welsh(&headers))
        }
    }
}

/// `302 Found` with the given extra headers.
pub(crate) fn found(location: &str, headers: HeaderMap) -> Response {
    redirect(StatusCode::FOUND, location, headers)
}

/// `307 Temporary Redirect`, used when a signed-in user lands on a login page.
pub(crate) fn temporary(location: &str) -> Response {
    redirect(StatusCode::TEMPORARY_REDIRECT, location, HeaderMap::new())
}

fn redirect(status: StatusCode, location: &str, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(LOCATION, value);
            (status, headers).into_response()
        }
        Err(_) => GatewayError::internal(format!("invalid redirect target: {location:?}"))
            .into_response(),
    }
}
