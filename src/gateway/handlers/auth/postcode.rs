//! Stage 2: postcode challenge for postcode-gated deployments.
//!
//! Each mismatch increments the registry's attempt counter. Reaching the
//! threshold locks the code until the lockout window has passed since the
//! last failed attempt; a stale counter is reset before it is checked.

use super::{
    error::GatewayError,
    login::{found, temporary},
    session::{current_claim, has_session, is_welsh, session_cookie, session_token, unauthenticated},
    state::AuthState,
    views,
};
use crate::gateway::handlers::RequestSource;
use axum::{
    Form,
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PostcodeForm {
    #[serde(default)]
    pub postcode: String,
}

#[derive(Debug)]
pub(crate) struct Validated {
    pub token: String,
    pub instrument: String,
}

fn normalize_postcode(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compare an entered postcode with the one on record, ignoring whitespace
/// and letter case. An empty entry never matches.
#[must_use]
pub fn postcode_matches(entered: &str, on_record: &str) -> bool {
    let entered = normalize_postcode(entered);
    !entered.is_empty() && entered == normalize_postcode(on_record)
}

/// Run stage 2 for the session's claim.
///
/// # Errors
/// Returns the [`GatewayError`] category the respondent should see.
#[instrument(skip_all)]
pub(crate) async fn submit_postcode(
    state: &AuthState,
    token: Option<&str>,
    entered: &str,
) -> Result<Validated, GatewayError> {
    let claim = state.codec().verify(token).map_err(|err| {
        info!(reason = %err, "postcode submitted without a stage 1 session");
        GatewayError::Unauthenticated
    })?;
    let lockout = state.lockout();
    let resolver = state.resolver();

    let mut record = resolver
        .resolve(&claim.uac)
        .await
        .map_err(GatewayError::internal)?;

    if lockout
        .needs_reset(&record, Utc::now())
        .map_err(GatewayError::internal)?
    {
        record = resolver
            .reset_postcode_attempts(&claim.uac)
            .await
            .map_err(GatewayError::internal)?;
    }

    if record.postcode_attempt_count >= lockout.threshold() {
        return Err(GatewayError::LockedOut);
    }

    let on_record = state
        .postcodes()
        .postcode(&claim.instrument, &claim.case_id)
        .await
        .map_err(GatewayError::internal)?;

    if !postcode_matches(entered, &on_record) {
        let updated = resolver
            .increment_postcode_attempts(&claim.uac)
            .await
            .map_err(GatewayError::internal)?;
        if updated.postcode_attempt_count >= lockout.threshold() {
            return Err(GatewayError::LockedOut);
        }
        return Err(GatewayError::PostcodeMismatch);
    }

    let token = state
        .codec()
        .mark_postcode_validated(&claim)
        .map_err(GatewayError::internal)?;

    if record.postcode_attempt_count > 0 {
        resolver
            .reset_postcode_attempts(&claim.uac)
            .await
            .map_err(GatewayError::internal)?;
    }

    Ok(Validated {
        token,
        instrument: claim.instrument,
    })
}

#[utoipa::path(
    get,
    path = "/auth/login/postcode",
    responses(
        (status = 200, description = "Postcode form", body = String, content_type = "text/html"),
        (status = 307, description = "Postcode already confirmed; redirect to the instrument"),
        (status = 401, description = "No stage 1 session", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn postcode_page(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    if let Some(claim) = has_session(&auth_state, &headers) {
        return temporary(&format!("/{}/", claim.instrument));
    }
    if current_claim(&auth_state, &headers).is_err() {
        return unauthenticated(&auth_state, &headers);
    }
    (
        StatusCode::OK,
        Html(views::postcode_page(is_welsh(&headers), None)),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/auth/login/postcode",
    request_body(content = PostcodeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Postcode confirmed; continue to the instrument"),
        (status = 401, description = "Postcode mismatch, lockout, or no stage 1 session", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn submit_postcode_form(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    form: Option<Form<PostcodeForm>>,
) -> Response {
    let form = form.map(|Form(form)| form).unwrap_or_default();
    let token = session_token(&headers);
    let config = auth_state.config();

    match submit_postcode(&auth_state, token.as_deref(), &form.postcode).await {
        Ok(validated) => {
            info!(instrument = %validated.instrument, "postcode confirmed");
            let mut response_headers = HeaderMap::new();
            match session_cookie(config, &validated.token) {
                Ok(cookie) => {
                    response_headers.append(SET_COOKIE, cookie);
                }
                Err(err) => {
                    return GatewayError::internal(format!("failed to build session cookie: {err}"))
                        .into_response();
                }
            }
            found(&format!("/{}/", validated.instrument), response_headers)
        }
        Err(err) => {
            let source = RequestSource::new(&headers, peer.map(|ConnectInfo(addr)| addr));
            match &err {
                GatewayError::LockedOut | GatewayError::PostcodeMismatch => warn!(
                    reason = %err,
                    source_ip = source.ip(),
                    source_xff = source.forwarded_for(),
                    "postcode rejected"
                ),
                _ => info!(
                    reason = %err,
                    source_ip = source.ip(),
                    source_xff = source.forwarded_for(),
                    "postcode step failed"
                ),
            }
            err.render(config.uac_kind(), is_welsh(&headers))
        }
    }
}
