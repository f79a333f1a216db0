//! Session cookies and the session endpoints.

use super::{
    error::GatewayError,
    state::{AuthConfig, AuthState},
    views,
};
use crate::claims::{self, SessionClaim};
use axum::{
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{Html, IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

pub const SESSION_COOKIE_NAME: &str = "surveygate_session";
pub const TIMEOUT_COOKIE_NAME: &str = "surveygate_timeout";
pub const LANG_COOKIE_NAME: &str = "surveygate_lang";

const WELSH: &str = "cy";

/// Build the `HttpOnly` cookie carrying the signed claim.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.session_max_age_seconds();
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={max_age}"
    ))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static(
        "surveygate_session=; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age=0",
    )
}

/// Remember the session timeout so the timed-out page can show it after the
/// claim itself has expired.
pub(super) fn timeout_cookie(
    config: &AuthConfig,
    minutes: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.session_max_age_seconds();
    HeaderValue::from_str(&format!(
        "{TIMEOUT_COOKIE_NAME}={minutes}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={max_age}"
    ))
}

pub(super) fn lang_cookie(welsh: bool) -> HeaderValue {
    if welsh {
        HeaderValue::from_static("surveygate_lang=cy; Path=/; Secure; SameSite=Strict")
    } else {
        HeaderValue::from_static("surveygate_lang=; Path=/; Secure; SameSite=Strict; Max-Age=0")
    }
}

pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
}

pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE_NAME).filter(|token| !token.is_empty())
}

#[must_use]
pub fn is_welsh(headers: &HeaderMap) -> bool {
    read_cookie(headers, LANG_COOKIE_NAME).is_some_and(|lang| lang == WELSH)
}

pub(crate) fn current_claim(
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<SessionClaim, claims::Error> {
    state.codec().verify(session_token(headers).as_deref())
}

/// A claim that grants instrument access under the deployment's mode.
pub(crate) fn fully_authorized(state: &AuthState, claim: &SessionClaim) -> bool {
    !state.config().postcode_gate() || claim.postcode_validated
}

/// Return the claim when the request carries a session that can reach the
/// instrument right now.
pub(crate) fn has_session(state: &AuthState, headers: &HeaderMap) -> Option<SessionClaim> {
    match current_claim(state, headers) {
        Ok(claim) if fully_authorized(state, &claim) => Some(claim),
        Ok(_) => None,
        Err(err) => {
            debug!(reason = %err, "no usable session");
            None
        }
    }
}

pub(crate) fn logout_response(headers: &HeaderMap) -> Response {
    let mut response_headers = HeaderMap::new();
    response_headers.append(SET_COOKIE, clear_session_cookie());
    (
        StatusCode::OK,
        response_headers,
        Html(views::logout_page(is_welsh(headers))),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap) -> Response {
    logout_response(&headers)
}

#[utoipa::path(
    get,
    path = "/auth/logged-in",
    responses(
        (status = 200, description = "A fully authorised session is present"),
        (status = 401, description = "No usable session")
    ),
    tag = "auth"
)]
pub async fn logged_in(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> StatusCode {
    if has_session(&auth_state, &headers).is_some() {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

#[utoipa::path(
    get,
    path = "/auth/timed-out",
    responses(
        (status = 200, description = "Session timed out page", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn timed_out(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Html<String> {
    let minutes = read_cookie(&headers, TIMEOUT_COOKIE_NAME)
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|minutes| *minutes > 0)
        .unwrap_or_else(|| auth_state.config().default_auth_timeout_minutes());
    Html(views::timed_out_page(is_welsh(&headers), minutes))
}

/// Turn a failed claim check into the unauthenticated page.
pub(crate) fn unauthenticated(state: &AuthState, headers: &HeaderMap) -> Response {
    GatewayError::Unauthenticated.render(state.config().uac_kind(), is_welsh(headers))
}
