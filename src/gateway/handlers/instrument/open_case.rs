use super::{EngineProxy, SubPath, scope::authorized_for_instrument};
use crate::gateway::handlers::{
    RequestSource,
    auth::{GatewayError, VerifiedClaim, session::is_welsh},
};
use axum::{
    extract::{ConnectInfo, Extension, Path},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::CONTENT_TYPE,
    },
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{instrument, warn};

pub const SESSION_CHECK_SCRIPT: &str = r#"<script src="/assets/js/check-session.js"></script>"#;

const CASE_PAGE: &str = "default.aspx";
const CLOSING_BODY: &str = "</body>";

fn case_form(case_id: &str, welsh: bool) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("KeyValue", case_id.to_string()),
        ("Mode", "CAWI".to_string()),
    ];
    if welsh {
        form.push(("Language", "WLS".to_string()));
    }
    form
}

/// Insert the session check script before the last `</body>`. Pages without
/// one are returned untouched.
#[must_use]
pub fn inject_session_check(html: &str) -> String {
    let lowered = html.to_ascii_lowercase();
    match lowered.rfind(CLOSING_BODY) {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + SESSION_CHECK_SCRIPT.len());
            out.push_str(&html[..index]);
            out.push_str(SESSION_CHECK_SCRIPT);
            out.push_str(&html[index..]);
            out
        }
        None => html.to_string(),
    }
}

/// `GET /{instrument}/`: open the claim's case in the engine.
#[instrument(skip_all, fields(instrument = %instrument))]
pub async fn open_case(
    engine: Extension<Arc<EngineProxy>>,
    Extension(VerifiedClaim(claim)): Extension<VerifiedClaim>,
    Path(instrument): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    if !authorized_for_instrument(&claim, &instrument) {
        let source = RequestSource::new(&headers, peer.map(|ConnectInfo(addr)| addr));
        warn!(
            authed_instrument = %claim.instrument,
            authed_case = %claim.case_id,
            source_ip = source.ip(),
            source_xff = source.forwarded_for(),
            "open case outside claim scope"
        );
        return GatewayError::Forbidden.into_response();
    }

    let target = match engine.target(&claim.instrument, &SubPath::page(CASE_PAGE)) {
        Ok(target) => target,
        Err(err) => return err.into_response(),
    };

    let upstream = match engine
        .client()
        .post(target)
        .form(&case_form(&claim.case_id, is_welsh(&headers)))
        .send()
        .await
    {
        Ok(upstream) => upstream,
        Err(err) => {
            return GatewayError::internal(format!("open case request failed: {err}")).into_response();
        }
    };

    let status = upstream.status();
    if status != StatusCode::OK {
        return GatewayError::internal(format!("engine answered open case with {status}"))
            .into_response();
    }

    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let body = match upstream.bytes().await {
        Ok(body) => body,
        Err(err) => {
            return GatewayError::internal(format!("failed to read open case page: {err}"))
                .into_response();
        }
    };

    let is_html = content_type
        .as_ref()
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));
    let body = if engine.inject_session_check() && is_html {
        match std::str::from_utf8(&body) {
            Ok(html) => inject_session_check(html).into_bytes().into(),
            Err(_) => body,
        }
    } else {
        body
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        CONTENT_TYPE,
        content_type.unwrap_or_else(|| HeaderValue::from_static("text/html; charset=utf-8")),
    );
    (status, response_headers, body).into_response()
}
