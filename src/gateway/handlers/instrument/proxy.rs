use super::{
    EngineProxy,
    scope::{authorized_for_case, authorized_for_instrument},
};
use crate::{
    claims::SessionClaim,
    gateway::handlers::{
        RequestSource,
        auth::{
            AuthState, GatewayError, VerifiedClaim,
            session::{SESSION_COOKIE_NAME, session_cookie},
        },
    },
};
use axum::{
    body::{Body, HttpBody, to_bytes},
    extract::{ConnectInfo, Extension, Path, Request},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{CONNECTION, CONTENT_LENGTH, COOKIE, HOST, SET_COOKIE, TE, TRAILER, TRANSFER_ENCODING, UPGRADE},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, instrument, warn};

pub const START_INTERVIEW_PATH: &str = "api/application/start_interview";

const API_SEGMENT: &str = "api";
const GATEWAY_COOKIE_PREFIX: &str = "surveygate_";

#[derive(Deserialize)]
struct RuntimeParameters {
    #[serde(rename = "KeyValue")]
    key_value: Option<String>,
}

#[derive(Deserialize)]
struct StartInterview {
    #[serde(rename = "RuntimeParameters")]
    runtime_parameters: Option<RuntimeParameters>,
    #[serde(rename = "KeyValue")]
    key_value: Option<String>,
}

/// Case a start-interview body asks for: `RuntimeParameters.KeyValue`, or a
/// top-level `KeyValue` when the parameters block is absent.
///
/// # Errors
/// Returns an error if the body is not a JSON object of the expected shape.
pub fn start_interview_case(body: &[u8]) -> Result<Option<String>, serde_json::Error> {
    let request: StartInterview = serde_json::from_slice(body)?;
    Ok(request
        .runtime_parameters
        .and_then(|params| params.key_value)
        .or(request.key_value))
}

/// Decoded path below `/{instrument}/`, with empty and `.` segments removed.
///
/// The same value is checked against the claim and used to build the engine
/// URL.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SubPath {
    segments: Vec<String>,
    trailing_slash: bool,
}

impl SubPath {
    /// `None` when a segment climbs out with `..`.
    pub(crate) fn parse(decoded: &str) -> Option<Self> {
        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => return None,
                _ => segments.push(segment.to_string()),
            }
        }
        let trailing_slash = !segments.is_empty() && decoded.ends_with('/');
        Some(Self {
            segments,
            trailing_slash,
        })
    }

    /// A single page directly under the instrument.
    pub(crate) fn page(name: &str) -> Self {
        Self {
            segments: vec![name.to_string()],
            trailing_slash: false,
        }
    }

    pub(crate) fn segments(&self) -> &[String] {
        &self.segments
    }

    pub(crate) fn trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    fn is_start_interview(&self) -> bool {
        self.segments.join("/").eq_ignore_ascii_case(START_INTERVIEW_PATH)
    }

    fn is_api(&self) -> bool {
        self.segments
            .first()
            .is_some_and(|first| first.eq_ignore_ascii_case(API_SEGMENT))
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == CONNECTION
        || name == TE
        || name == TRAILER
        || name == TRANSFER_ENCODING
        || name == UPGRADE
        || matches!(
            name.as_str(),
            "keep-alive" | "proxy-authenticate" | "proxy-authorization" | "proxy-connection"
        )
}

/// Drop the gateway's own cookies; the engine never sees the session claim.
fn engine_cookies(value: &HeaderValue) -> Option<HeaderValue> {
    let kept: Vec<&str> = value
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty() && !pair.starts_with(GATEWAY_COOKIE_PREFIX))
        .collect();
    if kept.is_empty() {
        return None;
    }
    HeaderValue::from_str(&kept.join("; ")).ok()
}

fn outbound_headers(inbound: &HeaderMap, peer: Option<SocketAddr>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name) || name == HOST || name == CONTENT_LENGTH {
            continue;
        }
        if name == COOKIE {
            if let Some(value) = engine_cookies(value) {
                headers.append(COOKIE, value);
            }
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(peer) = peer {
        let forwarded = match inbound
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            Some(prior) => format!("{prior}, {}", peer.ip()),
            None => peer.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert("x-forwarded-for", value);
        }
    }
    headers
}

fn forbidden(claim: &SessionClaim, instrument: &str, source: &RequestSource, reason: &str) -> Response {
    warn!(
        authed_instrument = %claim.instrument,
        authed_case = %claim.case_id,
        instrument,
        source_ip = source.ip(),
        source_xff = source.forwarded_for(),
        reason,
        "request outside claim scope"
    );
    GatewayError::Forbidden.into_response()
}

/// `ANY /{instrument}/{*path}`
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn proxy(
    auth_state: Extension<Arc<AuthState>>,
    engine: Extension<Arc<EngineProxy>>,
    Extension(VerifiedClaim(claim)): Extension<VerifiedClaim>,
    Path((instrument, path)): Path<(String, String)>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let source = RequestSource::new(request.headers(), peer);
    let query = request.uri().query().map(str::to_string);

    if !authorized_for_instrument(&claim, &instrument) {
        return forbidden(&claim, &instrument, &source, "instrument");
    }
    let Some(sub_path) = SubPath::parse(&path) else {
        return forbidden(&claim, &instrument, &source, "path");
    };

    let (parts, body) = request.into_parts();
    let body = if sub_path.is_start_interview() {
        let bytes = match to_bytes(body, engine.body_limit()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Failed to buffer start interview body: {err}");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        };
        match start_interview_case(&bytes) {
            Ok(Some(case_id)) if authorized_for_case(&claim, &case_id) => {}
            Ok(_) => return forbidden(&claim, &instrument, &source, "case"),
            Err(err) => {
                return GatewayError::internal(format!("unreadable start interview body: {err}"))
                    .into_response();
            }
        }
        Some(reqwest::Body::from(bytes))
    } else if body.is_end_stream() {
        None
    } else {
        Some(reqwest::Body::wrap_stream(body.into_data_stream()))
    };

    let refreshed = if sub_path.is_api() {
        let cookie = auth_state
            .codec()
            .refresh(&claim)
            .map_err(GatewayError::internal)
            .and_then(|token| {
                session_cookie(auth_state.config(), &token).map_err(GatewayError::internal)
            });
        match cookie {
            Ok(cookie) => Some(cookie),
            Err(err) => return err.into_response(),
        }
    } else {
        None
    };

    let mut target = match engine.target(&instrument, &sub_path) {
        Ok(target) => target,
        Err(err) => return err.into_response(),
    };
    target.set_query(query.as_deref());
    debug!(%target, "forwarding to engine");

    let mut outbound = engine
        .client()
        .request(parts.method, target)
        .headers(outbound_headers(&parts.headers, peer));
    if let Some(body) = body {
        outbound = outbound.body(body);
    }

    let upstream = match outbound.send().await {
        Ok(upstream) => upstream,
        Err(err) => {
            return GatewayError::internal(format!("engine request failed: {err}")).into_response();
        }
    };

    let status = upstream.status();
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    if let Some(cookie) = refreshed {
        headers.append(SET_COOKIE, cookie);
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn start_interview_reads_runtime_parameters() -> Result<()> {
        let body = br#"{"RuntimeParameters":{"KeyValue":"100001","Mode":"CAWI"}}"#;
        assert_eq!(start_interview_case(body)?.as_deref(), Some("100001"));

        let body = br#"{"KeyValue":"100002"}"#;
        assert_eq!(start_interview_case(body)?.as_deref(), Some("100002"));

        let body = br#"{"RuntimeParameters":{"Mode":"CAWI"}}"#;
        assert_eq!(start_interview_case(body)?, None);
        Ok(())
    }

    #[test]
    fn start_interview_rejects_non_json() {
        assert!(start_interview_case(b"KeyValue=100001").is_err());
        assert!(start_interview_case(b"").is_err());
    }

    #[test]
    fn sub_path_collapses_empty_segments() {
        let canonical = SubPath::parse("api/application/start_interview");
        for variant in [
            "/api/application/start_interview",
            "api//application/./start_interview",
            "//api/application//start_interview",
        ] {
            assert_eq!(SubPath::parse(variant), canonical, "{variant}");
        }
        assert_eq!(SubPath::parse("a/../../dia2102a/x"), None);

        let Some(dir) = SubPath::parse("resources/js/") else {
            panic!("expected a path");
        };
        assert!(dir.trailing_slash());
        assert_eq!(dir.segments(), ["resources", "js"]);
    }

    #[test]
    fn start_interview_match_ignores_case_and_slashes() {
        for variant in [
            "api/application/start_interview",
            "API/Application/Start_Interview",
            "api/application/start_interview/",
            "/api//application/start_interview",
        ] {
            let sub_path = SubPath::parse(variant);
            assert!(
                sub_path.as_ref().is_some_and(SubPath::is_start_interview),
                "{variant}"
            );
        }
        let other = SubPath::parse("api/application/start_interview/extra");
        assert!(!other.as_ref().is_some_and(SubPath::is_start_interview));
        assert!(SubPath::parse("Api/x").as_ref().is_some_and(SubPath::is_api));
        assert!(!SubPath::parse("apis/x").as_ref().is_some_and(SubPath::is_api));
    }

    #[test]
    fn outbound_headers_strip_gateway_state() -> Result<()> {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("gateway.local"));
        inbound.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        inbound.insert(
            COOKIE,
            HeaderValue::from_static("surveygate_session=t.o.k; ASP.NET_SessionId=abc; surveygate_lang=cy"),
        );
        inbound.insert("x-request-id", HeaderValue::from_static("01J"));

        let peer: SocketAddr = "192.0.2.10:5000".parse()?;
        let outbound = outbound_headers(&inbound, Some(peer));

        assert!(outbound.get(HOST).is_none());
        assert!(outbound.get(CONNECTION).is_none());
        assert!(outbound.get(CONTENT_LENGTH).is_none());
        assert_eq!(
            outbound.get(COOKIE).and_then(|v| v.to_str().ok()),
            Some("ASP.NET_SessionId=abc")
        );
        assert_eq!(
            outbound.get("x-forwarded-for").and_then(|v| v.to_str().ok()),
            Some("192.0.2.10")
        );
        assert!(outbound.get("x-request-id").is_some());
        Ok(())
    }

    #[test]
    fn session_cookie_never_reaches_engine() {
        let only_ours = HeaderValue::from_static("surveygate_session=t.o.k");
        assert!(engine_cookies(&only_ours).is_none());
        assert!(SESSION_COOKIE_NAME.starts_with(GATEWAY_COOKIE_PREFIX));
    }
}
