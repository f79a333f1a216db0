pub mod auth;
pub mod instrument;

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Where a request came from, for audit logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RequestSource {
    pub ip: Option<String>,
    pub forwarded_for: Option<String>,
}

impl RequestSource {
    pub(crate) fn new(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self {
            ip: peer.map(|addr| addr.ip().to_string()),
            forwarded_for: first_forwarded_hop(headers),
        }
    }

    pub(crate) fn ip(&self) -> &str {
        self.ip.as_deref().unwrap_or("-")
    }

    pub(crate) fn forwarded_for(&self) -> &str {
        self.forwarded_for.as_deref().unwrap_or("-")
    }
}

/// First `x-forwarded-for` hop with line breaks removed.
fn first_forwarded_hop(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|hop| hop.replace(['\r', '\n'], ""))
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
}
