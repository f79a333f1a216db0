//! Requests under `/{instrument}/`, forwarded to the interview engine once
//! the claim's scope covers them.

mod open_case;
mod proxy;
pub mod scope;

pub use open_case::{SESSION_CHECK_SCRIPT, open_case};
pub use proxy::{START_INTERVIEW_PATH, proxy, start_interview_case};
pub(crate) use proxy::SubPath;

use super::auth::{GatewayError, session::logout_response};
use axum::{http::HeaderMap, response::Response};
use reqwest::Client;
use url::Url;

/// Request bodies larger than this are refused before forwarding.
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EngineProxy {
    base_url: Url,
    client: Client,
    inject_session_check: bool,
    body_limit: usize,
}

impl EngineProxy {
    #[must_use]
    pub fn new(base_url: Url, client: Client) -> Self {
        Self {
            base_url,
            client,
            inject_session_check: false,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_session_check(mut self, enabled: bool) -> Self {
        self.inject_session_check = enabled;
        self
    }

    #[must_use]
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// `{engine}/{instrument}/{path}`, keeping any base path prefix. Each
    /// segment is re-encoded.
    pub(crate) fn target(&self, instrument: &str, path: &SubPath) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                GatewayError::internal(format!("engine url cannot be a base: {}", self.base_url))
            })?;
            segments.pop_if_empty().push(instrument).extend(path.segments());
            if path.trailing_slash() {
                segments.push("");
            }
        }
        Ok(url)
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn inject_session_check(&self) -> bool {
        self.inject_session_check
    }

    pub(crate) fn body_limit(&self) -> usize {
        self.body_limit
    }
}

/// `GET /{instrument}/logout`
pub async fn logout(headers: HeaderMap) -> Response {
    logout_response(&headers)
}
