use super::{CredentialResolver, Error, UacRecord, UpstreamFuture, endpoint_url};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument};

const UAC_PATH: &str = "/uacs/uac";
const POSTCODE_ATTEMPTS_PATH: &str = "/uacs/uac/postcode/attempts";

#[derive(Serialize)]
struct UacRequest<'a> {
    uac: &'a str,
}

/// HTTP client for the UAC registry.
#[derive(Debug, Clone)]
pub struct BusApi {
    base_url: String,
    client: Client,
}

impl BusApi {
    #[must_use]
    pub fn new(base_url: String, client: Client) -> Self {
        Self { base_url, client }
    }

    #[instrument(skip(self, uac))]
    async fn call(&self, method: Method, path: &str, uac: &str) -> Result<UacRecord, Error> {
        let url = endpoint_url(&self.base_url, path)?;
        let response = self
            .client
            .request(method, url)
            .json(&UacRequest { uac })
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "registry responded");

        if status == StatusCode::NOT_FOUND {
            return Ok(UacRecord::default());
        }
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| Error::Decode(err.to_string()))
    }
}

impl CredentialResolver for BusApi {
    fn resolve<'a>(&'a self, uac: &'a str) -> UpstreamFuture<'a, UacRecord> {
        Box::pin(self.call(Method::POST, UAC_PATH, uac))
    }

    fn increment_postcode_attempts<'a>(&'a self, uac: &'a str) -> UpstreamFuture<'a, UacRecord> {
        Box::pin(self.call(Method::POST, POSTCODE_ATTEMPTS_PATH, uac))
    }

    fn reset_postcode_attempts<'a>(&'a self, uac: &'a str) -> UpstreamFuture<'a, UacRecord> {
        Box::pin(self.call(Method::DELETE, POSTCODE_ATTEMPTS_PATH, uac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        Json, Router,
        http::StatusCode as AxumStatus,
        response::{IntoResponse, Response},
        routing::post,
    };
    use serde_json::{Value, json};
    use std::time::Duration;

    async fn lookup(Json(body): Json<Value>) -> Response {
        match body["uac"].as_str() {
            Some("123456789012") => Json(json!({
                "instrument_name": "dia2101a",
                "case_id": "100001",
                "postcode_attempts": 0
            }))
            .into_response(),
            Some("500000000000") => AxumStatus::BAD_GATEWAY.into_response(),
            Some("garbled00000") => "not json".into_response(),
            _ => AxumStatus::NOT_FOUND.into_response(),
        }
    }

    async fn increment(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({
            "instrument_name": "dia2101a",
            "case_id": "100001",
            "postcode_attempts": 1,
            "postcode_attempt_timestamp": "2024-03-01 09:30:00 +0000 UTC",
            "echo": body["uac"]
        }))
    }

    async fn reset() -> Json<Value> {
        Json(json!({"instrument_name": "dia2101a", "case_id": "100001", "postcode_attempts": 0}))
    }

    async fn spawn_registry() -> Result<String> {
        let app = Router::new()
            .route(UAC_PATH, post(lookup))
            .route(POSTCODE_ATTEMPTS_PATH, post(increment).delete(reset));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{addr}"))
    }

    async fn bus() -> Result<BusApi> {
        let client = super::super::http_client(Duration::from_secs(5))?;
        Ok(BusApi::new(spawn_registry().await?, client))
    }

    #[tokio::test]
    async fn resolves_known_code() -> Result<()> {
        let record = bus().await?.resolve("123456789012").await?;
        assert_eq!(record.instrument, "dia2101a");
        assert_eq!(record.case_id, "100001");
        assert!(record.is_valid_target());
        Ok(())
    }

    #[tokio::test]
    async fn not_found_is_an_empty_record() -> Result<()> {
        let record = bus().await?.resolve("999999999999").await?;
        assert_eq!(record, UacRecord::default());
        assert!(!record.is_valid_target());
        Ok(())
    }

    #[tokio::test]
    async fn other_failures_are_errors() -> Result<()> {
        let bus = bus().await?;
        assert!(matches!(
            bus.resolve("500000000000").await,
            Err(Error::Status(status)) if status == StatusCode::BAD_GATEWAY
        ));
        assert!(matches!(bus.resolve("garbled00000").await, Err(Error::Decode(_))));
        Ok(())
    }

    #[tokio::test]
    async fn increments_and_resets_attempts() -> Result<()> {
        let bus = bus().await?;
        let record = bus.increment_postcode_attempts("123456789012").await?;
        assert_eq!(record.postcode_attempt_count, 1);
        assert!(record.postcode_attempt_timestamp.is_some());

        let record = bus.reset_postcode_attempts("123456789012").await?;
        assert_eq!(record.postcode_attempt_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_registry_is_transport_error() -> Result<()> {
        let client = super::super::http_client(Duration::from_secs(1))?;
        let bus = BusApi::new("http://127.0.0.1:1".to_string(), client);
        assert!(matches!(bus.resolve("123456789012").await, Err(Error::Transport(_))));
        Ok(())
    }
}
