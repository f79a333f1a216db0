use super::{
    Error, InstrumentSettings, PostcodeLookup, SettingsBlock, SettingsProvider, UpstreamFuture,
    endpoint_url,
};
use reqwest::{Client, StatusCode, header::ACCEPT};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

/// HTTP client for the survey data REST API, scoped to one server park.
#[derive(Debug, Clone)]
pub struct BlaiseRestApi {
    base_url: String,
    serverpark: String,
    client: Client,
}

impl BlaiseRestApi {
    #[must_use]
    pub fn new(base_url: String, serverpark: String, client: Client) -> Self {
        Self {
            base_url,
            serverpark,
            client,
        }
    }

    fn instrument_path(&self, instrument: &str) -> String {
        format!(
            "/api/v1/serverparks/{}/instruments/{instrument}",
            self.serverpark
        )
    }

    /// GET a JSON document, mapping 404 to `not_found`.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, not_found: Error) -> Result<T, Error> {
        let url = endpoint_url(&self.base_url, path)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        debug!(%status, path, "data service responded");

        if status == StatusCode::NOT_FOUND {
            return Err(not_found);
        }
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| {
            warn!(path, %status, "unexpected response body: {err}");
            Error::Decode(err.to_string())
        })
    }

    #[instrument(skip(self))]
    async fn fetch_postcode(&self, instrument: &str, case_id: &str) -> Result<String, Error> {
        let path = format!("{}/cases/{case_id}/postcode", self.instrument_path(instrument));
        self.get_json(&path, Error::CaseNotFound).await
    }

    #[instrument(skip(self))]
    async fn fetch_settings(&self, instrument: &str) -> Result<InstrumentSettings, Error> {
        let path = format!("{}/settings", self.instrument_path(instrument));
        let blocks: Vec<SettingsBlock> = self.get_json(&path, Error::InstrumentNotInstalled).await?;
        Ok(InstrumentSettings { blocks })
    }
}

impl PostcodeLookup for BlaiseRestApi {
    fn postcode<'a>(
        &'a self,
        instrument: &'a str,
        case_id: &'a str,
    ) -> UpstreamFuture<'a, String> {
        Box::pin(self.fetch_postcode(instrument, case_id))
    }
}

impl SettingsProvider for BlaiseRestApi {
    fn settings<'a>(&'a self, instrument: &'a str) -> UpstreamFuture<'a, InstrumentSettings> {
        Box::pin(self.fetch_settings(instrument))
    }
}
