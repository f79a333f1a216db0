use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_BUS_URL: &str = "bus-url";
pub const ARG_BLAISE_REST_API_URL: &str = "blaise-rest-api-url";
pub const ARG_SERVERPARK: &str = "serverpark";
pub const ARG_CATI_URL: &str = "cati-url";
pub const ARG_HTTP_TIMEOUT_SECONDS: &str = "http-timeout-seconds";

/// Where the registry, the REST API and the interview engine live.
#[derive(Debug, Clone)]
pub struct Options {
    pub bus_url: String,
    pub blaise_rest_api_url: String,
    pub serverpark: String,
    pub cati_url: Url,
    pub http_timeout_seconds: u64,
}

impl Options {
    /// Parse upstream arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a URL is missing or does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_url = |id: &str| -> Result<Url> {
            let value = matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))?;
            Url::parse(value.trim()).with_context(|| format!("invalid --{id}: {value}"))
        };

        Ok(Self {
            bus_url: read_url(ARG_BUS_URL)?.to_string(),
            blaise_rest_api_url: read_url(ARG_BLAISE_REST_API_URL)?.to_string(),
            serverpark: matches
                .get_one::<String>(ARG_SERVERPARK)
                .cloned()
                .unwrap_or_else(|| "gusty".to_string()),
            cati_url: read_url(ARG_CATI_URL)?,
            http_timeout_seconds: matches
                .get_one::<u64>(ARG_HTTP_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BUS_URL)
                .long(ARG_BUS_URL)
                .help("Base URL of the UAC registry (bus) API")
                .env("SURVEYGATE_BUS_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_BLAISE_REST_API_URL)
                .long(ARG_BLAISE_REST_API_URL)
                .help("Base URL of the REST API serving case postcodes and instrument settings")
                .env("SURVEYGATE_BLAISE_REST_API_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SERVERPARK)
                .long(ARG_SERVERPARK)
                .help("Server park the instruments are installed on")
                .env("SURVEYGATE_SERVERPARK")
                .default_value("gusty"),
        )
        .arg(
            Arg::new(ARG_CATI_URL)
                .long(ARG_CATI_URL)
                .help("Base URL of the interview engine requests are forwarded to")
                .env("SURVEYGATE_CATI_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_HTTP_TIMEOUT_SECONDS)
                .long(ARG_HTTP_TIMEOUT_SECONDS)
                .help("Timeout for every outbound HTTP request, in seconds")
                .env("SURVEYGATE_HTTP_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
