use crate::{
    claims::DEFAULT_ISSUER,
    gateway::handlers::{
        auth::{DEFAULT_AUTH_TIMEOUT_MINUTES, DEFAULT_SESSION_MAX_AGE_SECONDS, UacKind},
        instrument::DEFAULT_BODY_LIMIT,
    },
};
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_JWT_ISSUER: &str = "jwt-issuer";
pub const ARG_UAC_KIND: &str = "uac-kind";
pub const ARG_POSTCODE_GATE: &str = "postcode-gate";
pub const ARG_DEFAULT_AUTH_TIMEOUT_MINUTES: &str = "default-auth-timeout-minutes";
pub const ARG_SESSION_MAX_AGE_SECONDS: &str = "session-max-age-seconds";
pub const ARG_INJECT_SESSION_CHECK: &str = "inject-session-check";
pub const ARG_BODY_LIMIT_BYTES: &str = "body-limit-bytes";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub uac_kind: UacKind,
    pub postcode_gate: bool,
    pub default_auth_timeout_minutes: i64,
    pub session_max_age_seconds: i64,
    pub inject_session_check: bool,
    pub body_limit_bytes: usize,
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            jwt_issuer: matches
                .get_one::<String>(ARG_JWT_ISSUER)
                .cloned()
                .unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            uac_kind: matches
                .get_one::<UacKind>(ARG_UAC_KIND)
                .copied()
                .unwrap_or_default(),
            postcode_gate: matches.get_flag(ARG_POSTCODE_GATE),
            default_auth_timeout_minutes: matches
                .get_one::<i64>(ARG_DEFAULT_AUTH_TIMEOUT_MINUTES)
                .copied()
                .unwrap_or(DEFAULT_AUTH_TIMEOUT_MINUTES),
            session_max_age_seconds: matches
                .get_one::<i64>(ARG_SESSION_MAX_AGE_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_SESSION_MAX_AGE_SECONDS),
            inject_session_check: matches.get_flag(ARG_INJECT_SESSION_CHECK),
            body_limit_bytes: matches
                .get_one::<usize>(ARG_BODY_LIMIT_BYTES)
                .copied()
                .unwrap_or(DEFAULT_BODY_LIMIT),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign session claims (HS256)")
                .env("SURVEYGATE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_ISSUER)
                .long(ARG_JWT_ISSUER)
                .help("Issuer written to and required in session claims")
                .env("SURVEYGATE_JWT_ISSUER")
                .default_value(DEFAULT_ISSUER),
        )
        .arg(
            Arg::new(ARG_UAC_KIND)
                .long(ARG_UAC_KIND)
                .help("Access code format: uac (12 digits) or uac16 (16 characters)")
                .env("SURVEYGATE_UAC_KIND")
                .default_value("uac")
                .value_parser(|value: &str| value.parse::<UacKind>()),
        )
        .arg(
            Arg::new(ARG_POSTCODE_GATE)
                .long(ARG_POSTCODE_GATE)
                .help("Require the case postcode after the access code")
                .env("SURVEYGATE_POSTCODE_GATE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_DEFAULT_AUTH_TIMEOUT_MINUTES)
                .long(ARG_DEFAULT_AUTH_TIMEOUT_MINUTES)
                .help("Session timeout when the instrument settings do not give one")
                .env("SURVEYGATE_DEFAULT_AUTH_TIMEOUT_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_MAX_AGE_SECONDS)
                .long(ARG_SESSION_MAX_AGE_SECONDS)
                .help("Max-Age of the session cookie in seconds")
                .env("SURVEYGATE_SESSION_MAX_AGE_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_INJECT_SESSION_CHECK)
                .long(ARG_INJECT_SESSION_CHECK)
                .help("Add the session check script to opened case pages")
                .env("SURVEYGATE_INJECT_SESSION_CHECK")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_BODY_LIMIT_BYTES)
                .long(ARG_BODY_LIMIT_BYTES)
                .help("Largest request body forwarded to the interview engine")
                .env("SURVEYGATE_BODY_LIMIT_BYTES")
                .default_value("10485760")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults() -> Result<()> {
        let matches = with_args(Command::new("surveygate"))
            .try_get_matches_from(["surveygate", "--jwt-secret", "s3cret"])?;
        let options = Options::parse(&matches)?;
        assert_eq!(options.jwt_secret.expose_secret(), "s3cret");
        assert_eq!(options.jwt_issuer, DEFAULT_ISSUER);
        assert_eq!(options.uac_kind, UacKind::Uac);
        assert!(!options.postcode_gate);
        assert_eq!(options.default_auth_timeout_minutes, 15);
        assert_eq!(options.session_max_age_seconds, 86400);
        assert!(!options.inject_session_check);
        assert_eq!(options.body_limit_bytes, DEFAULT_BODY_LIMIT);
        Ok(())
    }

    #[test]
    fn uac16_and_gate_from_env() {
        temp_env::with_vars(
            [
                ("SURVEYGATE_JWT_SECRET", Some("s3cret")),
                ("SURVEYGATE_UAC_KIND", Some("UAC16")),
                ("SURVEYGATE_POSTCODE_GATE", Some("true")),
            ],
            || {
                let matches = with_args(Command::new("surveygate")).get_matches_from(["surveygate"]);
                let options = Options::parse(&matches);
                assert!(options.is_ok());
                if let Ok(options) = options {
                    assert_eq!(options.uac_kind, UacKind::Uac16);
                    assert!(options.postcode_gate);
                }
            },
        );
    }

    #[test]
    fn unknown_uac_kind_is_refused() {
        let result = with_args(Command::new("surveygate")).try_get_matches_from([
            "surveygate",
            "--jwt-secret",
            "s3cret",
            "--uac-kind",
            "uac8",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn blank_secret_is_refused() -> Result<()> {
        let matches = with_args(Command::new("surveygate"))
            .try_get_matches_from(["surveygate", "--jwt-secret", "  "])?;
        assert!(Options::parse(&matches).is_err());
        Ok(())
    }
}
