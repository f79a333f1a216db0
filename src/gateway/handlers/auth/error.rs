//! Request-level failures and how each one is shown to the respondent.

use super::{state::UacKind, views};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

pub const EMPTY_CODE_MSG: &str = "Enter an access code";
pub const NOT_RECOGNISED_MSG: &str = "Access code not recognised. Enter the code again";
pub const POSTCODE_MISMATCH_MSG: &str = "Postcode not recognised, please try again";
pub const LOCKED_OUT_MSG: &str =
    "This uac is currently locked due to repeated failed postcode attempts";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("empty access code")]
    EmptyCode,
    #[error("access code is not {} characters", .0.code_length())]
    InvalidLength(UacKind),
    #[error("access code not recognised")]
    CodeNotRecognized,
    #[error("access code locked after repeated postcode attempts")]
    LockedOut,
    #[error("postcode mismatch")]
    PostcodeMismatch,
    #[error("no valid session")]
    Unauthenticated,
    #[error("outside the authorised scope")]
    Forbidden,
    #[error("instrument unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub(crate) fn internal(cause: impl std::fmt::Display) -> Self {
        Self::Internal(cause.to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyCode
            | Self::InvalidLength(_)
            | Self::CodeNotRecognized
            | Self::LockedOut
            | Self::PostcodeMismatch
            | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Corrective message shown on the login or postcode form, if any.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::EmptyCode => Some(EMPTY_CODE_MSG.to_string()),
            Self::InvalidLength(kind) => {
                Some(format!("Enter a {}-character access code", kind.code_length()))
            }
            Self::CodeNotRecognized => Some(NOT_RECOGNISED_MSG.to_string()),
            Self::LockedOut => Some(LOCKED_OUT_MSG.to_string()),
            Self::PostcodeMismatch => Some(POSTCODE_MISMATCH_MSG.to_string()),
            _ => None,
        }
    }

    /// Render with the deployment's code kind and the respondent's locale.
    pub(crate) fn render(self, kind: UacKind, welsh: bool) -> Response {
        let status = self.status();
        let message = self.user_message();
        let body = match self {
            Self::PostcodeMismatch => views::postcode_page(welsh, message.as_deref()),
            Self::EmptyCode
            | Self::InvalidLength(_)
            | Self::CodeNotRecognized
            | Self::LockedOut
            | Self::Unauthenticated => views::login_page(kind, welsh, message.as_deref()),
            Self::Forbidden => views::access_denied_page(),
            Self::Unavailable(cause) => {
                warn!(%cause, "instrument unavailable");
                views::unavailable_page()
            }
            Self::Internal(cause) => {
                error!(%cause, "request failed");
                views::server_error_page()
            }
        };
        (status, Html(body)).into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.render(UacKind::default(), false)
    }
}
