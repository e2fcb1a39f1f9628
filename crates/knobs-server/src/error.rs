//! HTTP error types for the `knobs` server.
//!
//! Maps settings outcomes into HTTP responses. Every error renders a short
//! HTML page, since the only clients are browsers submitting forms.

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};

use knobs_core::block::UpdateOutcome;
use knobs_core::html::escape;

/// Application-level error returned from HTTP handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// The fallback password or the login credentials were wrong.
    Unauthorized(String),
    /// No valid session; send the client to the login page.
    LoginRequired { redirect: String },
    /// Requested page not found.
    NotFound(String),
    /// Submitted values failed validation and were not saved.
    Unprocessable(String),
    /// Internal server error.
    Internal(String),
}

impl AppError {
    /// The error for a write that did not persist, or `None` on success.
    pub fn from_outcome(outcome: UpdateOutcome) -> Option<Self> {
        match outcome {
            UpdateOutcome::Persisted => None,
            UpdateOutcome::WrongPassword => Some(Self::Unauthorized("Wrong password".to_owned())),
            UpdateOutcome::Denied { redirect } => Some(Self::LoginRequired { redirect }),
            UpdateOutcome::SanityFailed => Some(Self::Unprocessable(
                "Values rejected by sanity check, not saved".to_owned(),
            )),
            UpdateOutcome::SaveFailed { reason } => {
                Some(Self::Internal(format!("Saving settings failed: {reason}")))
            }
        }
    }
}

/// `302 Found` to `location`.
pub fn found(location: impl Into<String>) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.into())]).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::LoginRequired { redirect } => {
                return found(redirect);
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = format!(
            "<h3>{}</h3><p><a href='/'>Back</a></p>\n",
            escape(&message)
        );
        (status, Html(body)).into_response()
    }
}
