//! Per-request error responses
//!
//! Handlers return these instead of building error responses inline. Bodies
//! are plain text; upstream details are logged, never echoed to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No authorization code received")]
    MissingCode,

    #[error("Error during token retrieval")]
    TokenRetrieval,

    #[error("Not authenticated: complete the /auth flow first")]
    NotAuthenticated,

    /// Upstream call failed. `action` reads like "creating invoice".
    #[error("Error {action}")]
    Upstream { action: &'static str },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::MissingCode => StatusCode::BAD_REQUEST,
            Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::TokenRetrieval | Error::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
