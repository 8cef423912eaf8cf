//! Client registration used for every token endpoint call

use std::time::Duration;

use common::Secret;

use crate::constants::{
    ACCOUNTING_SCOPE, AUTHORIZE_ENDPOINT, DEFAULT_STATE, DEFAULT_TOKEN_TIMEOUT, TOKEN_ENDPOINT,
};

/// OAuth client registration plus the endpoints it talks to.
///
/// The endpoints default to Intuit's production OAuth hosts; tests point
/// `token_url` at a local stub.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Per-request timeout for token endpoint calls
    pub timeout: Duration,
}

impl OAuthSettings {
    /// Settings for the Intuit endpoints with the accounting scope.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            scope: ACCOUNTING_SCOPE.to_string(),
            state: DEFAULT_STATE.to_string(),
            authorize_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    /// Override the token endpoint timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
