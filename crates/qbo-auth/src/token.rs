//! OAuth token exchange and refresh
//!
//! Both operations POST a form to the token endpoint, authenticated with
//! HTTP Basic credentials built from the client id and secret:
//! 1. Authorization code exchange (`grant_type=authorization_code`)
//! 2. Token refresh (`grant_type=refresh_token`)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::OAuthSettings;

/// Response from the token endpoint for both exchange and refresh.
///
/// Intuit returns lifetimes as deltas in seconds. They are optional here
/// so that minimal responses still parse.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Seconds until the refresh token expires
    #[serde(default)]
    pub x_refresh_token_expires_in: Option<u64>,
}

/// `Basic base64(client_id:client_secret)` header value.
pub fn basic_credentials(client_id: &str, client_secret: &Secret<String>) -> String {
    let raw = format!("{client_id}:{}", client_secret.expose());
    format!("Basic {}", STANDARD.encode(raw))
}

/// Exchange an authorization code for a token pair.
pub async fn exchange_code(
    client: &reqwest::Client,
    settings: &OAuthSettings,
    code: &str,
) -> Result<TokenResponse> {
    debug!(token_url = %settings.token_url, "exchanging authorization code");
    let response = client
        .post(&settings.token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(settings.timeout)
        .header(
            reqwest::header::AUTHORIZATION,
            basic_credentials(&settings.client_id, &settings.client_secret),
        )
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", settings.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Mint a new token pair from a refresh token.
///
/// Intuit rotates refresh tokens, so the caller must store the returned
/// `refresh_token` in place of the one it sent.
pub async fn refresh_token(
    client: &reqwest::Client,
    settings: &OAuthSettings,
    refresh: &str,
) -> Result<TokenResponse> {
    debug!(token_url = %settings.token_url, "refreshing access token");
    let response = client
        .post(&settings.token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(settings.timeout)
        .header(
            reqwest::header::AUTHORIZATION,
            basic_credentials(&settings.client_id, &settings.client_secret),
        )
        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403, or 400 invalid_grant, means the refresh token is revoked or expired
        if status.as_u16() == 401
            || status.as_u16() == 403
            || (status.as_u16() == 400 && body.contains("invalid_grant"))
        {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
