//! Session state and the exchange/refresh operations
//!
//! Readers take a short read lock and clone what they need, so a request
//! never waits on a token endpoint call. Writers (exchange and refresh)
//! hold `writer` across the network call and then swap the whole state
//! under the write lock, which keeps them from interleaving.

use std::time::Duration;

use common::Secret;
use qbo_auth::{OAuthSettings, TokenResponse};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// The current access/refresh credential pair.
///
/// Deadlines are absolute, computed from the `expires_in` deltas when the
/// platform returns them.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub access_expires_at: Option<Instant>,
    pub refresh_expires_at: Option<Instant>,
}

impl TokenPair {
    fn from_response(response: TokenResponse, now: Instant) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            access_expires_at: response
                .expires_in
                .and_then(|secs| now.checked_add(Duration::from_secs(secs))),
            refresh_expires_at: response
                .x_refresh_token_expires_in
                .and_then(|secs| now.checked_add(Duration::from_secs(secs))),
        }
    }
}

/// Connection state.
///
/// Transitions:
/// - Unauthenticated → Authenticated (code exchange)
/// - Authenticated → Authenticated (refresh or re-exchange, pair replaced)
#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    Authenticated {
        tokens: TokenPair,
        realm_id: String,
        base_url: String,
        obtained_at: Instant,
    },
}

impl SessionState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated { .. } => "authenticated",
        }
    }
}

/// What a resource call needs: the access token and where to send it.
#[derive(Debug, Clone)]
pub struct Bearer {
    pub access_token: Secret<String>,
    pub base_url: String,
}

/// Result of a refresh attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No refresh token is held yet; nothing was sent.
    Skipped,
    /// A new pair replaced the old one.
    Refreshed,
}

/// Owner of the single current token pair.
pub struct Session {
    settings: OAuthSettings,
    api_base: String,
    http_client: reqwest::Client,
    state: RwLock<SessionState>,
    writer: Mutex<()>,
}

impl Session {
    /// Create an unauthenticated session.
    ///
    /// `api_base` is the accounting API root (e.g. the sandbox host); the
    /// realm-scoped base URL is derived from it on exchange.
    pub fn new(
        settings: OAuthSettings,
        api_base: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http_client,
            state: RwLock::new(SessionState::Unauthenticated),
            writer: Mutex::new(()),
        }
    }

    /// OAuth settings this session authenticates with.
    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// URL the browser should be redirected to for consent.
    pub fn authorization_url(&self) -> String {
        qbo_auth::build_authorization_url(&self.settings)
    }

    /// Company-scoped base URL for a realm.
    pub fn company_url(&self, realm_id: &str) -> String {
        format!("{}/v3/company/{realm_id}", self.api_base)
    }

    /// Exchange an authorization code and make the returned pair current.
    ///
    /// A missing or empty code is rejected before any network call. On
    /// failure the previous state, if any, is left untouched.
    pub async fn exchange(&self, code: Option<&str>, realm_id: &str) -> Result<TokenPair> {
        let code = match code {
            Some(c) if !c.is_empty() => c,
            _ => return Err(Error::MissingCode),
        };
        if realm_id.is_empty() {
            warn!("callback carried no realmId, company URL will be unscoped");
        }

        let _writer = self.writer.lock().await;

        let response = qbo_auth::exchange_code(&self.http_client, &self.settings, code)
            .await
            .map_err(|e| Error::AuthExchange(e.to_string()))?;

        let now = Instant::now();
        let tokens = TokenPair::from_response(response, now);
        let base_url = self.company_url(realm_id);

        *self.state.write().await = SessionState::Authenticated {
            tokens: tokens.clone(),
            realm_id: realm_id.to_string(),
            base_url,
            obtained_at: now,
        };

        info!(realm_id, "authorization code exchanged, session authenticated");
        Ok(tokens)
    }

    /// Replace the current pair using the held refresh token.
    ///
    /// With no refresh token held this is a no-op that sends nothing.
    /// Failures leave the old pair in place.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let _writer = self.writer.lock().await;

        let refresh = match &*self.state.read().await {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { tokens, .. } => Some(tokens.refresh_token.clone()),
        };
        let Some(refresh) = refresh else {
            warn!("no refresh token available, skipping refresh");
            return Ok(RefreshOutcome::Skipped);
        };

        let response =
            match qbo_auth::refresh_token(&self.http_client, &self.settings, refresh.expose())
                .await
            {
                Ok(r) => r,
                Err(qbo_auth::Error::InvalidCredentials(msg)) => {
                    return Err(Error::RefreshRejected(msg));
                }
                Err(e) => return Err(Error::RefreshFailed(e.to_string())),
            };

        let now = Instant::now();
        let mut state = self.state.write().await;
        if let SessionState::Authenticated {
            tokens,
            obtained_at,
            ..
        } = &mut *state
        {
            *tokens = TokenPair::from_response(response, now);
            *obtained_at = now;
        }

        info!("access token refreshed");
        Ok(RefreshOutcome::Refreshed)
    }

    /// Snapshot of the current bearer, or `None` before the first exchange.
    pub async fn bearer(&self) -> Option<Bearer> {
        match &*self.state.read().await {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated {
                tokens, base_url, ..
            } => Some(Bearer {
                access_token: tokens.access_token.clone(),
                base_url: base_url.clone(),
            }),
        }
    }

    /// Clone of the whole state.
    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// True when authenticated and the access token expires within
    /// `threshold`. A pair without a known lifetime always qualifies.
    pub async fn expires_within(&self, threshold: Duration) -> bool {
        match &*self.state.read().await {
            SessionState::Unauthenticated => false,
            SessionState::Authenticated { tokens, .. } => match tokens.access_expires_at {
                Some(deadline) => Instant::now()
                    .checked_add(threshold)
                    .is_none_or(|horizon| deadline <= horizon),
                None => true,
            },
        }
    }

    /// Session summary for the health endpoint. Never includes tokens.
    pub async fn health(&self) -> serde_json::Value {
        let state = self.state.read().await;
        match &*state {
            SessionState::Unauthenticated => serde_json::json!({
                "status": state.label(),
            }),
            SessionState::Authenticated {
                tokens,
                realm_id,
                obtained_at,
                ..
            } => {
                let now = Instant::now();
                let expires_in = tokens
                    .access_expires_at
                    .map(|d| d.saturating_duration_since(now).as_secs());
                serde_json::json!({
                    "status": state.label(),
                    "realm_id": realm_id,
                    "token_age_seconds": now.duration_since(*obtained_at).as_secs(),
                    "access_expires_in_seconds": expires_in,
                })
            }
        }
    }
}
