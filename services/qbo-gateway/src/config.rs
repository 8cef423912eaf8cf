//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The config file is
//! optional; a bare `.env` with `CLIENT_ID`, `CLIENT_SECRET` and
//! `REDIRECT_URI` is enough to run. The client secret is only read from
//! the environment, never from the TOML file.

use common::Secret;
use qbo_auth::{
    ACCOUNTING_SCOPE, AUTHORIZE_ENDPOINT, DEFAULT_STATE, OAuthSettings, SANDBOX_API_BASE,
    TOKEN_ENDPOINT,
};
use qbo_session::{MAX_RETRY_DELAY, RefreshPolicy};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "qbo-gateway.toml";

/// Upper bound for any configured duration (30 days)
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// OAuth client registration
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

/// Accounting API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Answer 401 locally when no token is held instead of forwarding
    /// with an empty bearer.
    #[serde(default)]
    pub require_token: bool,
}

/// Which refresh schedule to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Fixed,
    ExpiryAware,
}

/// Background refresh settings
#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_threshold")]
    pub threshold_secs: u64,
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_max_connections() -> usize {
    1000
}

fn default_scope() -> String {
    ACCOUNTING_SCOPE.to_string()
}

fn default_state() -> String {
    DEFAULT_STATE.to_string()
}

fn default_authorize_url() -> String {
    AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_url() -> String {
    TOKEN_ENDPOINT.to_string()
}

fn default_api_base() -> String {
    SANDBOX_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_check_interval() -> u64 {
    60
}

fn default_threshold() -> u64 {
    300
}

fn default_retry_base() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scope: default_scope(),
            state: default_state(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_secs: default_timeout(),
            require_token: false,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            interval_secs: default_refresh_interval(),
            check_interval_secs: default_check_interval(),
            threshold_secs: default_threshold(),
            retry_base_secs: default_retry_base(),
            max_retries: default_max_retries(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, overlay the process
    /// environment, then validate.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as `load` with an explicit environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> common::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables onto file/default values.
    ///
    /// `PORT` replaces only the port of `listen_addr`.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> common::Result<()> {
        if let Some(port) = env("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| common::Error::Config(format!("invalid PORT {port:?}: {e}")))?;
            self.server.listen_addr.set_port(port);
        }
        if let Some(id) = env("CLIENT_ID") {
            self.oauth.client_id = Some(id);
        }
        if let Some(secret) = env("CLIENT_SECRET") {
            self.oauth.client_secret = Some(Secret::new(secret));
        }
        if let Some(uri) = env("REDIRECT_URI") {
            self.oauth.redirect_uri = Some(uri);
        }
        if let Some(base) = env("API_BASE_URL") {
            self.api.base_url = base;
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        match &self.oauth.client_id {
            Some(id) if !id.is_empty() => {}
            _ => return Err(common::Error::MissingSetting("CLIENT_ID")),
        }
        match &self.oauth.client_secret {
            Some(secret) if !secret.is_empty() => {}
            _ => return Err(common::Error::MissingSetting("CLIENT_SECRET")),
        }
        match &self.oauth.redirect_uri {
            Some(uri) if !uri.is_empty() => require_http("redirect_uri", uri)?,
            _ => return Err(common::Error::MissingSetting("REDIRECT_URI")),
        }
        require_http("authorize_url", &self.oauth.authorize_url)?;
        require_http("token_url", &self.oauth.token_url)?;
        require_http("api.base_url", &self.api.base_url)?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.refresh.interval_secs == 0 || self.refresh.check_interval_secs == 0 {
            return Err(common::Error::Config(
                "refresh intervals must be greater than 0".into(),
            ));
        }

        let bounded = [
            ("api.timeout_secs", self.api.timeout_secs),
            ("refresh.interval_secs", self.refresh.interval_secs),
            ("refresh.check_interval_secs", self.refresh.check_interval_secs),
            ("refresh.threshold_secs", self.refresh.threshold_secs),
        ];
        for (field, secs) in bounded {
            if secs > MAX_DURATION_SECS {
                return Err(common::Error::Config(format!(
                    "{field} must be at most {MAX_DURATION_SECS}, got: {secs}"
                )));
            }
        }
        if self.refresh.retry_base_secs > MAX_RETRY_DELAY.as_secs() {
            return Err(common::Error::Config(format!(
                "refresh.retry_base_secs must be at most {}, got: {}",
                MAX_RETRY_DELAY.as_secs(),
                self.refresh.retry_base_secs
            )));
        }
        Ok(())
    }

    /// OAuth settings for the session. Only valid after `validate()`.
    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.oauth.client_id.clone().unwrap_or_default(),
            client_secret: self
                .oauth
                .client_secret
                .clone()
                .unwrap_or_else(|| Secret::new(String::new())),
            redirect_uri: self.oauth.redirect_uri.clone().unwrap_or_default(),
            scope: self.oauth.scope.clone(),
            state: self.oauth.state.clone(),
            authorize_url: self.oauth.authorize_url.clone(),
            token_url: self.oauth.token_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        let r = &self.refresh;
        match r.policy {
            PolicyKind::Fixed => RefreshPolicy::Fixed {
                interval: Duration::from_secs(r.interval_secs),
            },
            PolicyKind::ExpiryAware => RefreshPolicy::ExpiryAware {
                check_interval: Duration::from_secs(r.check_interval_secs),
                threshold: Duration::from_secs(r.threshold_secs),
                retry_base: Duration::from_secs(r.retry_base_secs),
                max_retries: r.max_retries,
            },
        }
    }

    /// Resolve the config file: CLI arg, then CONFIG_PATH, then
    /// `qbo-gateway.toml` if it exists in the working directory.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }
}

fn require_http(field: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}
