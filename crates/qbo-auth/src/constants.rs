//! Intuit OAuth and API endpoints

use std::time::Duration;

/// Consent page the browser is redirected to
pub const AUTHORIZE_ENDPOINT: &str = "https://appcenter.intuit.com/connect/oauth2";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// Sandbox accounting API root. Company resources live under `/v3/company/{realmId}`.
pub const SANDBOX_API_BASE: &str = "https://sandbox-quickbooks.api.intuit.com";

/// Scope granting access to the accounting API
pub const ACCOUNTING_SCOPE: &str = "com.intuit.quickbooks.accounting";

/// Upper bound on a single token endpoint call
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque `state` value echoed back on the callback
pub const DEFAULT_STATE: &str = "demo-app";
