//! Authorization URL construction
//!
//! The browser is sent to Intuit's consent page with the client id, the
//! requested scope, the registered redirect URI and an opaque state value.
//! Intuit later redirects back to `redirect_uri?code=...&realmId=...&state=...`.

use crate::settings::OAuthSettings;

/// Build the full authorization URL for the configured client.
pub fn build_authorization_url(settings: &OAuthSettings) -> String {
    format!(
        "{}?client_id={}&response_type=code&scope={}&redirect_uri={}&state={}",
        settings.authorize_url,
        encode(&settings.client_id),
        encode(&settings.scope),
        encode(&settings.redirect_uri),
        encode(&settings.state),
    )
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
