//! Intuit OAuth2 client library
//!
//! Authorization URL construction, authorization-code exchange and token
//! refresh against the Intuit token endpoint. Holds no token state of its
//! own; `qbo-session` owns the current pair and calls into this crate.
//!
//! Credential flow:
//! 1. Browser is redirected to `authorize::build_authorization_url()`
//! 2. Intuit calls back with `code` and `realmId`
//! 3. `token::exchange_code()` trades the code for a token pair
//! 4. `token::refresh_token()` mints a fresh pair on a timer

pub mod authorize;
pub mod constants;
pub mod error;
pub mod settings;
pub mod token;

pub use authorize::build_authorization_url;
pub use constants::*;
pub use error::{Error, Result};
pub use settings::OAuthSettings;
pub use token::{TokenResponse, basic_credentials, exchange_code, refresh_token};
