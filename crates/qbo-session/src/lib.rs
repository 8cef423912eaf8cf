//! Token lifecycle for a single QuickBooks company connection
//!
//! `Session` owns the one current access/refresh token pair together with
//! the realm-scoped API base URL. State starts as `Unauthenticated` and is
//! replaced wholesale by every successful exchange or refresh.
//!
//! Lifecycle:
//! 1. Callback handler calls `Session::exchange()` with the authorization code
//! 2. Resource handlers read `Session::bearer()` for each upstream call
//! 3. `spawn_refresh_task()` calls `Session::refresh()` on a timer
//! 4. A failed refresh leaves the previous pair in place

pub mod error;
pub mod refresh;
pub mod session;

pub use error::{Error, Result};
pub use refresh::{
    DEFAULT_REFRESH_INTERVAL, MAX_RETRY_DELAY, RefreshPolicy, jittered_delay, spawn_refresh_task,
};
pub use session::{Bearer, RefreshOutcome, Session, SessionState, TokenPair};
