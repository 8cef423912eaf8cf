//! QuickBooks OAuth gateway
//!
//! Single-binary service that:
//! 1. Sends the browser through Intuit's OAuth consent flow
//! 2. Exchanges the callback code for an access/refresh token pair
//! 3. Refreshes the pair in the background
//! 4. Forwards fixed accounting requests with the current bearer token

mod config;
mod error;
mod metrics;
mod payloads;
mod proxy;
mod routes;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use qbo_session::{Session, spawn_refresh_task};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::proxy::ProxyState;

/// Time allowed for in-flight requests to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    proxy: ProxyState,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    routes::router()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real env vars still apply
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting qbo-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(p) => info!(path = %p.display(), "loading configuration"),
        None => info!("no config file, using environment and defaults"),
    }

    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    let refresh_policy = config.refresh_policy();

    info!(
        listen_addr = %config.server.listen_addr,
        api_base = %config.api.base_url,
        require_token = config.api.require_token,
        ?refresh_policy,
        "configuration loaded"
    );

    let http_client = reqwest::Client::new();
    let session = Arc::new(Session::new(
        config.oauth_settings(),
        config.api.base_url.clone(),
        http_client.clone(),
    ));

    let refresh_task = spawn_refresh_task(session.clone(), refresh_policy);

    let app_state = AppState {
        proxy: ProxyState {
            client: http_client,
            session,
            timeout: Duration::from_secs(config.api.timeout_secs),
            require_token: config.api.require_token,
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
        },
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests, visit /auth to connect a company");

    // The drain timeout starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    refresh_task.abort();
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: session status, uptime and request counters.
///
/// Always 200. An unauthenticated session is a normal state that waits
/// for someone to visit /auth.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.proxy.session.health().await;
    let authenticated = session["status"] == "authenticated";
    let status = if authenticated {
        "healthy"
    } else {
        "awaiting_authorization"
    };

    axum::Json(serde_json::json!({
        "status": status,
        "authenticated": authenticated,
        "session": session,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "requests_served": state.proxy.requests_total.load(Ordering::Relaxed),
        "errors_total": state.proxy.errors_total.load(Ordering::Relaxed),
    }))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode};
    use common::Secret;
    use qbo_auth::OAuthSettings;
    use std::sync::atomic::AtomicUsize;
    use tower::ServiceExt;

    /// Stub token endpoint issuing `a{n}`/`r{n}` on the n-th call.
    async fn start_token_stub(fail: bool) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new().route(
            "/token",
            axum::routing::post(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if fail {
                        return (
                            StatusCode::BAD_REQUEST,
                            axum::Json(serde_json::json!({"error": "invalid_grant"})),
                        );
                    }
                    (
                        StatusCode::OK,
                        axum::Json(serde_json::json!({
                            "access_token": format!("a{n}"),
                            "refresh_token": format!("r{n}"),
                        })),
                    )
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/token"), calls)
    }

    /// Stub accounting API. Echoes method, path, headers and body as JSON,
    /// and answers 401 when the bearer token is empty.
    async fn start_api_stub() -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new().fallback(move |request: Request<Body>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let headers: &HeaderMap = request.headers();
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string()
                };
                let authorization = header("authorization");
                let content_type = header("content-type");
                let token = authorization.trim_start_matches("Bearer").trim().to_string();
                let method = request.method().to_string();
                let path = request.uri().path().to_string();
                let body_bytes = axum::body::to_bytes(request.into_body(), 1024 * 1024)
                    .await
                    .unwrap();

                if token.is_empty() {
                    return (
                        StatusCode::UNAUTHORIZED,
                        axum::Json(serde_json::json!({"fault": "AuthenticationFailed"})),
                    );
                }
                let body: serde_json::Value =
                    serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);
                (
                    StatusCode::OK,
                    axum::Json(serde_json::json!({
                        "method": method,
                        "path": path,
                        "authorization": authorization,
                        "content_type": content_type,
                        "body": body,
                    })),
                )
            }
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), calls)
    }

    fn test_app(token_url: &str, api_base: &str, require_token: bool) -> (Router, Arc<Session>) {
        let settings = OAuthSettings::new(
            "client",
            Secret::new("secret".into()),
            "http://localhost:3000/callback",
        )
        .with_token_url(token_url);
        let client = reqwest::Client::new();
        let session = Arc::new(Session::new(settings, api_base, client.clone()));

        let state = AppState {
            proxy: ProxyState {
                client,
                session: session.clone(),
                timeout: Duration::from_secs(5),
                require_token,
                requests_total: Arc::new(AtomicU64::new(0)),
                errors_total: Arc::new(AtomicU64::new(0)),
            },
            started_at: Instant::now(),
            prometheus: metrics::detached_handle(),
        };
        (build_router(state, 1000), session)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    fn json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn auth_redirects_to_consent_page() {
        let (app, _session) = test_app("http://127.0.0.1:1/token", "http://unused", false);
        let (status, headers, _) = get(&app, "/auth").await;

        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        let location = headers.get("location").unwrap().to_str().unwrap();
        assert!(location.starts_with("https://appcenter.intuit.com/connect/oauth2?"));
        assert!(location.contains("client_id=client"));
        assert!(location.contains("scope=com.intuit.quickbooks.accounting"));
        assert!(location.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(location.contains("state=demo-app"));
    }

    #[tokio::test]
    async fn callback_returns_token_pair() {
        let (token_url, _calls) = start_token_stub(false).await;
        let (app, session) = test_app(&token_url, "http://unused", false);

        let (status, headers, body) = get(&app, "/callback?code=ABC&realmId=123").await;

        assert_eq!(status, StatusCode::OK);
        assert!(
            headers
                .get("content-type")
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("application/json")
        );
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"accessToken":"a1","refreshToken":"r1"}"#
        );
        let bearer = session.bearer().await.unwrap();
        assert_eq!(bearer.base_url, "http://unused/v3/company/123");
    }

    #[tokio::test]
    async fn callback_without_code_is_rejected_locally() {
        let (token_url, calls) = start_token_stub(false).await;
        let (app, session) = test_app(&token_url, "http://unused", false);

        let (status, _, body) = get(&app, "/callback?realmId=123").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"No authorization code received");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(session.bearer().await.is_none());
    }

    #[tokio::test]
    async fn callback_exchange_failure_returns_500() {
        let (token_url, calls) = start_token_stub(true).await;
        let (app, session) = test_app(&token_url, "http://unused", false);

        let (status, _, body) = get(&app, "/callback?code=bad&realmId=123").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Error during token retrieval");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.bearer().await.is_none());
    }

    #[tokio::test]
    async fn resource_routes_forward_with_bearer() {
        let (token_url, _) = start_token_stub(false).await;
        let (api_base, _) = start_api_stub().await;
        let (app, _session) = test_app(&token_url, &api_base, false);
        get(&app, "/callback?code=ABC&realmId=123").await;

        let cases = [
            ("/create-account", StatusCode::CREATED, "POST", "/v3/company/123/account"),
            ("/create-invoice", StatusCode::CREATED, "POST", "/v3/company/123/invoice"),
            ("/get-invoice/145", StatusCode::OK, "GET", "/v3/company/123/invoice/145"),
            ("/update-invoice", StatusCode::OK, "POST", "/v3/company/123/invoice"),
            ("/create-bill", StatusCode::CREATED, "POST", "/v3/company/123/bill"),
            ("/get-bill/146", StatusCode::OK, "GET", "/v3/company/123/bill/146"),
            ("/update-bill", StatusCode::OK, "POST", "/v3/company/123/bill"),
            ("/create-transfer", StatusCode::CREATED, "POST", "/v3/company/123/transfer"),
            ("/create-vendor", StatusCode::CREATED, "POST", "/v3/company/123/vendor"),
            ("/create-payment", StatusCode::CREATED, "POST", "/v3/company/123/payment"),
        ];

        for (uri, expected_status, method, path) in cases {
            let (status, _, body) = get(&app, uri).await;
            assert_eq!(status, expected_status, "{uri}");
            let echoed = json(&body);
            assert_eq!(echoed["method"], method, "{uri}");
            assert_eq!(echoed["path"], path, "{uri}");
            assert_eq!(echoed["authorization"], "Bearer a1", "{uri}");
            assert_eq!(echoed["content_type"], "application/json", "{uri}");
        }
    }

    #[tokio::test]
    async fn create_invoice_sends_fixed_payload() {
        let (token_url, _) = start_token_stub(false).await;
        let (api_base, _) = start_api_stub().await;
        let (app, _session) = test_app(&token_url, &api_base, false);
        get(&app, "/callback?code=ABC&realmId=123").await;

        let (_, _, body) = get(&app, "/create-invoice").await;
        let echoed = json(&body);
        assert_eq!(echoed["body"], payloads::invoice());
        assert_eq!(echoed["body"]["CustomerRef"]["value"], "1");
    }

    #[tokio::test]
    async fn entity_id_cannot_escape_its_path_segment() {
        let (token_url, _) = start_token_stub(false).await;
        let (api_base, _) = start_api_stub().await;
        let (app, _session) = test_app(&token_url, &api_base, false);
        get(&app, "/callback?code=ABC&realmId=123").await;

        let (status, _, body) = get(&app, "/get-invoice/..%2F..%2F999%2Finvoice%2F1%3Fx%3D1").await;

        assert_eq!(status, StatusCode::OK);
        let path = json(&body)["path"].as_str().unwrap().to_string();
        assert!(path.starts_with("/v3/company/123/invoice/"), "got: {path}");
        assert!(!path.contains("/999/"), "got: {path}");
        assert_eq!(path.matches('/').count(), 5, "got: {path}");
    }

    #[tokio::test]
    async fn oauth_routes_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let (token_url, _) = start_token_stub(true).await;
        let (app, _session) = test_app(&token_url, "http://unused", false);
        get(&app, "/auth").await;
        get(&app, "/callback?realmId=123").await;
        get(&app, "/callback?code=bad&realmId=123").await;

        let output = handle.render();
        let counted = |route: &str, status: &str| {
            output.lines().any(|line| {
                line.starts_with("gateway_requests_total")
                    && line.contains(&format!("route=\"{route}\""))
                    && line.contains(&format!("status=\"{status}\""))
            })
        };
        assert!(counted("auth", "307"), "{output}");
        assert!(counted("callback", "400"), "{output}");
        assert!(counted("callback", "500"), "{output}");
    }

    #[tokio::test]
    async fn proxy_uses_refreshed_token() {
        let (token_url, _) = start_token_stub(false).await;
        let (api_base, _) = start_api_stub().await;
        let (app, session) = test_app(&token_url, &api_base, false);
        get(&app, "/callback?code=ABC&realmId=123").await;

        session.refresh().await.unwrap();

        let (status, _, body) = get(&app, "/create-vendor").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json(&body)["authorization"], "Bearer a2");
    }

    #[tokio::test]
    async fn unauthenticated_call_is_forwarded_and_fails_upstream() {
        let (api_base, api_calls) = start_api_stub().await;
        let (app, _session) = test_app("http://127.0.0.1:1/token", &api_base, false);

        let (status, _, body) = get(&app, "/create-bill").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Error creating bill");
        assert_eq!(
            api_calls.load(Ordering::SeqCst),
            1,
            "request must still reach upstream with an empty bearer"
        );
    }

    #[tokio::test]
    async fn unauthenticated_call_is_rejected_when_token_required() {
        let (api_base, api_calls) = start_api_stub().await;
        let (app, _session) = test_app("http://127.0.0.1:1/token", &api_base, true);

        let (status, _, _) = get(&app, "/create-bill").await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(api_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_upstream_returns_500() {
        let (token_url, _) = start_token_stub(false).await;
        let (app, _session) = test_app(&token_url, "http://127.0.0.1:1", false);
        get(&app, "/callback?code=ABC&realmId=123").await;

        let (status, _, body) = get(&app, "/get-invoice/145").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, b"Error retrieving invoice");
    }

    #[tokio::test]
    async fn health_reports_session_and_counters() {
        let (token_url, _) = start_token_stub(false).await;
        let (api_base, _) = start_api_stub().await;
        let (app, _session) = test_app(&token_url, &api_base, false);

        let (status, _, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let health = json(&body);
        assert_eq!(health["status"], "awaiting_authorization");
        assert_eq!(health["authenticated"], false);
        assert_eq!(health["session"]["status"], "unauthenticated");

        get(&app, "/callback?code=ABC&realmId=123").await;
        get(&app, "/create-account").await;

        let (_, _, body) = get(&app, "/health").await;
        let health = json(&body);
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["authenticated"], true);
        assert_eq!(health["session"]["realm_id"], "123");
        assert_eq!(health["requests_served"], 1);
        assert_eq!(health["errors_total"], 0);
        assert!(health["uptime_seconds"].is_u64());
        assert!(!health.to_string().contains("\"a1\""));
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let (app, _session) = test_app("http://127.0.0.1:1/token", "http://unused", false);
        let (status, headers, _) = get(&app, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        let content_type = headers.get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (app, _session) = test_app("http://127.0.0.1:1/token", "http://unused", false);
        let (status, _, _) = get(&app, "/delete-everything").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
