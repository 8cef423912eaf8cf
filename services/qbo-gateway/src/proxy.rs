//! Upstream forwarding
//!
//! Sends one fixed request to the company-scoped accounting API with the
//! session's current bearer token. Upstream success bodies are returned
//! verbatim under the route's own status code; any upstream failure becomes
//! a plain-text 500 and the details go to the log.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Secret;
use qbo_session::Session;
use tracing::{error, instrument, warn};

use crate::error::Error;
use crate::metrics;

/// Shared state for upstream calls
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub session: Arc<Session>,
    pub timeout: Duration,
    pub require_token: bool,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
}

/// One upstream request: what to send, where, and how to answer.
#[derive(Debug)]
pub struct UpstreamCall {
    /// Metric/log label, e.g. `create_invoice`
    pub route: &'static str,
    pub method: reqwest::Method,
    /// Path segments below the company base URL, e.g. `["invoice", "145"]`.
    /// Each is percent-encoded as a single segment.
    pub segments: Vec<String>,
    pub payload: Option<serde_json::Value>,
    /// Status returned to the client on upstream success
    pub success: StatusCode,
    /// Completes "Error ..." in the failure body, e.g. `creating invoice`
    pub action: &'static str,
}

impl UpstreamCall {
    /// POST a fixed document to a resource collection.
    pub fn post(
        route: &'static str,
        resource: &str,
        payload: serde_json::Value,
        success: StatusCode,
        action: &'static str,
    ) -> Self {
        Self {
            route,
            method: reqwest::Method::POST,
            segments: vec![resource.to_string()],
            payload: Some(payload),
            success,
            action,
        }
    }

    /// GET a single entity by id.
    pub fn get(route: &'static str, resource: &str, id: &str, action: &'static str) -> Self {
        Self {
            route,
            method: reqwest::Method::GET,
            segments: vec![resource.to_string(), id.to_string()],
            payload: None,
            success: StatusCode::OK,
            action,
        }
    }
}

/// Forward a call and turn the outcome into the client response.
pub async fn forward(state: &ProxyState, call: UpstreamCall) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = Instant::now();
    let route = call.route;

    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let response = match send(state, call, &request_id).await {
        Ok(r) => r,
        Err(e) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            e.into_response()
        }
    };

    metrics::record_request(
        route,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

#[instrument(skip_all, fields(request_id = %request_id, route = call.route, method = %call.method))]
async fn send(state: &ProxyState, call: UpstreamCall, request_id: &str) -> Result<Response, Error> {
    let (token, base_url) = match state.session.bearer().await {
        Some(bearer) => (bearer.access_token, bearer.base_url),
        None if state.require_token => {
            warn!("no access token held, rejecting locally");
            return Err(Error::NotAuthenticated);
        }
        None => {
            warn!("no access token held, forwarding with empty bearer");
            (Secret::new(String::new()), state.session.company_url(""))
        }
    };

    let url = match upstream_url(&base_url, &call.segments) {
        Some(url) => url,
        None => {
            metrics::record_upstream_error(call.route, "url");
            error!(%base_url, "company base URL cannot carry path segments");
            return Err(Error::Upstream {
                action: call.action,
            });
        }
    };

    let mut req = state
        .client
        .request(call.method.clone(), url.clone())
        .bearer_auth(token.expose())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(state.timeout);
    if let Some(payload) = &call.payload {
        req = req.json(payload);
    }

    let upstream = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            let kind = if e.is_timeout() { "timeout" } else { "transport" };
            metrics::record_upstream_error(call.route, kind);
            error!(error = %e, %url, "upstream request failed");
            return Err(Error::Upstream {
                action: call.action,
            });
        }
    };

    let status = upstream.status();
    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => {
            metrics::record_upstream_error(call.route, "body");
            error!(error = %e, %status, "failed to read upstream response body");
            return Err(Error::Upstream {
                action: call.action,
            });
        }
    };

    if !status.is_success() {
        metrics::record_upstream_error(call.route, "status");
        error!(
            %status,
            body = %String::from_utf8_lossy(&body),
            "upstream returned error status"
        );
        return Err(Error::Upstream {
            action: call.action,
        });
    }

    Ok((
        call.success,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Append `segments` to the company base URL, one path segment each.
fn upstream_url(base_url: &str, segments: &[String]) -> Option<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url).ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
    Some(url)
}
