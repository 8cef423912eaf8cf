//! OAuth and resource routes
//!
//! Endpoints:
//! - GET /auth: redirect to the Intuit consent page
//! - GET /callback?code&realmId: exchange the code, return the token pair
//! - GET /create-account: POST fixed account
//! - GET /create-invoice: POST fixed invoice
//! - GET /get-invoice/{id}: GET invoice by id
//! - GET /update-invoice: POST sparse invoice update
//! - GET /create-bill: POST fixed bill
//! - GET /get-bill/{id}: GET bill by id
//! - GET /update-bill: POST full bill update
//! - GET /create-transfer: POST fixed transfer
//! - GET /create-vendor: POST fixed vendor
//! - GET /create-payment: POST fixed payment

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::Error;
use crate::metrics;
use crate::payloads;
use crate::proxy::{UpstreamCall, forward};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(auth))
        .route("/callback", get(callback))
        .route("/create-account", get(create_account))
        .route("/create-invoice", get(create_invoice))
        .route("/get-invoice/{invoice_id}", get(get_invoice))
        .route("/update-invoice", get(update_invoice))
        .route("/create-bill", get(create_bill))
        .route("/get-bill/{bill_id}", get(get_bill))
        .route("/update-bill", get(update_bill))
        .route("/create-transfer", get(create_transfer))
        .route("/create-vendor", get(create_vendor))
        .route("/create-payment", get(create_payment))
}

/// GET /auth: send the browser to Intuit's consent page.
async fn auth(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let url = state.proxy.session.authorization_url();
    info!("redirecting to authorization endpoint");
    let response = Redirect::temporary(&url).into_response();
    metrics::record_request(
        "auth",
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Query parameters Intuit appends to the redirect URI.
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    #[serde(rename = "realmId")]
    realm_id: Option<String>,
    state: Option<String>,
}

/// GET /callback: exchange the authorization code for a token pair.
///
/// Responds with `{"accessToken": ..., "refreshToken": ...}`.
async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    let started = Instant::now();
    let response = complete_authorization(&state, query)
        .await
        .unwrap_or_else(IntoResponse::into_response);
    metrics::record_request(
        "callback",
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn complete_authorization(state: &AppState, query: CallbackQuery) -> Result<Response, Error> {
    let session = &state.proxy.session;

    if let Some(returned) = query.state.as_deref() {
        if returned != session.settings().state {
            warn!(returned, "callback state does not match the configured value");
        }
    }

    let realm_id = query.realm_id.as_deref().unwrap_or_default();
    match session.exchange(query.code.as_deref(), realm_id).await {
        Ok(tokens) => Ok(Json(serde_json::json!({
            "accessToken": tokens.access_token.expose(),
            "refreshToken": tokens.refresh_token.expose(),
        }))
        .into_response()),
        Err(qbo_session::Error::MissingCode) => {
            warn!("callback without authorization code");
            Err(Error::MissingCode)
        }
        Err(e) => {
            error!(error = %e, "error retrieving access token");
            Err(Error::TokenRetrieval)
        }
    }
}

async fn create_account(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "create_account",
        "account",
        payloads::account(),
        StatusCode::CREATED,
        "creating account",
    );
    forward(&state.proxy, call).await
}

async fn create_invoice(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "create_invoice",
        "invoice",
        payloads::invoice(),
        StatusCode::CREATED,
        "creating invoice",
    );
    forward(&state.proxy, call).await
}

async fn get_invoice(State(state): State<AppState>, Path(invoice_id): Path<String>) -> Response {
    let call = UpstreamCall::get("get_invoice", "invoice", &invoice_id, "retrieving invoice");
    forward(&state.proxy, call).await
}

async fn update_invoice(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "update_invoice",
        "invoice",
        payloads::invoice_update(),
        StatusCode::OK,
        "updating invoice",
    );
    forward(&state.proxy, call).await
}

async fn create_bill(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "create_bill",
        "bill",
        payloads::bill(),
        StatusCode::CREATED,
        "creating bill",
    );
    forward(&state.proxy, call).await
}

async fn get_bill(State(state): State<AppState>, Path(bill_id): Path<String>) -> Response {
    let call = UpstreamCall::get("get_bill", "bill", &bill_id, "retrieving bill");
    forward(&state.proxy, call).await
}

async fn update_bill(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "update_bill",
        "bill",
        payloads::bill_update(),
        StatusCode::OK,
        "updating bill",
    );
    forward(&state.proxy, call).await
}

async fn create_transfer(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "create_transfer",
        "transfer",
        payloads::transfer(),
        StatusCode::CREATED,
        "creating transfer",
    );
    forward(&state.proxy, call).await
}

async fn create_vendor(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "create_vendor",
        "vendor",
        payloads::vendor(),
        StatusCode::CREATED,
        "creating vendor",
    );
    forward(&state.proxy, call).await
}

async fn create_payment(State(state): State<AppState>) -> Response {
    let call = UpstreamCall::post(
        "create_payment",
        "payment",
        payloads::payment(),
        StatusCode::CREATED,
        "creating payment",
    );
    forward(&state.proxy, call).await
}
