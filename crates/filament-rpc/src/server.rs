//! The HTTP boundary: narrow handlers over the engine's submit/read surface,
//! mounted under `/api/v1/<api_name>`. Success responses use the
//! `{data, message}` envelope, errors `{detail}`. Rate limiting and request
//! logging belong to the deployment surround, not this layer.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use filament_core::transaction::TransactionCreate;
use filament_core::types::ContractAddress;
use filament_crypto::wallet::generate_wallet;
use filament_dag::DagEngine;

use crate::types::{ErrorDetail, Response};

#[derive(Clone)]
struct AppState {
    engine: Arc<DagEngine>,
}

/// Build the API router for one engine instance. `api_name` is the service
/// segment embedded in the URL path; it has no semantic role in the core.
pub fn router(engine: Arc<DagEngine>, api_name: &str) -> Router {
    let state = AppState { engine };
    let api = Router::new()
        .route("/transactions/", post(send_transaction))
        .route("/wallets/generate/", post(generate_wallet_keys))
        .route("/wallets/balances/", get(get_balances))
        .route("/smart_contracts/", get(get_smart_contracts))
        .route("/smart_contracts/{address}/", get(get_smart_contract))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .nest(&format!("/api/v1/{api_name}"), api)
        .layer(cors)
}

fn ok<T: Serialize>(data: T, message: &str) -> axum::response::Response {
    (StatusCode::OK, Json(Response::new(data, message))).into_response()
}

fn err(status: StatusCode, detail: String) -> axum::response::Response {
    (status, Json(ErrorDetail::new(detail))).into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn send_transaction(
    State(state): State<AppState>,
    Json(create): Json<TransactionCreate>,
) -> axum::response::Response {
    info!(sender = %create.sender, "transaction submitted");
    match state.engine.submit(create) {
        Ok(id) => {
            let woven = state.engine.vertex(&id);
            ok(
                (id.to_hex(), woven),
                "The transaction was created successfully.",
            )
        }
        Err(e) if e.is_validation() => err(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => err(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn generate_wallet_keys() -> axum::response::Response {
    info!("generating wallet keys");
    ok(generate_wallet(), "The keys were generated successfully.")
}

async fn get_balances(State(state): State<AppState>) -> axum::response::Response {
    ok(
        state.engine.balances(),
        "The wallets balances were retrieved successfully.",
    )
}

async fn get_smart_contracts(State(state): State<AppState>) -> axum::response::Response {
    ok(
        state.engine.contract_views(),
        "The smart contracts were retrieved successfully.",
    )
}

async fn get_smart_contract(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> axum::response::Response {
    match state.engine.contract_view(&ContractAddress(address)) {
        Some(view) => ok(view, "The smart contract was retrieved successfully."),
        None => err(
            StatusCode::NOT_FOUND,
            "The smart contract was not found.".into(),
        ),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
