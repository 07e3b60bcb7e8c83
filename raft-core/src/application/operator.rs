// raft-core/src/application/operator.rs

use crate::application::governor::Runtime;
use crate::domain::config::{ConfigUpdate, GovernorConfig};
use crate::domain::error::DomainError;
use crate::domain::plan::Plan;
use crate::error::RaftError;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub const OPERATOR_TOKEN_ENV: &str = "OPERATOR_TOKEN";

/// Shared handler state: the runtime plus the expected bearer token.
#[derive(Clone)]
struct OperatorState {
    runtime: Arc<Runtime>,
    token: Arc<str>,
}

/// Build the authenticated operator router. Every route sits behind the
/// bearer check; invalid payloads yield a 422 whose detail names the
/// failing field.
pub fn operator_router(runtime: Arc<Runtime>, token: &str) -> Router {
    let state = OperatorState {
        runtime,
        token: Arc::from(token),
    };
    Router::new()
        .route("/state", get(get_state))
        .route("/pause", post(post_pause))
        .route("/kill", post(post_kill))
        .route("/config", post(post_config))
        .route("/reload_model", post(post_reload_model))
        .route("/prove", post(post_prove))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_bearer(State(state): State<OperatorState>, req: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token);
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        warn!(path = %req.uri().path(), "unauthorized operator request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "unauthorized" })),
        )
            .into_response();
    }
    next.run(req).await
}

async fn get_state(State(state): State<OperatorState>) -> Json<serde_json::Value> {
    let hatches = state.runtime.hatches();
    Json(json!({
        "pause": hatches.is_paused(),
        "kill": hatches.kill_requested(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PauseRequest {
    flag: bool,
}

async fn post_pause(
    State(state): State<OperatorState>,
    Json(body): Json<PauseRequest>,
) -> Json<serde_json::Value> {
    state.runtime.hatches().request_pause(body.flag);
    Json(json!({ "ok": true, "pause": body.flag }))
}

async fn post_kill(State(state): State<OperatorState>) -> Json<serde_json::Value> {
    state.runtime.hatches().request_kill();
    Json(json!({ "ok": true, "kill": true }))
}

async fn post_config(
    State(state): State<OperatorState>,
    Json(body): Json<GovernorConfig>,
) -> Response {
    let update = ConfigUpdate {
        rho_max: Some(body.rho_max),
        energy_multiplier: Some(body.energy_multiplier),
    };
    match state.runtime.update_config(update) {
        Ok(config) => Json(json!({ "status": "updated", "config": config })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn post_reload_model(State(state): State<OperatorState>) -> Response {
    match state.runtime.reload_model(None).await {
        Ok(rho) => Json(json!({ "status": "reloaded", "rho": rho })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": e.to_string() })),
        )
            .into_response(),
    }
}

async fn post_prove(State(state): State<OperatorState>, Json(plan): Json<Plan>) -> Response {
    match state.runtime.prove_plan(plan).await {
        Ok((passed, counterexample)) => Json(json!({
            "passed": passed,
            "counterexample": counterexample,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Validation failures carry their field path at 422; everything else is
/// an opaque 500.
fn error_response(err: RaftError) -> Response {
    match err {
        RaftError::Domain(DomainError::Validation { field, message }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": { "field": field, "message": message } })),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": other.to_string() })),
        )
            .into_response(),
    }
}
