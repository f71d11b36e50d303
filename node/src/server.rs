// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::extract::{Request as AxumRequest, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::api::*;
use crate::errors::AgentError;
use crate::runtime::AgentRuntime;
use crate::telemetry;

pub type SharedRuntime = Arc<AgentRuntime>;

async fn auth_guard(
    State(token): State<Arc<String>>,
    req: AxumRequest,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "));

    match provided {
        Some(p) if p == token.as_str() => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// `/health` stays open; everything else sits behind the bearer token when one is set.
pub fn build_router(state: SharedRuntime, auth_token: Option<String>) -> Router {
    let mut protected = Router::new()
        .route("/v1/status", get(status))
        .route("/v1/inference", post(record_inference))
        .route("/metrics", get(metrics_handler));

    if let Some(token) = auth_token {
        tracing::info!("Auth Enabled: Bearer token required");
        protected = protected.layer(from_fn_with_state(Arc::new(token), auth_guard));
    } else {
        tracing::warn!("Auth Disabled: No token configured");
    }

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health(State(state): State<SharedRuntime>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        registration: state.registration_state().as_str().to_string(),
    })
}

async fn status(State(state): State<SharedRuntime>) -> Json<StatusResponse> {
    Json(state.status())
}

async fn record_inference(
    State(state): State<SharedRuntime>,
    Json(req): Json<InferenceRequest>,
) -> Result<Json<InferenceResponse>, AgentError> {
    let proof = state.record_inference(
        req.input.as_bytes(),
        req.output.as_bytes(),
        req.tokens,
        req.latency_ms,
    )?;
    Ok(Json(InferenceResponse { proof }))
}

async fn metrics_handler() -> String {
    telemetry::get_metrics()
}
