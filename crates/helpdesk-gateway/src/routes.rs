//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use helpdesk_core::error::HelpdeskError;
use helpdesk_core::types::{ChatRequest, ChatResponse, Context};
use serde::Deserialize;
use std::sync::Arc;

use super::server::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn detail(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "detail": msg.into() })))
}

/// Liveness check.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "helpdesk-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Per-handler health.
pub async fn system_health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let handlers = state.coordinator.health_check().await;
    let healthy = handlers.values().all(|ok| *ok);
    Json(serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "handlers": handlers,
        "dispatch": format!("{:?}", state.coordinator.dispatch_mode()).to_lowercase(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Route and answer one message.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    req.validate()
        .map_err(|e| detail(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let ChatRequest {
        message,
        session_id,
        user_id,
    } = req;
    let context = Context {
        session_id: session_id.unwrap_or_default(),
        user_id,
        ..Default::default()
    };

    // The coordinator never returns an error; a panic inside it surfaces as a JoinError.
    let coordinator = state.coordinator.clone();
    let resp = tokio::spawn(async move { coordinator.handle(&message, Some(context)).await })
        .await
        .map_err(|e| {
            tracing::error!("❌ Chat task failed: {e}");
            detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Erro interno do servidor: {e}"),
            )
        })?;

    tracing::info!(
        "💬 {} → {} (escalated: {})",
        resp.session_id,
        resp.handler_used,
        resp.escalated
    );
    Ok(Json(resp))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub k: Option<usize>,
}

/// Similarity search over the knowledge index.
pub async fn knowledge_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.query.trim().is_empty() {
        return Err(detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            "query must not be empty",
        ));
    }
    let k = body.k.unwrap_or(state.default_k).max(1);

    match state.coordinator.retriever().search(&body.query, k).await {
        Ok(results) => Ok(Json(serde_json::json!({
            "query": body.query,
            "count": results.len(),
            "results": results,
        }))),
        Err(e @ HelpdeskError::RetrieverNotInitialized) => {
            Err(detail(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
        Err(e) => {
            tracing::warn!("⚠️ Knowledge search failed: {e}");
            Err(detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Index statistics.
pub async fn knowledge_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.coordinator.retriever().stats().await;
    Json(serde_json::json!(stats))
}

pub async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let turns = state.coordinator.history(&id).await;
    Json(serde_json::json!({
        "session_id": id,
        "count": turns.len(),
        "turns": turns,
    }))
}

pub async fn clear_session_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let cleared = state.coordinator.clear_history(&id).await;
    if cleared {
        tracing::info!("🧹 Cleared history for session {id}");
    }
    Json(serde_json::json!({ "session_id": id, "cleared": cleared }))
}
