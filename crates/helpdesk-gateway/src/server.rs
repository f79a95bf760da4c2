//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use helpdesk_agent::Coordinator;
use helpdesk_core::config::GatewayConfig;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub start_time: std::time::Instant,
    /// Routes and answers every chat message.
    pub coordinator: Arc<Coordinator>,
    /// Result count for knowledge search when the caller gives none.
    pub default_k: usize,
}

/// `/api/v1/` → `/api/v1`, `/` → ``.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    let prefix = normalize_prefix(&shared.gateway_config.api_prefix);
    let api = |path: &str| format!("{prefix}{path}");

    // an empty prefix puts the per-handler health on `/health` itself
    let router = if prefix.is_empty() {
        Router::new()
    } else {
        Router::new().route("/health", get(super::routes::health_check))
    };

    router
        .route(&api("/chat"), post(super::routes::chat))
        .route(&api("/health"), get(super::routes::system_health_check))
        .route(&api("/knowledge/search"), post(super::routes::knowledge_search))
        .route(&api("/knowledge/stats"), get(super::routes::knowledge_stats))
        .route(
            &api("/sessions/{id}/history"),
            get(super::routes::session_history).delete(super::routes::clear_session_history),
        )
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // HELPDESK_CORS_ORIGINS=https://help.example.com,https://admin.example.com
            if let Ok(origins_str) = std::env::var("HELPDESK_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(
    config: &GatewayConfig,
    coordinator: Arc<Coordinator>,
    default_k: usize,
) -> anyhow::Result<()> {
    let state = AppState {
        gateway_config: config.clone(),
        start_time: std::time::Instant::now(),
        coordinator,
        default_k,
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        "🌐 Gateway listening on http://{}{}",
        addr,
        normalize_prefix(&config.api_prefix)
    );

    axum::serve(listener, app).await?;
    Ok(())
}
