//! HTTP surface: the WebSocket upgrade route plus the health/metrics
//! endpoints (§10.3). Kept on two separate routers so the metrics listener
//! can be bound to a different port/interface than the voice traffic one,
//! following the teacher's `build_api_router`/`ApiState` split.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth;
use crate::session::{handle_socket, GatewayState};

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    pub token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
) -> Response {
    if !auth::ip_allowed(addr.ip(), &state.allowed_ips) {
        warn!(ip = %addr.ip(), "rejected connection from disallowed ip");
        return (StatusCode::FORBIDDEN, "ip not allowed").into_response();
    }

    if let Err(e) = auth::authenticate(query.token.as_deref(), &state.auth) {
        warn!(ip = %addr.ip(), error = %e, "rejected connection: auth failed");
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Builds the voice data-plane router, bound to `WS_PORT` (§10.3).
pub fn build_voice_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    (StatusCode::OK, state.metrics.render())
}

/// Builds the operational router (`/health`, `/metrics`), bound to
/// `METRICS_PORT` so it can sit behind a different network policy than the
/// voice traffic (§4.13, §10.3).
pub fn build_admin_router(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]).allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
