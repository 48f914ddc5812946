//! Axum HTTP + WebSocket server.

use std::sync::Arc;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, info, warn};

use crate::connection::handle_ws_connection;
use crate::gate::{verify_access, TokenQuery};
use crate::state::ServerState;

/// Start the tunnel server and serve until ctrl-c.
pub async fn start_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Tunnel listening on {addr}");
    info!(
        "Access link: http://{}:{}/?token={}",
        if state.config.host == "0.0.0.0" {
            "YOUR_IP"
        } else {
            &state.config.host
        },
        state.config.port,
        state.access_token.expose()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Build the router; split out so tests can drive it on an ephemeral port.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}

async fn index_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    if !verify_access(&state.access_token, query.token.as_deref()) {
        warn!("Unauthorized access attempt on control UI");
        return (StatusCode::FORBIDDEN, "Forbidden: Invalid or missing token").into_response();
    }

    match authtunnel_web::control_document() {
        Some(doc) => Html(doc.into_owned()).into_response(),
        None => {
            error!("Control UI document missing from build");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Critical Error: Could not load frontend assets",
            )
                .into_response()
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    if !verify_access(&state.access_token, query.token.as_deref()) {
        // Refuse the upgrade outright; no browser resource is allocated.
        warn!("Unauthorized live-channel handshake");
        return (StatusCode::FORBIDDEN, "Authentication error").into_response();
    }

    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
        .into_response()
}

async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.connection_count().await,
    }))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
