//! HTTP server exposing the `/ws` endpoint.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::connection::serve_connection;
use crate::error::HubResult;
use crate::hub::SubscriptionHub;
use crate::limiter::ConnectionLimiter;

/// Shared state for the WebSocket handler.
#[derive(Clone)]
pub struct HubState {
    hub: Arc<SubscriptionHub>,
    limiter: Arc<ConnectionLimiter>,
    config: HubConfig,
}

impl HubState {
    pub fn new(hub: Arc<SubscriptionHub>, config: HubConfig) -> Self {
        Self {
            hub,
            limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
        }
    }

    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.hub
    }

    pub fn connection_count(&self) -> usize {
        self.limiter.current_count()
    }
}

/// Create the axum router.
pub fn create_router(state: HubState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(State(state): State<HubState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.limiter.try_acquire() else {
        warn!(
            current = state.limiter.current_count(),
            max = state.limiter.max(),
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let HubState { hub, config, .. } = state;
    ws.max_message_size(config.max_message_bytes)
        .max_frame_size(config.max_message_bytes)
        .on_upgrade(move |socket| serve_connection(socket, hub, config, guard))
}

/// Serve the hub on `listener` until `shutdown` is cancelled.
pub async fn run_server(
    listener: TcpListener,
    state: HubState,
    shutdown: CancellationToken,
) -> HubResult<()> {
    info!(addr = ?listener.local_addr().ok(), "Starting WebSocket hub");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
