//! HTTP server for the REST API.

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::ApiResult;
use crate::handlers;
use crate::state::ApiState;

/// Create the axum router. Any origin may call the API.
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/broker-address", get(handlers::broker_address))
        .route("/broker-fee", get(handlers::broker_fee))
        .route("/chain-config", get(handlers::chain_config))
        .route("/sign-order", post(handlers::sign_order))
        .route("/order-submitted", post(handlers::order_submitted))
        .route("/sign-payment", post(handlers::sign_payment))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` is cancelled.
pub async fn run_server(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> ApiResult<()> {
    info!(addr = ?listener.local_addr().ok(), "Starting REST API");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
