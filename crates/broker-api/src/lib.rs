//! REST surface of the broker.
//!
//! - `GET /broker-address`, `GET /broker-fee`, `GET /chain-config`
//! - `POST /sign-order`: quote the trader's fee, sign, stage for relay
//! - `POST /order-submitted`: queue staged orders for WebSocket fan-out
//! - `POST /sign-payment`: verify the executor and countersign a payment
//! - `GET /metrics`: Prometheus text exposition
//!
//! Validation failures answer 400 with `{"error": ...}`. Failures after
//! validation answer 200 with the same body shape, which front-ends rely on.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server};
pub use state::ApiState;
