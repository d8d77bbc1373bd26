//! Broker service composition.
//!
//! Two binaries share this crate:
//! - `broker-api`: the REST API that signs orders and payments
//! - `executor-ws`: the WebSocket hub that fans submitted orders out to
//!   executors
//!
//! Both load one [`AppConfig`], connect to the shared coordination store and
//! build their components through [`Services`]. Configuration errors are the
//! only failures that stop a process at startup.

pub mod app;
pub mod config;
pub mod error;

pub use app::{run_api, run_executor_ws, shutdown_on_ctrl_c, Services};
pub use config::{AppConfig, ApprovalConfig, KeyConfig, RpcConfig, StoreConfig};
pub use error::{AppError, AppResult};
