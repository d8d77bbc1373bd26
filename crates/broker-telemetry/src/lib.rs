//! Prometheus metrics and structured logging for the broker services.
//!
//! - `init_logging`: tracing subscriber with env-filter, JSON in production
//! - `Metrics`: recording helpers over process-global Prometheus collectors
//! - `gather_text`: text exposition for the `/metrics` endpoint

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
