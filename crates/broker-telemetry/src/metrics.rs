//! Prometheus metrics for the broker services.
//!
//! Covers signatures issued, RPC lease outcomes, fee cache behaviour,
//! order relay traffic and WebSocket fan-out.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error and surfaces on first
//! touch of the collector rather than at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Signatures produced, by kind (order/payment).
pub static SIGNATURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_signatures_total",
        "Broker signatures issued",
        &["kind"]
    )
    .unwrap()
});

/// Signing requests rejected, by kind and reason.
pub static SIGN_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_sign_rejections_total",
        "Signing requests rejected",
        &["kind", "reason"]
    )
    .unwrap()
});

/// Lease acquisitions, by chain, endpoint kind and outcome (acquired/exhausted).
pub static LEASE_ACQUIRE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_rpc_lease_acquire_total",
        "RPC lease acquisition attempts",
        &["chain_id", "kind", "outcome"]
    )
    .unwrap()
});

/// Explicit lease releases, by whether the lease was still live.
pub static LEASE_RELEASE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_rpc_lease_release_total",
        "RPC lease releases",
        &["live"]
    )
    .unwrap()
});

/// Fee cache lookups, by outcome (hit/stale/miss/default).
pub static FEE_CACHE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_fee_cache_total",
        "Fee cache lookups",
        &["outcome"]
    )
    .unwrap()
});

/// Background fee refreshes, by result (ok/error/skipped).
pub static FEE_REFRESH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_fee_refresh_total",
        "Background fee multiplier refreshes",
        &["result"]
    )
    .unwrap()
});

/// Balance queries that exhausted their retries.
pub static BALANCE_QUERY_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_balance_query_failures_total",
        "Balance queries that fell back to the default multiplier",
        &["chain_id"]
    )
    .unwrap()
});

/// Relay events, by event (staged/submitted/expired).
pub static RELAY_ORDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_relay_orders_total",
        "Order relay events",
        &["event"]
    )
    .unwrap()
});

/// Connected WebSocket clients.
pub static WS_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("broker_ws_clients", "Connected WebSocket clients").unwrap()
});

/// Subscribers reached per broadcast.
pub static BROADCAST_FANOUT: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "broker_broadcast_fanout",
        "Subscribers per order-update broadcast",
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]
    )
    .unwrap()
});

/// Clients dropped after a failed send.
pub static BROADCAST_DROPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "broker_broadcast_drops_total",
        "Subscribers removed after a failed send",
        &["reason"]
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    pub fn signature_issued(kind: &str) {
        SIGNATURES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn sign_rejected(kind: &str, reason: &str) {
        SIGN_REJECTIONS_TOTAL.with_label_values(&[kind, reason]).inc();
    }

    pub fn lease_acquired(chain_id: u64, kind: &str) {
        LEASE_ACQUIRE_TOTAL
            .with_label_values(&[&chain_id.to_string(), kind, "acquired"])
            .inc();
    }

    pub fn lease_exhausted(chain_id: u64, kind: &str) {
        LEASE_ACQUIRE_TOTAL
            .with_label_values(&[&chain_id.to_string(), kind, "exhausted"])
            .inc();
    }

    pub fn lease_released(live: bool) {
        LEASE_RELEASE_TOTAL
            .with_label_values(&[if live { "true" } else { "false" }])
            .inc();
    }

    pub fn fee_cache(outcome: &str) {
        FEE_CACHE_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn fee_refresh(result: &str) {
        FEE_REFRESH_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn balance_query_failed(chain_id: u64) {
        BALANCE_QUERY_FAILURES
            .with_label_values(&[&chain_id.to_string()])
            .inc();
    }

    pub fn relay_event(event: &str) {
        RELAY_ORDERS_TOTAL.with_label_values(&[event]).inc();
    }

    pub fn ws_client_connected() {
        WS_CLIENTS.inc();
    }

    pub fn ws_client_disconnected() {
        WS_CLIENTS.dec();
    }

    pub fn broadcast(fanout: usize, dropped: usize) {
        BROADCAST_FANOUT.observe(fanout as f64);
        if dropped > 0 {
            BROADCAST_DROPS_TOTAL
                .with_label_values(&["send_failed"])
                .inc_by(dropped as u64);
        }
    }
}

/// Encode every registered metric in the Prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
