//! Broker fee resolution.
//!
//! A trader's effective fee is the chain's base fee scaled by a multiplier in
//! `[0, 1]`. Multipliers come from a [`MultiplierSource`] and are cached in
//! the shared store by [`FeeCache`]:
//! - fresh hit: served from the cache
//! - stale hit: served from the cache while a background task recomputes it
//! - miss: computed synchronously and stored
//!
//! Two sources are provided: [`TokenRebateSource`] reads rebate-token
//! balances through the RPC lease pool, [`VipLevelSource`] maps an external
//! VIP level onto per-chain fee reductions.

pub mod cache;
pub mod config;
pub mod error;
pub mod source;
pub mod vip;

pub use cache::FeeCache;
pub use config::{FeeConfig, MultiplierSourceConfig};
pub use error::{FeeError, FeeResult};
pub use source::{MultiplierSource, TokenRebateSource};
pub use vip::{VipLevelSource, VipReductions};
