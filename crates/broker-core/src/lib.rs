//! Core domain types for the broker services.
//!
//! This crate provides the data model shared by every other crate:
//! - `ChainConfig`, `ChainRegistry`: per-chain contract addresses and executor allow-lists
//! - `EndpointKind`, `RpcEndpointSet`: RPC endpoint lists per chain and protocol
//! - `ClientOrder`, `SignOrderRequest`, `StagedOrder`, `OrderUpdate`: order lifecycle types
//! - `PaymentSummary`, `PaymentSignatureRequest`: executor payment types
//! - `Topic`: the `perpetualId:chainId` subscription key
//! - `RebateSchedule`, `TraderFeeRecord`: fee-tier inputs and cached results

pub mod chain;
pub mod clock;
pub mod error;
pub mod fee;
pub mod order;
pub mod payment;
pub mod topic;

pub use chain::{ChainConfig, ChainId, ChainRegistry, EndpointKind, RpcEndpointSet};
pub use clock::{Clock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use fee::{apply_multiplier, RebateSchedule, RebateTier, RebateToken, TraderFeeRecord};
pub use order::{
    strip_hex_prefix, ClientOrder, OrderUpdate, SignOrderRequest, SignedOrderResponse,
    StagedOrder,
};
pub use payment::{PaymentSignatureRequest, PaymentSummary};
pub use topic::{Topic, MIN_PERPETUAL_ID};
