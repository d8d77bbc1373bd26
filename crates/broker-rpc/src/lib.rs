//! RPC endpoint leasing shared across broker replicas.
//!
//! - [`RpcLeasePool`]: hands out one endpoint per `(chain, kind)` under a
//!   self-expiring lease recorded in the coordination store
//! - [`LeasedBalanceReader`]: acquire, read an ERC-20 balance, release,
//!   retrying transient failures with a fixed delay
//! - [`ApprovalGate`]: memoised check that the multipay contract may spend a
//!   payment token, optionally approving on chain

pub mod approval;
pub mod balance;
pub mod error;
pub mod lease;

pub use approval::{ApprovalGate, OnChainApprover, TokenApproval};
pub use balance::{
    to_decimal, BalanceCall, BalanceReader, HttpBalanceCall, LeasedBalanceReader, RetryPolicy,
};
pub use error::{LeaseError, LeaseResult, RpcError, RpcResult};
pub use lease::{ExhaustionPolicy, LeaseConfig, Receipt, RpcLeasePool, SelectionPolicy};
