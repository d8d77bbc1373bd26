//! EIP-712 typed data for broker signatures.
//!
//! Two structs share the Solidity name `Order`, so each lives in its own
//! module to keep the generated type hashes distinct.

use alloy::primitives::Address;
use alloy::sol_types::{eip712_domain, Eip712Domain};

use broker_core::ChainId;

/// Domain name of the perpetual proxy contract.
pub const TRADE_MANAGER_DOMAIN: &str = "Perpetual Trade Manager";

/// Domain name of the payments contract.
pub const MULTIPAY_DOMAIN: &str = "Multipay";

/// Broker authorization over the fee-relevant order fields.
pub mod broker_order {
    alloy::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct Order {
            uint24 iPerpetualId;
            uint16 brokerFeeTbps;
            address traderAddr;
            uint32 iDeadline;
        }
    }
}

/// Full client order, including the broker's authorization.
pub mod client_order {
    alloy::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct Order {
            uint24 iPerpetualId;
            uint16 brokerFeeTbps;
            address traderAddr;
            address brokerAddr;
            int128 fAmount;
            int128 fLimitPrice;
            int128 fTriggerPrice;
            uint32 iDeadline;
            uint32 flags;
            uint16 leverageTDR;
            uint32 executionTimestamp;
            bytes brokerSignature;
        }
    }
}

alloy::sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct PaymentSummary {
        address payer;
        address executor;
        address token;
        uint32 timestamp;
        uint32 id;
        uint256 totalAmount;
    }
}

/// Domain scoping order signatures to one chain's proxy contract.
pub fn trade_manager_domain(chain_id: ChainId, proxy: Address) -> Eip712Domain {
    eip712_domain! {
        name: TRADE_MANAGER_DOMAIN,
        chain_id: chain_id,
        verifying_contract: proxy,
    }
}

/// Domain scoping payment signatures to one chain's multipay contract.
pub fn multipay_domain(chain_id: ChainId, multipay: Address) -> Eip712Domain {
    eip712_domain! {
        name: MULTIPAY_DOMAIN,
        chain_id: chain_id,
        verifying_contract: multipay,
    }
}

impl From<&broker_core::PaymentSummary> for PaymentSummary {
    fn from(p: &broker_core::PaymentSummary) -> Self {
        Self {
            payer: p.payer,
            executor: p.executor,
            token: p.token,
            timestamp: p.timestamp,
            id: p.id,
            totalAmount: p.total_amount,
        }
    }
}
