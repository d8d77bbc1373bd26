//! Order lifecycle types.
//!
//! `ClientOrder` is the JSON shape exchanged with trading front-ends.
//! `StagedOrder` is the subset persisted under the order id while awaiting
//! on-chain submission, and `OrderUpdate` is what subscribers receive.

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::error::{CoreError, CoreResult};
use crate::topic::Topic;

/// Order fields as sent by the front-end and echoed back after signing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOrder {
    #[serde(rename = "iPerpetualId")]
    pub perpetual_id: u32,
    #[serde(rename = "brokerFeeTbps")]
    pub broker_fee_tbps: u16,
    #[serde(rename = "brokerAddr")]
    pub broker_addr: Address,
    #[serde(rename = "traderAddr")]
    pub trader_addr: Address,
    #[serde(rename = "iDeadline")]
    pub deadline: u32,
    pub flags: u32,
    #[serde(rename = "fAmount")]
    pub amount: String,
    #[serde(rename = "fLimitPrice")]
    pub limit_price: String,
    #[serde(rename = "fTriggerPrice")]
    pub trigger_price: String,
    #[serde(rename = "leverageTDR")]
    pub leverage_tdr: u16,
    #[serde(rename = "brokerSignature")]
    pub broker_signature: Bytes,
    #[serde(rename = "executionTimestamp")]
    pub execution_timestamp: u32,
}

/// Body of `POST /sign-order`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignOrderRequest {
    pub order: ClientOrder,
    #[serde(rename = "chainId")]
    pub chain_id: ChainId,
    /// Trader signature over the order, passed through untouched.
    pub signature: String,
}

impl SignOrderRequest {
    /// Reject incomplete requests before any signing work.
    ///
    /// The broker address is filled in by the signer, so it is not required.
    pub fn check_data(&self) -> CoreResult<()> {
        if self.chain_id == 0 {
            return Err(CoreError::Validation("chainId not provided".into()));
        }
        if self.order.deadline == 0 {
            return Err(CoreError::Validation(
                "request requires order with iDeadline".into(),
            ));
        }
        if self.order.trader_addr.is_zero() {
            return Err(CoreError::Validation(
                "order requires order with non-zero traderAddr".into(),
            ));
        }
        if self.order.perpetual_id == 0 {
            return Err(CoreError::Validation(
                "request requires order with iPerpetualId".into(),
            ));
        }
        Ok(())
    }
}

/// Response of `POST /sign-order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrderResponse {
    #[serde(rename = "orderFields")]
    pub order: ClientOrder,
    #[serde(rename = "chainId")]
    pub chain_id: ChainId,
    #[serde(rename = "brokerSignature")]
    pub broker_signature: String,
    #[serde(rename = "orderDigest")]
    pub order_digest: String,
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Signed order persisted under its order id until submission or expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedOrder {
    pub chain_id: ChainId,
    pub perpetual_id: u32,
    pub trader_addr: String,
    pub deadline: u32,
    pub flags: u32,
    pub amount: String,
    pub limit_price: String,
    pub trigger_price: String,
    pub execution_timestamp: u32,
}

const F_CHAIN_ID: &str = "ChainId";
const F_PERPETUAL_ID: &str = "PerpetualId";
const F_TRADER_ADDR: &str = "TraderAddr";
const F_DEADLINE: &str = "Deadline";
const F_FLAGS: &str = "Flags";
const F_AMOUNT: &str = "FAmount";
const F_LIMIT_PRICE: &str = "FLimitPrice";
const F_TRIGGER_PRICE: &str = "FTriggerPrice";
const F_EXECUTION_TIMESTAMP: &str = "ExecutionTimestamp";

impl StagedOrder {
    pub fn from_order(order: &ClientOrder, chain_id: ChainId) -> Self {
        Self {
            chain_id,
            perpetual_id: order.perpetual_id,
            trader_addr: order.trader_addr.to_string(),
            deadline: order.deadline,
            flags: order.flags,
            amount: order.amount.clone(),
            limit_price: order.limit_price.clone(),
            trigger_price: order.trigger_price.clone(),
            execution_timestamp: order.execution_timestamp,
        }
    }

    /// Topic the order is relayed on.
    pub fn topic(&self) -> Topic {
        Topic::new(self.perpetual_id, self.chain_id)
    }

    /// Flat field list for a hash-shaped store record.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (F_CHAIN_ID.into(), self.chain_id.to_string()),
            (F_PERPETUAL_ID.into(), self.perpetual_id.to_string()),
            (F_TRADER_ADDR.into(), self.trader_addr.clone()),
            (F_DEADLINE.into(), self.deadline.to_string()),
            (F_FLAGS.into(), self.flags.to_string()),
            (F_AMOUNT.into(), self.amount.clone()),
            (F_LIMIT_PRICE.into(), self.limit_price.clone()),
            (F_TRIGGER_PRICE.into(), self.trigger_price.clone()),
            (
                F_EXECUTION_TIMESTAMP.into(),
                self.execution_timestamp.to_string(),
            ),
        ]
    }

    /// Rebuild from a hash record. An empty map is the caller's not-found case.
    pub fn from_fields(fields: &HashMap<String, String>) -> CoreResult<Self> {
        Ok(Self {
            chain_id: parse_field(fields, F_CHAIN_ID)?,
            perpetual_id: parse_field(fields, F_PERPETUAL_ID)?,
            trader_addr: text_field(fields, F_TRADER_ADDR)?,
            deadline: parse_field(fields, F_DEADLINE)?,
            flags: parse_field(fields, F_FLAGS)?,
            amount: text_field(fields, F_AMOUNT)?,
            limit_price: text_field(fields, F_LIMIT_PRICE)?,
            trigger_price: text_field(fields, F_TRIGGER_PRICE)?,
            execution_timestamp: parse_field(fields, F_EXECUTION_TIMESTAMP)?,
        })
    }

    pub fn into_update(self, order_id: &str) -> OrderUpdate {
        OrderUpdate {
            order_id: order_id.to_string(),
            trader_addr: self.trader_addr,
            deadline: self.deadline,
            flags: self.flags,
            amount: self.amount,
            limit_price: self.limit_price,
            trigger_price: self.trigger_price,
            execution_timestamp: self.execution_timestamp,
        }
    }
}

fn text_field(fields: &HashMap<String, String>, name: &'static str) -> CoreResult<String> {
    fields
        .get(name)
        .cloned()
        .ok_or_else(|| CoreError::InvalidStagedField {
            field: name,
            reason: "missing".into(),
        })
}

fn parse_field<T>(fields: &HashMap<String, String>, name: &'static str) -> CoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text_field(fields, name)?
        .parse()
        .map_err(|e: T::Err| CoreError::InvalidStagedField {
            field: name,
            reason: e.to_string(),
        })
}

/// Order update pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "traderAddr")]
    pub trader_addr: String,
    #[serde(rename = "iDeadline")]
    pub deadline: u32,
    pub flags: u32,
    #[serde(rename = "fAmount")]
    pub amount: String,
    #[serde(rename = "fLimitPrice")]
    pub limit_price: String,
    #[serde(rename = "fTriggerPrice")]
    pub trigger_price: String,
    #[serde(rename = "executionTimestamp")]
    pub execution_timestamp: u32,
}

/// Drop a leading `0x`/`0X`, if any.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
