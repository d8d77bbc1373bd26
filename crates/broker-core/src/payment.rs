//! Executor payment types.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chain::ChainId;

/// Payment summary signed by an executor and countersigned by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub payer: Address,
    pub executor: Address,
    pub token: Address,
    pub timestamp: u32,
    pub id: u32,
    #[serde(
        rename = "totalAmount",
        serialize_with = "serialize_u256_dec",
        deserialize_with = "deserialize_u256_flexible"
    )]
    pub total_amount: U256,
    #[serde(rename = "chainId")]
    pub chain_id: ChainId,
    #[serde(rename = "multiPayCtrct")]
    pub multipay_contract: Address,
}

/// Body of `POST /sign-payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSignatureRequest {
    pub payment: PaymentSummary,
    /// Executor signature over the payment summary, `0x`-prefixed hex.
    #[serde(rename = "signature")]
    pub executor_signature: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Num(u64),
    Str(String),
}

fn deserialize_u256_flexible<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(U256::from(n)),
        NumOrString::Str(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16),
                None => U256::from_str_radix(s, 10),
            };
            parsed.map_err(serde::de::Error::custom)
        }
    }
}

fn serialize_u256_dec<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}
