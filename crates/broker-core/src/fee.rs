//! Tiered rebate schedule and cached fee records.
//!
//! A rebate token carries a list of `{amount, multiplier}` tiers sorted by
//! ascending threshold. A balance resolves to the multiplier of the highest
//! threshold it meets; across tokens the lowest multiplier wins.

use alloy::primitives::Address;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::ChainId;

/// One balance threshold and the fee multiplier it unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebateTier {
    pub amount: Decimal,
    #[serde(alias = "feeMultiplier")]
    pub multiplier: Decimal,
}

impl RebateTier {
    pub fn new(amount: Decimal, multiplier: Decimal) -> Self {
        Self { amount, multiplier }
    }
}

/// An ERC-20 token whose holdings reduce the broker fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebateToken {
    pub name: String,
    pub address: Address,
    pub decimals: u8,
    pub scheme: Vec<RebateTier>,
}

impl RebateToken {
    /// Multiplier for `balance`, or `None` when no tier qualifies.
    pub fn resolve(&self, balance: Decimal) -> Option<Decimal> {
        self.scheme
            .iter()
            .rev()
            .find(|tier| balance >= tier.amount)
            .map(|tier| tier.multiplier)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self
            .scheme
            .windows(2)
            .any(|pair| pair[0].amount > pair[1].amount)
        {
            return Err(format!(
                "rebate token {} tiers must be sorted by ascending amount",
                self.name
            ));
        }
        if self.scheme.iter().any(|t| t.multiplier.is_sign_negative()) {
            return Err(format!(
                "rebate token {} has a negative multiplier",
                self.name
            ));
        }
        Ok(())
    }
}

/// All rebate tokens configured for one chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebateSchedule {
    pub tokens: Vec<RebateToken>,
}

impl RebateSchedule {
    pub fn new(tokens: Vec<RebateToken>) -> Self {
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Lowest multiplier across `(token, balance)` pairs, defaulting to one.
    ///
    /// Zero balances never qualify, even against a zero threshold.
    pub fn resolve<'a, I>(&self, balances: I) -> Decimal
    where
        I: IntoIterator<Item = (&'a RebateToken, Decimal)>,
    {
        balances
            .into_iter()
            .filter(|(_, balance)| !balance.is_zero())
            .filter_map(|(token, balance)| token.resolve(balance))
            .fold(Decimal::ONE, |acc, m| acc.min(m))
    }
}

/// Cached fee multiplier for one trader on one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraderFeeRecord {
    pub trader_addr: String,
    pub chain_id: ChainId,
    #[serde(rename = "feeMultiplier")]
    pub multiplier: Decimal,
    /// Unix seconds at which the multiplier was computed.
    pub timestamp: i64,
}

impl TraderFeeRecord {
    pub fn new(trader_addr: &str, chain_id: ChainId, multiplier: Decimal, timestamp: i64) -> Self {
        Self {
            trader_addr: trader_addr.to_lowercase(),
            chain_id,
            multiplier,
            timestamp,
        }
    }

    /// True once `soft_ttl_secs` have elapsed since computation.
    pub fn is_stale(&self, now: i64, soft_ttl_secs: u64) -> bool {
        now.saturating_sub(self.timestamp) > soft_ttl_secs as i64
    }

    /// Apply the multiplier to a base fee, truncating toward zero.
    pub fn apply(&self, base_fee_tbps: u16) -> u16 {
        apply_multiplier(base_fee_tbps, self.multiplier)
    }
}

/// `base * multiplier`, truncated and clamped into `u16`.
pub fn apply_multiplier(base_fee_tbps: u16, multiplier: Decimal) -> u16 {
    (Decimal::from(base_fee_tbps) * multiplier)
        .trunc()
        .to_u16()
        .unwrap_or(base_fee_tbps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn token(name: &str, scheme: Vec<RebateTier>) -> RebateToken {
        RebateToken {
            name: name.to_string(),
            address: Address::ZERO,
            decimals: 18,
            scheme,
        }
    }

    fn two_tier() -> RebateToken {
        token(
            "D8X",
            vec![
                RebateTier::new(dec!(100), dec!(0.9)),
                RebateTier::new(dec!(1000), dec!(0.5)),
            ],
        )
    }

    #[test]
    fn test_tier_monotonicity() {
        let t = two_tier();
        let schedule = RebateSchedule::new(vec![t.clone()]);
        assert_eq!(schedule.resolve([(&t, dec!(500))]), dec!(0.9));
        assert_eq!(schedule.resolve([(&t, dec!(1500))]), dec!(0.5));
        assert_eq!(schedule.resolve([(&t, dec!(1000))]), dec!(0.5));
        assert_eq!(schedule.resolve([(&t, dec!(0))]), Decimal::ONE);
        assert_eq!(schedule.resolve([(&t, dec!(99.99))]), Decimal::ONE);
    }

    #[test]
    fn test_lowest_multiplier_wins_across_tokens() {
        let a = two_tier();
        let b = token("OTHER", vec![RebateTier::new(dec!(1), dec!(0.7))]);
        let schedule = RebateSchedule::new(vec![a.clone(), b.clone()]);
        assert_eq!(schedule.resolve([(&a, dec!(150)), (&b, dec!(5))]), dec!(0.7));
        assert_eq!(schedule.resolve([(&a, dec!(2000)), (&b, dec!(5))]), dec!(0.5));
    }

    #[test]
    fn test_unsorted_tiers_rejected() {
        let t = token(
            "BAD",
            vec![
                RebateTier::new(dec!(1000), dec!(0.5)),
                RebateTier::new(dec!(100), dec!(0.9)),
            ],
        );
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_record_staleness_and_apply() {
        let record = TraderFeeRecord::new("0xABCD", 1101, dec!(0.5), 1_000);
        assert_eq!(record.trader_addr, "0xabcd");
        assert!(!record.is_stale(1_000 + 3_600, 3_600));
        assert!(record.is_stale(1_000 + 3_601, 3_600));
        assert_eq!(record.apply(60), 30);
        assert_eq!(apply_multiplier(61, dec!(0.5)), 30);
    }

    #[test]
    fn test_record_json_shape() {
        let record = TraderFeeRecord::new("0xabcd", 1101, dec!(0.9), 1_700_000_000);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"feeMultiplier\""));
        assert!(json.contains("\"timestamp\":1700000000"));
        let back: TraderFeeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
