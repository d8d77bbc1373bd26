//! Fee multiplier sources.

use std::sync::Arc;

use alloy::primitives::Address;
use broker_core::{ChainId, RebateSchedule};
use broker_rpc::BalanceReader;
use broker_store::BoxFuture;
use broker_telemetry::Metrics;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::FeeResult;

/// Computes a trader's fee multiplier on one chain.
///
/// Implementations return `1` when nothing reduces the fee.
pub trait MultiplierSource: Send + Sync {
    fn multiplier<'a>(
        &'a self,
        trader: Address,
        chain_id: ChainId,
        schedule: &'a RebateSchedule,
    ) -> BoxFuture<'a, FeeResult<Decimal>>;
}

/// Multiplier from rebate-token holdings.
///
/// A token whose balance cannot be read counts as unqualified, so one
/// unreachable endpoint never fails the whole lookup.
pub struct TokenRebateSource {
    reader: Arc<dyn BalanceReader>,
}

impl TokenRebateSource {
    pub fn new(reader: Arc<dyn BalanceReader>) -> Self {
        Self { reader }
    }
}

impl MultiplierSource for TokenRebateSource {
    fn multiplier<'a>(
        &'a self,
        trader: Address,
        chain_id: ChainId,
        schedule: &'a RebateSchedule,
    ) -> BoxFuture<'a, FeeResult<Decimal>> {
        Box::pin(async move {
            let mut balances = Vec::with_capacity(schedule.tokens.len());
            for token in &schedule.tokens {
                match self.reader.balance_of(chain_id, token, trader).await {
                    Ok(balance) => {
                        debug!(chain_id, token = %token.name, %balance, "Rebate token balance");
                        balances.push((token, balance));
                    }
                    Err(e) => {
                        warn!(
                            chain_id,
                            token = %token.name,
                            error = %e,
                            "Rebate token balance unavailable, token ignored"
                        );
                        Metrics::balance_query_failed(chain_id);
                    }
                }
            }
            Ok(schedule.resolve(balances))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::{RebateTier, RebateToken};
    use broker_rpc::{RpcError, RpcResult};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    /// Balances by token name. Missing names fail the read.
    struct FixedBalances {
        balances: HashMap<String, Decimal>,
        reads: Mutex<Vec<String>>,
    }

    impl FixedBalances {
        fn new(balances: &[(&str, Decimal)]) -> Self {
            Self {
                balances: balances
                    .iter()
                    .map(|(name, b)| (name.to_string(), *b))
                    .collect(),
                reads: Mutex::new(Vec::new()),
            }
        }
    }

    impl BalanceReader for FixedBalances {
        fn balance_of<'a>(
            &'a self,
            _chain_id: ChainId,
            token: &'a RebateToken,
            _owner: Address,
        ) -> BoxFuture<'a, RpcResult<Decimal>> {
            self.reads.lock().push(token.name.clone());
            let result = self
                .balances
                .get(&token.name)
                .copied()
                .ok_or_else(|| RpcError::Unavailable {
                    attempts: 5,
                    last_error: "timeout".into(),
                });
            Box::pin(async move { result })
        }
    }

    fn token(name: &str, tiers: &[(Decimal, Decimal)]) -> RebateToken {
        RebateToken {
            name: name.to_string(),
            address: Address::repeat_byte(7),
            decimals: 18,
            scheme: tiers
                .iter()
                .map(|(amount, m)| RebateTier::new(*amount, *m))
                .collect(),
        }
    }

    fn schedule() -> RebateSchedule {
        RebateSchedule::new(vec![
            token("D8X", &[(dec!(100), dec!(0.9)), (dec!(1000), dec!(0.5))]),
            token("VIP", &[(dec!(1), dec!(0.7))]),
        ])
    }

    #[tokio::test]
    async fn test_lowest_multiplier_across_tokens_wins() {
        let reader = Arc::new(FixedBalances::new(&[("D8X", dec!(500)), ("VIP", dec!(2))]));
        let source = TokenRebateSource::new(reader.clone());
        let m = source
            .multiplier(Address::repeat_byte(1), 1101, &schedule())
            .await
            .unwrap();
        assert_eq!(m, dec!(0.7));
        assert_eq!(*reader.reads.lock(), vec!["D8X", "VIP"]);
    }

    #[tokio::test]
    async fn test_unreadable_token_is_ignored() {
        let reader = Arc::new(FixedBalances::new(&[("D8X", dec!(1500))]));
        let source = TokenRebateSource::new(reader);
        let m = source
            .multiplier(Address::repeat_byte(1), 1101, &schedule())
            .await
            .unwrap();
        assert_eq!(m, dec!(0.5));
    }

    #[tokio::test]
    async fn test_no_qualifying_balance_is_one() {
        let reader = Arc::new(FixedBalances::new(&[("D8X", dec!(0)), ("VIP", dec!(0.5))]));
        let source = TokenRebateSource::new(reader);
        let m = source
            .multiplier(Address::repeat_byte(1), 1101, &schedule())
            .await
            .unwrap();
        assert_eq!(m, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_empty_schedule_reads_nothing() {
        let reader = Arc::new(FixedBalances::new(&[]));
        let source = TokenRebateSource::new(reader.clone());
        let m = source
            .multiplier(Address::repeat_byte(1), 1101, &RebateSchedule::default())
            .await
            .unwrap();
        assert_eq!(m, Decimal::ONE);
        assert!(reader.reads.lock().is_empty());
    }
}
