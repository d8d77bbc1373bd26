//! Shared handler state.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use broker_core::{ChainId, ChainRegistry, RebateSchedule};
use broker_fee::FeeCache;
use broker_relay::OrderRelay;
use broker_rpc::TokenApproval;
use broker_signer::SignaturePen;

/// Collaborators shared by every request.
#[derive(Clone)]
pub struct ApiState {
    pub(crate) pen: Arc<SignaturePen>,
    pub(crate) fees: FeeCache,
    pub(crate) relay: OrderRelay,
    pub(crate) approvals: Arc<dyn TokenApproval>,
    schedules: Arc<HashMap<ChainId, RebateSchedule>>,
    base_fee_tbps: u16,
}

impl ApiState {
    pub fn new(
        pen: Arc<SignaturePen>,
        fees: FeeCache,
        relay: OrderRelay,
        approvals: Arc<dyn TokenApproval>,
        base_fee_tbps: u16,
    ) -> Self {
        let schedules = pen
            .registry()
            .iter()
            .map(|chain| {
                (
                    chain.chain_id,
                    RebateSchedule::new(chain.rebate_tokens.clone()),
                )
            })
            .collect();
        Self {
            pen,
            fees,
            relay,
            approvals,
            schedules: Arc::new(schedules),
            base_fee_tbps,
        }
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        self.pen.registry()
    }

    pub fn base_fee_tbps(&self) -> u16 {
        self.base_fee_tbps
    }

    /// Fee quoted to `trader` on `chain_id`.
    ///
    /// Unknown chains and the zero address get the base fee without
    /// touching the cache.
    pub async fn broker_fee_tbps(&self, trader: Address, chain_id: ChainId) -> u16 {
        let Some(schedule) = self.schedules.get(&chain_id) else {
            return self.base_fee_tbps;
        };
        if trader.is_zero() {
            return self.base_fee_tbps;
        }
        self.fees
            .effective_fee(trader, chain_id, self.base_fee_tbps, schedule)
            .await
    }
}
