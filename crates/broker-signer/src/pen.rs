//! `SignaturePen`: the broker signing engine.
//!
//! Order flow:
//! 1. `sign_order` signs `{iPerpetualId, brokerFeeTbps, traderAddr, iDeadline}`
//!    under the chain's "Perpetual Trade Manager" domain
//! 2. the signature and broker address are written back into the order
//! 3. `build_order_digest_and_id` hashes the full order (signature included)
//!    under the same domain; the order id is the EIP-191 prefixed hash of
//!    that digest
//!
//! Payment flow: the executor's signature over the payment summary is
//! recovered under the chain's "Multipay" domain, and the broker countersigns
//! the same digest.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{aliases::U24, eip191_hash_message, Address, PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use alloy::sol_types::SolStruct;
use tracing::{debug, info};

use broker_core::{
    ChainConfig, ChainId, ChainRegistry, ClientOrder, PaymentSignatureRequest, PaymentSummary,
    SignedOrderResponse,
};
use broker_telemetry::Metrics;

use crate::error::{SignerError, SignerResult};
use crate::typed::{self, broker_order, client_order};
use crate::wallet::Wallet;

const U24_MAX: u32 = (1 << 24) - 1;

/// Broker authorization for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSignature {
    pub digest: B256,
    pub signature: PrimitiveSignature,
}

/// Digest of a fully signed order and the id it is relayed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDigest {
    pub digest: B256,
    /// Lowercase hex without `0x`.
    pub order_id: String,
}

/// Per-chain broker wallets plus the registry that scopes their signatures.
#[derive(Debug, Clone)]
pub struct SignaturePen {
    registry: Arc<ChainRegistry>,
    wallets: HashMap<ChainId, Wallet>,
}

impl SignaturePen {
    /// One signing wallet per registered chain, all from the same key.
    pub fn new(registry: Arc<ChainRegistry>, broker_key: PrivateKeySigner) -> Self {
        let wallets = registry
            .chain_ids()
            .into_iter()
            .map(|chain_id| {
                info!(chain_id, "Broker wallet ready");
                (chain_id, Wallet::new(chain_id, broker_key.clone()))
            })
            .collect();
        Self { registry, wallets }
    }

    /// Observer-only wallets: the broker address is known but nothing can be signed.
    pub fn observer(registry: Arc<ChainRegistry>, broker_address: Address) -> Self {
        let wallets = registry
            .chain_ids()
            .into_iter()
            .map(|chain_id| (chain_id, Wallet::observer(chain_id, broker_address)))
            .collect();
        Self { registry, wallets }
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    pub fn wallet(&self, chain_id: ChainId) -> SignerResult<&Wallet> {
        self.wallets
            .get(&chain_id)
            .ok_or(SignerError::NoWalletForChain(chain_id))
    }

    /// Broker address. Identical on every chain.
    pub fn broker_address(&self) -> Option<Address> {
        self.wallets.values().next().map(Wallet::address)
    }

    fn chain(&self, chain_id: ChainId) -> SignerResult<&ChainConfig> {
        self.registry
            .get(chain_id)
            .ok_or(SignerError::NoWalletForChain(chain_id))
    }

    /// Sign the broker authorization for `order` on `chain_id`.
    pub async fn sign_order(
        &self,
        order: &ClientOrder,
        chain_id: ChainId,
    ) -> SignerResult<OrderSignature> {
        let wallet = self.wallet(chain_id)?;
        let key = wallet.signing_key()?;
        let chain = self.chain(chain_id)?;

        let auth = broker_order::Order {
            iPerpetualId: perpetual_id(order.perpetual_id)?,
            brokerFeeTbps: order.broker_fee_tbps,
            traderAddr: order.trader_addr,
            iDeadline: order.deadline,
        };
        let domain = typed::trade_manager_domain(chain_id, chain.proxy_contract);
        let digest = auth.eip712_signing_hash(&domain);
        let signature = key.sign_hash(&digest).await?;

        Metrics::signature_issued("order");
        debug!(
            chain_id,
            perpetual_id = order.perpetual_id,
            fee_tbps = order.broker_fee_tbps,
            "Order authorization signed"
        );
        Ok(OrderSignature { digest, signature })
    }

    /// Digest and id of an order whose broker signature is already filled in.
    ///
    /// Pure function of the order fields and `chain_id`.
    pub fn build_order_digest_and_id(
        &self,
        order: &ClientOrder,
        chain_id: ChainId,
    ) -> SignerResult<OrderDigest> {
        let chain = self.chain(chain_id)?;
        let full = client_order::Order {
            iPerpetualId: perpetual_id(order.perpetual_id)?,
            brokerFeeTbps: order.broker_fee_tbps,
            traderAddr: order.trader_addr,
            brokerAddr: order.broker_addr,
            fAmount: parse_int("fAmount", &order.amount)?,
            fLimitPrice: parse_int("fLimitPrice", &order.limit_price)?,
            fTriggerPrice: parse_int("fTriggerPrice", &order.trigger_price)?,
            iDeadline: order.deadline,
            flags: order.flags,
            leverageTDR: order.leverage_tdr,
            executionTimestamp: order.execution_timestamp,
            brokerSignature: order.broker_signature.clone(),
        };
        let domain = typed::trade_manager_domain(chain_id, chain.proxy_contract);
        let digest = full.eip712_signing_hash(&domain);
        let order_id = hex::encode(eip191_hash_message(digest));
        Ok(OrderDigest { digest, order_id })
    }

    /// Sign, fill in the broker fields, and derive digest and id.
    ///
    /// `order.broker_fee_tbps` must already hold the fee to authorize.
    pub async fn sign_client_order(
        &self,
        mut order: ClientOrder,
        chain_id: ChainId,
    ) -> SignerResult<SignedOrderResponse> {
        // Fail on malformed amounts before spending a signature.
        for (field, value) in [
            ("fAmount", &order.amount),
            ("fLimitPrice", &order.limit_price),
            ("fTriggerPrice", &order.trigger_price),
        ] {
            parse_int(field, value)?;
        }

        let signed = self.sign_order(&order, chain_id).await?;
        order.broker_signature = signed.signature.as_bytes().to_vec().into();
        order.broker_addr = self.wallet(chain_id)?.address();

        let OrderDigest { digest, order_id } = self.build_order_digest_and_id(&order, chain_id)?;
        Ok(SignedOrderResponse {
            order,
            chain_id,
            broker_signature: encode_signature(&signed.signature),
            order_digest: digest.to_string(),
            order_id,
        })
    }

    /// Executor-side signature over a payment summary.
    ///
    /// Independent of the wallet registry; the caller supplies the key.
    pub async fn sign_payment(
        summary: &PaymentSummary,
        executor: &PrivateKeySigner,
    ) -> SignerResult<PrimitiveSignature> {
        let digest = payment_digest(summary);
        Ok(executor.sign_hash(&digest).await?)
    }

    /// Recover the executor address behind `request.executor_signature`.
    ///
    /// The multipay contract check happens before any recovery work.
    pub fn recover_payment_signer(&self, request: &PaymentSignatureRequest) -> SignerResult<Address> {
        self.check_multipay(&request.payment)?;
        let bytes = decode_hex(&request.executor_signature)?;
        recover_evm_address(&payment_digest(&request.payment), &bytes)
    }

    /// Broker countersignature for a payment, `0x`-prefixed hex.
    pub async fn broker_payment_signature(
        &self,
        request: &PaymentSignatureRequest,
    ) -> SignerResult<String> {
        let chain_id = self.check_multipay(&request.payment)?;
        let key = self.wallet(chain_id)?.signing_key()?;
        let signature = key.sign_hash(&payment_digest(&request.payment)).await?;
        Metrics::signature_issued("payment");
        Ok(encode_signature(&signature))
    }

    fn check_multipay(&self, payment: &PaymentSummary) -> SignerResult<ChainId> {
        let chain = self.chain(payment.chain_id)?;
        if !chain.matches_multipay(&payment.multipay_contract) {
            Metrics::sign_rejected("payment", "contract_mismatch");
            return Err(SignerError::MultiPayContractMismatch {
                chain_id: payment.chain_id,
                expected: chain.multipay_contract,
            });
        }
        Ok(payment.chain_id)
    }
}

/// EIP-712 digest of a payment summary under its chain's multipay domain.
pub fn payment_digest(summary: &PaymentSummary) -> B256 {
    let domain = typed::multipay_domain(summary.chain_id, summary.multipay_contract);
    typed::PaymentSummary::from(summary).eip712_signing_hash(&domain)
}

/// Recover the signer of a 65-byte `r || s || v` signature over `digest`.
pub fn recover_evm_address(digest: &B256, signature: &[u8]) -> SignerResult<Address> {
    let signature = PrimitiveSignature::try_from(signature)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    signature
        .recover_address_from_prehash(digest)
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))
}

/// `0x`-prefixed `r || s || v` with `v` in {27, 28}.
pub fn encode_signature(signature: &PrimitiveSignature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}

fn decode_hex(s: &str) -> SignerResult<Vec<u8>> {
    hex::decode(broker_core::strip_hex_prefix(s.trim()))
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))
}

fn perpetual_id(id: u32) -> SignerResult<U24> {
    if id > U24_MAX {
        return Err(SignerError::PerpetualIdOutOfRange(id));
    }
    Ok(U24::from(id))
}

fn parse_int(field: &'static str, value: &str) -> SignerResult<i128> {
    value
        .parse::<i128>()
        .map_err(|_| SignerError::InvalidNumericField {
            field,
            value: value.to_string(),
        })
}
