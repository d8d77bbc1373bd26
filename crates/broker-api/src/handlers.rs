//! Route handlers.
//!
//! Bodies are taken as raw bytes and parsed here so that any malformed
//! payload, whatever its content type, answers with the usage message.

use alloy::primitives::Address;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use broker_core::{ChainId, PaymentSignatureRequest, SignOrderRequest, SignedOrderResponse};
use broker_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

const SIGN_ORDER_USAGE: &str = concat!(
    "Wrong argument types. Usage: ",
    "{'order': {'traderAddr': '0xABCD..', 'iDeadline': 1688347462, 'iPerpetualId': 10001},",
    "'chainId': 80001}"
);

const ORDER_SUBMITTED_USAGE: &str =
    r#"Wrong argument types. Usage: { "orderIds": "[0xABCE...,...]"}"#;

const SIGN_PAYMENT_USAGE: &str = concat!(
    "Wrong argument types. Usage: {",
    "'payment': {",
    "'payer': '0x4Fdc785fe2C6812960C93CA2F9D12b5Bd21ea2a1', ",
    "'executor': '0xDa47a0CAc77D50114F2725D06a2Ce887cF9f4D98', ",
    "'token': '0x2d10075E54356E16Ebd5C6BB5194290709B69C1e', ",
    "'timestamp': 1691249493, ",
    "'id': 1,",
    "'totalAmount': '1000000000000000000',",
    "'chainId': 80001,",
    "'multiPayCtrct': '0x30b55550e02B663E15A95B50850ebD20363c2AD5'",
    "},",
    "'signature': '0xABCE...'",
    "}"
);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerAddressResponse {
    pub broker_addr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerFeeResponse {
    pub broker_fee_tbps: u16,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSignatureResponse {
    pub broker_signature: String,
}

/// Public view of one registry entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfigView {
    pub chain_id: ChainId,
    pub name: String,
    pub allowed_executors: Vec<Address>,
    pub multi_pay_contract: Address,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrokerFeeQuery {
    #[serde(default)]
    pub addr: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderSubmittedRequest {
    #[serde(rename = "orderIds")]
    order_ids: Vec<String>,
}

pub async fn broker_address(State(state): State<ApiState>) -> Json<BrokerAddressResponse> {
    let broker_addr = state
        .pen
        .broker_address()
        .map(|a| a.to_checksum(None))
        .unwrap_or_default();
    Json(BrokerAddressResponse { broker_addr })
}

pub async fn broker_fee(
    State(state): State<ApiState>,
    Query(query): Query<BrokerFeeQuery>,
) -> Json<BrokerFeeResponse> {
    let chain_id = query.chain.as_deref().and_then(|c| c.trim().parse::<ChainId>().ok());
    let trader = query
        .addr
        .as_deref()
        .and_then(|a| a.trim().parse::<Address>().ok());

    let broker_fee_tbps = match (trader, chain_id) {
        (Some(trader), Some(chain_id)) => state.broker_fee_tbps(trader, chain_id).await,
        _ => state.base_fee_tbps(),
    };
    Json(BrokerFeeResponse { broker_fee_tbps })
}

pub async fn chain_config(State(state): State<ApiState>) -> Json<Vec<ChainConfigView>> {
    let mut chains: Vec<ChainConfigView> = state
        .registry()
        .iter()
        .map(|c| ChainConfigView {
            chain_id: c.chain_id,
            name: c.name.clone(),
            allowed_executors: c.allowed_executors.clone(),
            multi_pay_contract: c.multipay_contract,
        })
        .collect();
    chains.sort_by_key(|c| c.chain_id);
    Json(chains)
}

pub async fn sign_order(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<SignedOrderResponse>> {
    let mut req: SignOrderRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Validation(SIGN_ORDER_USAGE.to_string()))?;
    if let Err(e) = req.check_data() {
        Metrics::sign_rejected("order", "validation");
        return Err(e.into());
    }

    let chain_id = req.chain_id;
    req.order.broker_fee_tbps = state.broker_fee_tbps(req.order.trader_addr, chain_id).await;
    info!(
        chain_id,
        perpetual_id = req.order.perpetual_id,
        deadline = req.order.deadline,
        fee_tbps = req.order.broker_fee_tbps,
        "Order signature request"
    );

    let signed = state
        .pen
        .sign_client_order(req.order, chain_id)
        .await
        .map_err(|e| {
            error!(chain_id, error = %e, "Order signing failed");
            ApiError::from(e)
        })?;
    state
        .relay
        .stage(&signed.order, &signed.order_id, chain_id)
        .await?;
    Ok(Json(signed))
}

pub async fn order_submitted(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let req: OrderSubmittedRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Validation(ORDER_SUBMITTED_USAGE.to_string()))?;
    if req.order_ids.is_empty() {
        return Err(ApiError::Validation(ORDER_SUBMITTED_USAGE.to_string()));
    }
    state.relay.mark_submitted(&req.order_ids).await.map_err(|e| {
        warn!(error = %e, "Order submission rejected");
        ApiError::from(e)
    })?;
    Ok(Json(json!({ "orders-submitted": "success" })))
}

pub async fn sign_payment(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<PaymentSignatureResponse>> {
    let req: PaymentSignatureRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Malformed payment signature request");
        ApiError::Validation(SIGN_PAYMENT_USAGE.to_string())
    })?;
    let payment = &req.payment;

    let signer = state.pen.recover_payment_signer(&req).map_err(|e| {
        error!(chain_id = payment.chain_id, error = %e, "Payment signer recovery failed");
        ApiError::from(e)
    })?;
    if signer != payment.executor {
        Metrics::sign_rejected("payment", "wrong_signature");
        error!(chain_id = payment.chain_id, "Payment signed by someone other than the executor");
        return Err(ApiError::SignatureMismatch);
    }

    // Recovery already verified the chain is registered.
    let chain = state.registry().require(payment.chain_id)?;
    if !chain.is_allowed_executor(&signer) {
        Metrics::sign_rejected("payment", "executor_not_allowed");
        error!(chain_id = payment.chain_id, executor = %signer, "Executor not whitelisted");
        return Err(ApiError::ExecutorNotAllowed);
    }

    if let Err(e) = state.approvals.ensure_approved(chain, payment.token).await {
        Metrics::sign_rejected("payment", "approval");
        error!(
            chain_id = payment.chain_id,
            token = %payment.token,
            error = %e,
            "Token approval failed"
        );
        return Err(ApiError::ApprovalFailed);
    }

    let broker_signature = state.pen.broker_payment_signature(&req).await?;
    info!(
        chain_id = payment.chain_id,
        executor = %payment.executor,
        payment_id = payment.id,
        "Payment countersigned"
    );
    Ok(Json(PaymentSignatureResponse { broker_signature }))
}

pub async fn metrics() -> ApiResult<impl IntoResponse> {
    let body = broker_telemetry::gather_text()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
