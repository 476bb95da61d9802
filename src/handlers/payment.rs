use crate::{
    error::PaymentError,
    handlers::AppState,
    models::{ApiResponse, IssuedPayment, VerificationResult},
    services::verifier::parse_tx_hash,
};
use axum::{extract::State, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    #[serde(alias = "amountUSD")]
    pub fiat_amount: Option<Decimal>,
    pub fiat_currency: Option<String>,
}

pub async fn create_payment_request(
    State(state): State<AppState>,
    Json(body): Json<CreatePaymentBody>,
) -> Result<Json<ApiResponse<IssuedPayment>>, PaymentError> {
    let fiat_amount = body
        .fiat_amount
        .ok_or_else(|| PaymentError::MissingField("fiatAmount".to_string()))?;
    let fiat_currency = body.fiat_currency.unwrap_or_else(|| "USD".to_string());

    let (issued, cache_hit) = state.payments.issue(fiat_amount, &fiat_currency).await?;
    state.analytics.record_issued(&issued.request).await;

    Ok(Json(ApiResponse {
        success: true,
        data: issued,
        timestamp: Utc::now(),
        cache_hit,
        data_source: "rate-feed".to_string(),
        request_id: Uuid::new_v4().to_string(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentBody {
    pub deeplink: Option<String>,
    pub tx_hash: Option<String>,
}

/// A request that fails its signature check is reported as `invalid`
/// rather than as a transport error, so the caller stops polling.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(body): Json<VerifyPaymentBody>,
) -> Result<Json<ApiResponse<VerificationResult>>, PaymentError> {
    let tx_hash = body
        .tx_hash
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| PaymentError::MissingField("txHash".to_string()))
        .and_then(parse_tx_hash)?;
    let deeplink = body
        .deeplink
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| PaymentError::MissingField("deeplink".to_string()))?;

    let result = match state.payments.open(&deeplink) {
        Ok(request) => state.verifier.verify(&request, tx_hash).await,
        Err(e @ PaymentError::InvalidSignature) => VerificationResult::invalid(Some(tx_hash), &e),
        Err(e) => return Err(e),
    };
    state.analytics.record_verification(&result);

    Ok(Json(ApiResponse {
        success: true,
        data: result,
        timestamp: Utc::now(),
        cache_hit: false,
        data_source: "monad-testnet".to_string(),
        request_id: Uuid::new_v4().to_string(),
    }))
}
