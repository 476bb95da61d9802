use crate::models::PaymentRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub cache_hit: bool,
    pub data_source: String,
    pub request_id: String,
}

/// An issued payment request together with its encodings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IssuedPayment {
    pub request: PaymentRequest,
    pub deeplink: String,
    pub wallet_link: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentQr {
    pub deeplink: String,
    pub qr_text: String,
    pub transaction_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub redis: bool,
    pub monad_rpc: bool,
    pub head_block: Option<u64>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Stats {
    pub requests_issued: u64,
    pub requests_today: u64,
    pub verifications: u64,
    pub confirmed: u64,
    pub invalid: u64,
    pub uptime_seconds: u64,
}
