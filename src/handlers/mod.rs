pub mod dashboard;
pub mod health;
pub mod payment;
pub mod qr;
pub mod rate;
pub mod stats;

pub use dashboard::*;
pub use health::*;
pub use payment::*;
pub use qr::*;
pub use rate::*;
pub use stats::*;

use crate::services::{
    Analytics, CacheService, PaymentService, PaymentVerifier, RateService, TransactionSource,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub rates: Arc<RateService>,
    pub verifier: Arc<PaymentVerifier>,
    pub chain: Arc<dyn TransactionSource>,
    pub cache: Arc<CacheService>,
    pub analytics: Arc<Analytics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/ws/dashboard", get(websocket_handler))
        .route("/api/rate", get(get_rate))
        .route("/api/create-payment-request", post(create_payment_request))
        .route("/api/qr", post(generate_qr))
        .route("/api/verify-payment", post(verify_payment))
        .with_state(state)
}
