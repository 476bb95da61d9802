use crate::{
    models::{PaymentRequest, Stats, VerificationResult, VerificationStatus},
    services::CacheService,
};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct Analytics {
    cache: Arc<CacheService>,
    requests_issued: AtomicU64,
    verifications: AtomicU64,
    confirmed: AtomicU64,
    invalid: AtomicU64,
    start_time: Instant,
}

impl Analytics {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self {
            cache,
            requests_issued: AtomicU64::new(0),
            verifications: AtomicU64::new(0),
            confirmed: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    fn today_key() -> String {
        format!("analytics:requests:{}", Utc::now().format("%Y-%m-%d"))
    }

    pub async fn record_issued(&self, request: &PaymentRequest) {
        self.requests_issued.fetch_add(1, Ordering::SeqCst);
        let _ = self.cache.increment(&Self::today_key(), 1).await;

        tracing::info!(
            "Payment request {} issued: {} {} -> {} MON to {}",
            request.transaction_id,
            request.fiat_amount,
            request.fiat_currency,
            request.token_amount,
            request.recipient
        );
    }

    pub fn record_verification(&self, result: &VerificationResult) {
        self.verifications.fetch_add(1, Ordering::SeqCst);
        match result.status {
            VerificationStatus::Confirmed => {
                self.confirmed.fetch_add(1, Ordering::SeqCst);
            }
            VerificationStatus::Invalid => {
                self.invalid.fetch_add(1, Ordering::SeqCst);
            }
            VerificationStatus::Pending | VerificationStatus::Error => {}
        }
    }

    pub async fn get_stats(&self) -> Stats {
        let requests_today = self
            .cache
            .increment(&Self::today_key(), 0)
            .await
            .unwrap_or(0)
            .max(0) as u64;

        Stats {
            requests_issued: self.requests_issued.load(Ordering::SeqCst),
            requests_today,
            verifications: self.verifications.load(Ordering::SeqCst),
            confirmed: self.confirmed.load(Ordering::SeqCst),
            invalid: self.invalid.load(Ordering::SeqCst),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
