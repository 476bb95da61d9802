//! Checks a claimed transaction against a payment request.
//!
//! `pending -> { confirmed | invalid | error }`. `error` covers lookup
//! failures and may be retried; `invalid` never becomes valid later.

use crate::{
    error::PaymentError,
    models::{ObservedTransaction, PaymentRequest, VerificationResult, VerificationStatus},
    services::{CacheService, TransactionSource},
};
use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use std::str::FromStr;
use std::sync::Arc;

/// Allowed deviation is `expected / TOLERANCE_DIVISOR` (0.1%).
const TOLERANCE_DIVISOR: u64 = 1000;

const RESULT_TTL_SECS: u64 = 3600;

pub fn parse_tx_hash(raw: &str) -> Result<H256, PaymentError> {
    let hex_part = raw.trim().trim_start_matches("0x");
    if hex_part.len() != 64 {
        return Err(PaymentError::InvalidTxHash(format!(
            "expected 32 bytes, got {} hex chars",
            hex_part.len()
        )));
    }
    H256::from_str(hex_part).map_err(|e| PaymentError::InvalidTxHash(e.to_string()))
}

/// Compares already-fetched chain data with the request.
pub fn evaluate(
    request: &PaymentRequest,
    observed: &ObservedTransaction,
    now: DateTime<Utc>,
) -> VerificationResult {
    let hash = Some(observed.hash);

    if request.is_expired(now) {
        return VerificationResult::invalid(hash, &PaymentError::Expired);
    }

    match observed.succeeded {
        None => return VerificationResult::pending(hash, "Transaction not yet included"),
        Some(false) => return VerificationResult::invalid(hash, &PaymentError::TransactionFailed),
        Some(true) => {}
    }

    let actual_recipient = observed
        .to
        .map(|to| format!("{:?}", to))
        .unwrap_or_default();
    if !actual_recipient.eq_ignore_ascii_case(request.recipient.trim()) {
        return VerificationResult::invalid(
            hash,
            &PaymentError::RecipientMismatch {
                expected: request.recipient.clone(),
                actual: actual_recipient,
            },
        );
    }

    let expected = match request.token_amount_wei() {
        Ok(wei) => wei,
        Err(e) => return VerificationResult::invalid(hash, &e),
    };
    if !within_tolerance(expected, observed.value) {
        return VerificationResult::invalid(
            hash,
            &PaymentError::AmountMismatch {
                expected: expected.to_string(),
                actual: observed.value.to_string(),
            },
        );
    }

    if !observed.finalized {
        return VerificationResult::pending(hash, "Awaiting finality");
    }

    VerificationResult::confirmed(observed.hash, observed.block_number)
}

fn within_tolerance(expected: U256, actual: U256) -> bool {
    let tolerance = expected / U256::from(TOLERANCE_DIVISOR);
    let difference = if expected > actual {
        expected - actual
    } else {
        actual - expected
    };
    difference <= tolerance
}

pub struct PaymentVerifier {
    source: Arc<dyn TransactionSource>,
    cache: Arc<CacheService>,
}

impl PaymentVerifier {
    pub fn new(source: Arc<dyn TransactionSource>, cache: Arc<CacheService>) -> Self {
        Self { source, cache }
    }

    pub async fn verify(&self, request: &PaymentRequest, tx_hash: H256) -> VerificationResult {
        self.verify_at(request, tx_hash, Utc::now()).await
    }

    pub async fn verify_at(
        &self,
        request: &PaymentRequest,
        tx_hash: H256,
        now: DateTime<Utc>,
    ) -> VerificationResult {
        // Stale requests are refused before touching the chain.
        if request.is_expired(now) {
            tracing::info!(
                "Payment request {} expired at {}",
                request.transaction_id,
                request.expires_at()
            );
            return VerificationResult::invalid(Some(tx_hash), &PaymentError::Expired);
        }

        let cache_key = format!("verification:{}:{:?}", request.transaction_id, tx_hash);
        if let Some(cached) = self
            .cache
            .get::<VerificationResult>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            tracing::debug!("Returning cached verification for {:?}", tx_hash);
            return cached;
        }

        let result = match self.source.lookup(tx_hash).await {
            Ok(Some(observed)) => evaluate(request, &observed, now),
            Ok(None) => VerificationResult::pending(Some(tx_hash), "Transaction not found"),
            Err(e) => {
                tracing::warn!("Lookup of {:?} failed: {}", tx_hash, e);
                let e = match e {
                    e @ PaymentError::TransientLookupFailure(_) => e,
                    other => PaymentError::TransientLookupFailure(other.to_string()),
                };
                VerificationResult::error(Some(tx_hash), &e)
            }
        };

        match result.status {
            VerificationStatus::Confirmed => tracing::info!(
                "Payment {} confirmed by {:?} in block {:?}",
                request.transaction_id,
                tx_hash,
                result.block_number
            ),
            VerificationStatus::Invalid => tracing::warn!(
                "Payment {} rejected for {:?}: {}",
                request.transaction_id,
                tx_hash,
                result.reason.as_deref().unwrap_or_default()
            ),
            _ => {}
        }

        if result.status.is_terminal() {
            if let Err(e) = self.cache.set(&cache_key, &result, RESULT_TTL_SECS).await {
                tracing::warn!("Failed to cache verification result: {}", e);
            }
        }

        result
    }
}
