use crate::{
    config::PollSettings,
    models::{PaymentRequest, VerificationResult, VerificationStatus},
    services::PaymentVerifier,
};
use ethers::types::H256;
use std::sync::Arc;
use tokio::time::{interval, sleep_until, timeout_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub result: VerificationResult,
    pub attempts: u32,
    /// True when polling stopped on the attempt or time budget rather than
    /// on a terminal result.
    pub exhausted: bool,
}

impl PollOutcome {
    /// Whether waiting longer could still change the answer.
    pub fn may_still_confirm(&self) -> bool {
        !self.result.status.is_terminal()
    }
}

/// Re-checks one payment at a fixed interval until it settles or the budget
/// runs out. One check is in flight at a time.
pub struct PaymentPoller {
    verifier: Arc<PaymentVerifier>,
    settings: PollSettings,
}

impl PaymentPoller {
    pub fn new(verifier: Arc<PaymentVerifier>, settings: PollSettings) -> Self {
        Self { verifier, settings }
    }

    pub async fn watch(&self, request: &PaymentRequest, tx_hash: H256) -> PollOutcome {
        let deadline = Instant::now() + self.settings.timeout;
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts = 0;
        let mut last = VerificationResult::pending(Some(tx_hash), "Not checked yet");

        loop {
            // A tick landing exactly on the deadline does not count.
            tokio::select! {
                biased;
                _ = sleep_until(deadline) => {
                    tracing::info!("Stopped polling {:?} at timeout after {} attempts", tx_hash, attempts);
                    return PollOutcome { result: last, attempts, exhausted: true };
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            last = match timeout_at(deadline, self.verifier.verify(request, tx_hash)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::info!("Verification of {:?} cut off by timeout", tx_hash);
                    return PollOutcome {
                        result: last,
                        attempts,
                        exhausted: true,
                    };
                }
            };

            tracing::debug!(
                "Poll {}/{} for {:?}: {:?}",
                attempts,
                self.settings.max_attempts,
                tx_hash,
                last.status
            );

            if last.status.is_terminal() {
                return PollOutcome {
                    result: last,
                    attempts,
                    exhausted: false,
                };
            }

            if last.status == VerificationStatus::Error {
                tracing::warn!(
                    "Transient failure checking {:?}, retrying: {}",
                    tx_hash,
                    last.reason.as_deref().unwrap_or_default()
                );
            }

            if attempts >= self.settings.max_attempts {
                tracing::info!("Stopped polling {:?} after {} attempts", tx_hash, attempts);
                return PollOutcome {
                    result: last,
                    attempts,
                    exhausted: true,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObservedTransaction;
    use crate::services::{CacheService, InMemoryLedger};
    use chrono::Utc;
    use ethers::types::{Address, U256};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    fn request() -> PaymentRequest {
        PaymentRequest {
            recipient: format!("{:?}", Address::repeat_byte(0x11)),
            fiat_amount: dec!(5),
            fiat_currency: "USD".to_string(),
            rate_units_per_fiat: dec!(2.0),
            token_amount: dec!(10.000000),
            transaction_id: Uuid::new_v4(),
            created_at: Utc::now(),
            expiry_seconds: 3600,
            nonce: "n".to_string(),
            signature: String::new(),
        }
    }

    fn settled(hash: H256, value: U256) -> ObservedTransaction {
        ObservedTransaction {
            hash,
            from: Address::repeat_byte(0x22),
            to: Some(Address::repeat_byte(0x11)),
            value,
            block_number: Some(7),
            succeeded: Some(true),
            finalized: true,
        }
    }

    fn poller(ledger: Arc<InMemoryLedger>, max_attempts: u32, timeout_secs: u64) -> PaymentPoller {
        let verifier = Arc::new(PaymentVerifier::new(
            ledger,
            Arc::new(CacheService::memory_only()),
        ));
        PaymentPoller::new(
            verifier,
            PollSettings {
                interval: Duration::from_secs(5),
                max_attempts,
                timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_confirmed() {
        let ledger = Arc::new(InMemoryLedger::new());
        let hash = H256::repeat_byte(0x01);
        ledger.record(settled(hash, U256::from(10u64) * U256::exp10(18))).await;
        ledger.fail_next(2);

        let outcome = poller(ledger, 10, 300).watch(&request(), hash).await;

        assert_eq!(outcome.result.status, VerificationStatus::Confirmed);
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_immediately_on_invalid() {
        let ledger = Arc::new(InMemoryLedger::new());
        let hash = H256::repeat_byte(0x02);
        ledger.record(settled(hash, U256::exp10(18))).await;

        let outcome = poller(ledger, 10, 300).watch(&request(), hash).await;

        assert_eq!(outcome.result.status, VerificationStatus::Invalid);
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.may_still_confirm());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let ledger = Arc::new(InMemoryLedger::new());
        let outcome = poller(ledger, 4, 300)
            .watch(&request(), H256::repeat_byte(0x03))
            .await;

        assert_eq!(outcome.result.status, VerificationStatus::Pending);
        assert_eq!(outcome.attempts, 4);
        assert!(outcome.exhausted);
        assert!(outcome.may_still_confirm());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_wall_clock_timeout() {
        let ledger = Arc::new(InMemoryLedger::new());
        // 12s budget at a 5s interval allows ticks at 0s, 5s and 10s.
        let outcome = poller(ledger, 100, 12)
            .watch(&request(), H256::repeat_byte(0x04))
            .await;

        assert!(outcome.exhausted);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_on_the_deadline_is_not_polled() {
        // Ticks at 0s and 5s; the 10s tick coincides with the deadline.
        for _ in 0..20 {
            let ledger = Arc::new(InMemoryLedger::new());
            let outcome = poller(ledger, 100, 10)
                .watch(&request(), H256::repeat_byte(0x05))
                .await;

            assert!(outcome.exhausted);
            assert_eq!(outcome.attempts, 2);
        }
    }
}
