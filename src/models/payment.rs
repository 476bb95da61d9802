use crate::error::PaymentError;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Native token decimals on Monad.
pub const TOKEN_DECIMALS: u32 = 18;

/// Decimal places shown for token amounts.
pub const TOKEN_DISPLAY_DECIMALS: u32 = 6;

/// A merchant's request for payment. Immutable once signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub recipient: String,
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub rate_units_per_fiat: Decimal,
    pub token_amount: Decimal,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expiry_seconds: u64,
    pub nonce: String,
    pub signature: String,
}

impl PaymentRequest {
    /// Issue time at the millisecond precision the wire format carries.
    pub fn issue_time() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    pub fn fresh_nonce() -> String {
        hex::encode(Uuid::new_v4().as_bytes())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.expiry_seconds)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        self.created_at
            .checked_add_signed(Duration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expired strictly after `created_at + expiry_seconds`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Token amount in wei (18 decimals).
    pub fn token_amount_wei(&self) -> Result<U256, PaymentError> {
        ethers::utils::parse_ether(self.token_amount.to_string())
            .map_err(|e| PaymentError::InvalidAmount(format!("{}: {}", self.token_amount, e)))
    }

    pub fn recipient_address(&self) -> Result<Address, PaymentError> {
        self.recipient
            .parse::<Address>()
            .map_err(|e| PaymentError::MalformedDeeplink(format!("Invalid recipient: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pending,
    Confirmed,
    Invalid,
    Error,
}

impl VerificationStatus {
    /// Confirmed and invalid never change again; pending and error may.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VerificationStatus::Confirmed | VerificationStatus::Invalid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl VerificationResult {
    pub fn pending(tx_hash: Option<H256>, reason: &str) -> Self {
        Self {
            status: VerificationStatus::Pending,
            transaction_hash: tx_hash.map(|h| format!("{:?}", h)),
            reason: Some(reason.to_string()),
            code: None,
            block_number: None,
        }
    }

    pub fn confirmed(tx_hash: H256, block_number: Option<u64>) -> Self {
        Self {
            status: VerificationStatus::Confirmed,
            transaction_hash: Some(format!("{:?}", tx_hash)),
            reason: None,
            code: None,
            block_number,
        }
    }

    pub fn invalid(tx_hash: Option<H256>, error: &PaymentError) -> Self {
        Self::from_error(VerificationStatus::Invalid, tx_hash, error)
    }

    pub fn error(tx_hash: Option<H256>, error: &PaymentError) -> Self {
        Self::from_error(VerificationStatus::Error, tx_hash, error)
    }

    fn from_error(status: VerificationStatus, tx_hash: Option<H256>, error: &PaymentError) -> Self {
        Self {
            status,
            transaction_hash: tx_hash.map(|h| format!("{:?}", h)),
            reason: Some(error.to_string()),
            code: Some(error.error_code().to_string()),
            block_number: None,
        }
    }
}

/// Transaction and receipt data as already fetched from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub block_number: Option<u64>,
    /// Receipt status; `None` while no receipt exists.
    pub succeeded: Option<bool>,
    pub finalized: bool,
}
