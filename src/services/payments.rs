use crate::{
    error::PaymentError,
    models::{CurrencyPair, IssuedPayment, PaymentRequest},
    services::{
        conversion::convert,
        deeplink::{DeeplinkCodec, DeeplinkIntent},
        signer::RequestSigner,
        RateService,
    },
};
use ethers::types::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Issues signed payment requests for the merchant and opens them again.
pub struct PaymentService {
    codec: DeeplinkCodec,
    signer: RequestSigner,
    rates: Arc<RateService>,
    merchant: String,
    chain_id: u64,
    expiry_seconds: u64,
}

impl PaymentService {
    pub fn new(
        codec: DeeplinkCodec,
        signer: RequestSigner,
        rates: Arc<RateService>,
        merchant: Address,
        chain_id: u64,
        expiry_seconds: u64,
    ) -> Self {
        Self {
            codec,
            signer,
            rates,
            merchant: format!("{:?}", merchant),
            chain_id,
            expiry_seconds,
        }
    }

    /// Quotes, converts and signs a new request. The flag reports whether
    /// the rate came from cache.
    pub async fn issue(
        &self,
        fiat_amount: Decimal,
        fiat_currency: &str,
    ) -> Result<(IssuedPayment, bool), PaymentError> {
        let fiat_currency = fiat_currency.trim().to_uppercase();
        if fiat_currency.len() != 3 || !fiat_currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::UnsupportedPair(format!(
                "{}_{}",
                fiat_currency,
                CurrencyPair::TOKEN
            )));
        }

        let pair = CurrencyPair::fiat_to_token(&fiat_currency);
        let (quote, cache_hit) = self.rates.quote(&pair).await?;
        let conversion = convert(fiat_amount, &quote)?;

        let request = self.signer.seal(PaymentRequest {
            recipient: self.merchant.clone(),
            fiat_amount: conversion.fiat_amount,
            fiat_currency: conversion.fiat_currency,
            rate_units_per_fiat: conversion.rate_units_per_fiat,
            token_amount: conversion.token_amount,
            transaction_id: Uuid::new_v4(),
            created_at: PaymentRequest::issue_time(),
            expiry_seconds: self.expiry_seconds,
            nonce: PaymentRequest::fresh_nonce(),
            signature: String::new(),
        })?;

        Ok((self.encode(request)?, cache_hit))
    }

    pub fn encode(&self, request: PaymentRequest) -> Result<IssuedPayment, PaymentError> {
        Ok(IssuedPayment {
            deeplink: self.codec.encode(&request),
            wallet_link: self.codec.encode_wallet_send(&request, self.chain_id)?,
            expires_at: request.expires_at(),
            request,
        })
    }

    pub fn decode(&self, deeplink: &str) -> Result<DeeplinkIntent, PaymentError> {
        self.codec.decode(deeplink)
    }

    /// Decodes a deeplink this merchant issued and checks its signature.
    /// Wallet-send links carry no signature and are refused.
    pub fn open(&self, deeplink: &str) -> Result<PaymentRequest, PaymentError> {
        match self.codec.decode(deeplink)? {
            DeeplinkIntent::Pay(request) => {
                if let Err(e) = self.signer.verify(&request) {
                    tracing::warn!(
                        "Rejected deeplink for {} with bad signature",
                        request.transaction_id
                    );
                    return Err(e);
                }
                Ok(request)
            }
            DeeplinkIntent::WalletSend { .. } => Err(PaymentError::InvalidSignature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CacheService, StaticRateFeed};
    use rust_decimal_macros::dec;

    fn service() -> PaymentService {
        let rates = Arc::new(RateService::new(
            Arc::new(StaticRateFeed::new(dec!(2.0))),
            Arc::new(CacheService::memory_only()),
        ));
        PaymentService::new(
            DeeplinkCodec::new("monadpay", "link.metamask.io", dec!(2.0), 300),
            RequestSigner::new("merchant-secret-key-for-tests-0001").unwrap(),
            rates,
            Address::repeat_byte(0x11),
            10143,
            300,
        )
    }

    #[tokio::test]
    async fn issued_requests_reopen_with_valid_signature() {
        let service = service();
        let (issued, _) = service.issue(dec!(10), "usd").await.unwrap();

        assert_eq!(issued.request.token_amount.to_string(), "20.000000");
        assert_eq!(issued.request.fiat_currency, "USD");
        assert!(issued.wallet_link.contains("@10143?value=20000000000000000000"));

        let reopened = service.open(&issued.deeplink).unwrap();
        assert_eq!(reopened, issued.request);
    }

    #[tokio::test]
    async fn tampered_links_fail_signature_check() {
        let service = service();
        let (issued, _) = service.issue(dec!(10), "USD").await.unwrap();

        let tampered = issued.deeplink.replace("amount_mon=20.000000", "amount_mon=0.000001");
        assert!(matches!(
            service.open(&tampered),
            Err(PaymentError::InvalidSignature)
        ));

        assert!(matches!(
            service.open(&issued.wallet_link),
            Err(PaymentError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn rejects_bad_amounts_and_currencies() {
        let service = service();
        assert!(matches!(
            service.issue(Decimal::ZERO, "USD").await,
            Err(PaymentError::InvalidAmount(_))
        ));
        assert!(matches!(
            service.issue(dec!(10), "EUR").await,
            Err(PaymentError::UnsupportedPair(_))
        ));
        assert!(matches!(
            service.issue(dec!(10), "DOLLARS").await,
            Err(PaymentError::UnsupportedPair(_))
        ));
    }
}
