//! Keyed signatures over payment requests.
//!
//! The MAC covers the direct-pay wire parameters except `sig`, in wire order,
//! as `key=value` pairs joined with `&`. Values are taken before
//! percent-encoding, so a request signs identically before and after a trip
//! through a deeplink.

use crate::{error::PaymentError, models::PaymentRequest, services::deeplink::pay_params};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct RequestSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, PaymentError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(PaymentError::ConfigError(
                "Signing key must not be empty".to_string(),
            ));
        }
        Ok(Self { key: key.to_vec() })
    }

    /// Base64 HMAC-SHA256 of the request's canonical message.
    pub fn sign(&self, request: &PaymentRequest) -> Result<String, PaymentError> {
        let mac = self.mac(request)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Returns the request with its signature filled in.
    pub fn seal(&self, mut request: PaymentRequest) -> Result<PaymentRequest, PaymentError> {
        request.signature = self.sign(&request)?;
        Ok(request)
    }

    /// Constant-time check of `request.signature`.
    pub fn verify(&self, request: &PaymentRequest) -> Result<(), PaymentError> {
        if request.signature.is_empty() {
            return Err(PaymentError::InvalidSignature);
        }
        let expected = STANDARD
            .decode(request.signature.as_bytes())
            .map_err(|_| PaymentError::InvalidSignature)?;

        self.mac(request)?
            .verify_slice(&expected)
            .map_err(|_| PaymentError::InvalidSignature)
    }

    fn mac(&self, request: &PaymentRequest) -> Result<HmacSha256, PaymentError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| PaymentError::InternalError(format!("HMAC key rejected: {}", e)))?;
        mac.update(canonical_message(request).as_bytes());
        Ok(mac)
    }
}

pub fn canonical_message(request: &PaymentRequest) -> String {
    pay_params(request)
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn request() -> PaymentRequest {
        PaymentRequest {
            recipient: "0xAbCdEf0123456789abcdef0123456789ABCDEF01".to_string(),
            fiat_amount: dec!(12.50),
            fiat_currency: "USD".to_string(),
            rate_units_per_fiat: dec!(2.0),
            token_amount: dec!(25.000000),
            transaction_id: Uuid::parse_str("2f1e0c4a-8b7d-4e3f-9a6b-5c4d3e2f1a0b").unwrap(),
            created_at: Utc.timestamp_millis_opt(1_717_000_000_123).unwrap(),
            expiry_seconds: 300,
            nonce: "c0ffee".to_string(),
            signature: String::new(),
        }
    }

    #[test]
    fn canonical_message_follows_wire_order() {
        assert_eq!(
            canonical_message(&request()),
            "to=0xAbCdEf0123456789abcdef0123456789ABCDEF01&fiat_amount=12.50&fiat_currency=USD\
             &rate_monad_per_usd=2.0&amount_mon=25.000000\
             &txn_id=2f1e0c4a-8b7d-4e3f-9a6b-5c4d3e2f1a0b&ts=1717000000123&exp=300&nonce=c0ffee"
        );
    }

    #[test]
    fn signing_is_deterministic_and_verifies() {
        let signer = RequestSigner::new("merchant-secret-key-for-tests-0001").unwrap();
        let first = signer.sign(&request()).unwrap();
        let second = signer.sign(&request()).unwrap();
        assert_eq!(first, second);

        let sealed = signer.seal(request()).unwrap();
        assert!(signer.verify(&sealed).is_ok());
    }

    #[test]
    fn any_field_mutation_breaks_the_signature() {
        let signer = RequestSigner::new("merchant-secret-key-for-tests-0001").unwrap();
        let sealed = signer.seal(request()).unwrap();

        let mut tampered = sealed.clone();
        tampered.token_amount = dec!(0.000001);
        assert!(matches!(
            signer.verify(&tampered),
            Err(PaymentError::InvalidSignature)
        ));

        let mut tampered = sealed.clone();
        tampered.recipient = "0x0000000000000000000000000000000000000001".to_string();
        assert!(signer.verify(&tampered).is_err());

        let mut tampered = sealed;
        tampered.expiry_seconds = 86_400;
        assert!(signer.verify(&tampered).is_err());
    }

    #[test]
    fn other_keys_and_garbage_signatures_are_rejected() {
        let signer = RequestSigner::new("merchant-secret-key-for-tests-0001").unwrap();
        let other = RequestSigner::new("a-different-merchant-secret-key-02").unwrap();
        let sealed = other.seal(request()).unwrap();
        assert!(signer.verify(&sealed).is_err());

        let mut garbage = request();
        garbage.signature = "not base64 at all!".to_string();
        assert!(signer.verify(&garbage).is_err());

        assert!(signer.verify(&request()).is_err());
        assert!(RequestSigner::new("").is_err());
    }
}
