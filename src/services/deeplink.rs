//! Payment deeplink encoding and decoding.
//!
//! Two wire formats are understood:
//! - direct pay: `<scheme>://pay?to=..&fiat_amount=..&fiat_currency=..&rate_monad_per_usd=..
//!   &amount_mon=..&txn_id=..&ts=..&exp=..&nonce=..&sig=..`
//! - wallet send: `https://<wallet-host>/send/<recipient>@<chainId>?value=<wei>`
//!
//! Both decode into the same [`PaymentRequest`] shape, tagged by [`DeeplinkIntent`].
//! Values are percent-decoded only; `+` is kept literally.

use crate::{config::DeeplinkSettings, error::PaymentError, models::PaymentRequest};
use chrono::{DateTime, TimeZone, Utc};
use ethers::types::U256;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

const PAY_HOST: &str = "pay";
const SEND_PREFIX: &str = "/send/";
const DEFAULT_FIAT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeeplinkIntent {
    /// Signed merchant request in the custom-scheme format.
    Pay(PaymentRequest),
    /// External wallet transfer link; fields it does not carry are defaulted.
    WalletSend {
        chain_id: Option<u64>,
        request: PaymentRequest,
    },
}

impl DeeplinkIntent {
    pub fn request(&self) -> &PaymentRequest {
        match self {
            DeeplinkIntent::Pay(request) => request,
            DeeplinkIntent::WalletSend { request, .. } => request,
        }
    }

    pub fn into_request(self) -> PaymentRequest {
        match self {
            DeeplinkIntent::Pay(request) => request,
            DeeplinkIntent::WalletSend { request, .. } => request,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            DeeplinkIntent::Pay(_) => None,
            DeeplinkIntent::WalletSend { chain_id, .. } => *chain_id,
        }
    }
}

/// Direct-pay parameters in wire order, without `sig`.
pub(crate) fn pay_params(request: &PaymentRequest) -> [(&'static str, String); 9] {
    [
        ("to", request.recipient.clone()),
        ("fiat_amount", request.fiat_amount.to_string()),
        ("fiat_currency", request.fiat_currency.clone()),
        ("rate_monad_per_usd", request.rate_units_per_fiat.to_string()),
        ("amount_mon", request.token_amount.to_string()),
        ("txn_id", request.transaction_id.to_string()),
        ("ts", request.created_at.timestamp_millis().to_string()),
        ("exp", request.expiry_seconds.to_string()),
        ("nonce", request.nonce.clone()),
    ]
}

#[derive(Debug, Clone)]
pub struct DeeplinkCodec {
    scheme: String,
    wallet_host: String,
    default_rate: Decimal,
    default_expiry_seconds: u64,
}

impl DeeplinkCodec {
    pub fn new(
        scheme: impl Into<String>,
        wallet_host: impl Into<String>,
        default_rate: Decimal,
        default_expiry_seconds: u64,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            wallet_host: wallet_host.into(),
            default_rate,
            default_expiry_seconds,
        }
    }

    pub fn from_settings(settings: &DeeplinkSettings) -> Self {
        Self::new(
            settings.scheme.clone(),
            settings.wallet_host.clone(),
            settings.default_rate_mon_per_usd,
            settings.expiry_seconds,
        )
    }

    pub fn encode(&self, request: &PaymentRequest) -> String {
        let query = pay_params(request)
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .chain(std::iter::once(("sig", request.signature.as_str())))
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}://{}?{}", self.scheme, PAY_HOST, query)
    }

    pub fn encode_wallet_send(
        &self,
        request: &PaymentRequest,
        chain_id: u64,
    ) -> Result<String, PaymentError> {
        let wei = request.token_amount_wei()?;
        Ok(format!(
            "https://{}{}{}@{}?value={}",
            self.wallet_host,
            SEND_PREFIX,
            urlencoding::encode(&request.recipient),
            chain_id,
            wei
        ))
    }

    pub fn decode(&self, uri: &str) -> Result<DeeplinkIntent, PaymentError> {
        let parts = UriParts::split(uri)?;

        if parts.scheme.eq_ignore_ascii_case(&self.scheme) && parts.host == PAY_HOST {
            if !parts.path.is_empty() && parts.path != "/" {
                return Err(PaymentError::MalformedDeeplink(format!(
                    "Unexpected path: {}",
                    parts.path
                )));
            }
            let params = parse_query(parts.query)?;
            return self.decode_pay(&params).map(DeeplinkIntent::Pay);
        }

        if parts.scheme.eq_ignore_ascii_case("https")
            && parts.host.eq_ignore_ascii_case(&self.wallet_host)
        {
            if let Some(target) = parts.path.strip_prefix(SEND_PREFIX) {
                let params = parse_query(parts.query)?;
                return self.decode_wallet_send(target, &params);
            }
        }

        Err(PaymentError::MalformedDeeplink(format!(
            "Unrecognized deeplink: {}://{}{}",
            parts.scheme, parts.host, parts.path
        )))
    }

    fn decode_pay(&self, params: &HashMap<String, String>) -> Result<PaymentRequest, PaymentError> {
        let recipient = required(params, "to")?;
        let token_amount = parse_amount("amount_mon", required(params, "amount_mon")?)?;
        let txn_id = required(params, "txn_id")?;
        let transaction_id = Uuid::parse_str(txn_id)
            .map_err(|e| PaymentError::MalformedDeeplink(format!("txn_id: {}", e)))?;

        let fiat_amount = match optional(params, "fiat_amount") {
            Some(value) => parse_decimal("fiat_amount", value)?,
            None => Decimal::ZERO,
        };
        let rate_units_per_fiat = match optional(params, "rate_monad_per_usd") {
            Some(value) => parse_amount("rate_monad_per_usd", value)?,
            None => self.default_rate,
        };
        let created_at = match optional(params, "ts") {
            Some(value) => parse_timestamp(value)?,
            None => PaymentRequest::issue_time(),
        };
        let expiry_seconds = match optional(params, "exp") {
            Some(value) => value
                .parse()
                .map_err(|_| PaymentError::MalformedDeeplink(format!("exp: {}", value)))?,
            None => self.default_expiry_seconds,
        };

        Ok(PaymentRequest {
            recipient: recipient.to_string(),
            fiat_amount,
            fiat_currency: optional(params, "fiat_currency")
                .unwrap_or(DEFAULT_FIAT_CURRENCY)
                .to_string(),
            rate_units_per_fiat,
            token_amount,
            transaction_id,
            created_at,
            expiry_seconds,
            nonce: optional(params, "nonce").unwrap_or_default().to_string(),
            signature: optional(params, "sig").unwrap_or_default().to_string(),
        })
    }

    fn decode_wallet_send(
        &self,
        target: &str,
        params: &HashMap<String, String>,
    ) -> Result<DeeplinkIntent, PaymentError> {
        let target = target.split('/').next().unwrap_or_default();
        let target = percent_decode(target)?;

        let (recipient, chain_id) = match target.split_once('@') {
            Some((recipient, chain)) => {
                let chain_id = chain
                    .parse::<u64>()
                    .map_err(|_| PaymentError::MalformedDeeplink(format!("chain id: {}", chain)))?;
                (recipient.trim(), Some(chain_id))
            }
            None => (target.trim(), None),
        };
        if recipient.is_empty() {
            return Err(PaymentError::MissingField("to".to_string()));
        }

        let value = required(params, "value")?;
        let wei = U256::from_dec_str(value)
            .map_err(|_| PaymentError::InvalidAmount(format!("value: {}", value)))?;
        let token_amount = wei_to_token(wei)?;

        let request = PaymentRequest {
            recipient: recipient.to_string(),
            fiat_amount: Decimal::ZERO,
            fiat_currency: DEFAULT_FIAT_CURRENCY.to_string(),
            rate_units_per_fiat: self.default_rate,
            token_amount,
            transaction_id: Uuid::new_v4(),
            created_at: PaymentRequest::issue_time(),
            expiry_seconds: self.default_expiry_seconds,
            nonce: PaymentRequest::fresh_nonce(),
            signature: String::new(),
        };

        Ok(DeeplinkIntent::WalletSend { chain_id, request })
    }
}

/// Wei (18 decimals) to a decimal token amount.
pub fn wei_to_token(wei: U256) -> Result<Decimal, PaymentError> {
    if wei.is_zero() {
        return Err(PaymentError::InvalidAmount("value must be positive".to_string()));
    }
    let formatted = ethers::utils::format_ether(wei);
    let amount = Decimal::from_str(&formatted)
        .map(|d| d.normalize())
        .map_err(|e| PaymentError::InvalidAmount(format!("{} wei: {}", wei, e)))?;

    // Decimal holds 28 significant digits; anything longer would be rounded.
    match ethers::utils::parse_ether(amount.to_string()) {
        Ok(back) if back == wei => Ok(amount),
        _ => Err(PaymentError::InvalidAmount(format!(
            "{} wei is not representable exactly",
            wei
        ))),
    }
}

struct UriParts<'a> {
    scheme: &'a str,
    host: &'a str,
    path: &'a str,
    query: &'a str,
}

impl<'a> UriParts<'a> {
    fn split(uri: &'a str) -> Result<Self, PaymentError> {
        let uri = uri.trim();
        let uri = uri.split('#').next().unwrap_or(uri);

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| PaymentError::MalformedDeeplink(format!("No scheme in: {}", uri)))?;
        if scheme.is_empty() {
            return Err(PaymentError::MalformedDeeplink("Empty scheme".to_string()));
        }

        let (location, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (host, path) = match location.find('/') {
            Some(idx) => location.split_at(idx),
            None => (location, ""),
        };

        Ok(Self {
            scheme,
            host,
            path,
            query,
        })
    }
}

fn parse_query(query: &str) -> Result<HashMap<String, String>, PaymentError> {
    let mut params = HashMap::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        // First occurrence wins.
        params
            .entry(percent_decode(key)?)
            .or_insert(percent_decode(value)?);
    }

    Ok(params)
}

fn percent_decode(value: &str) -> Result<String, PaymentError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| PaymentError::MalformedDeeplink(format!("Bad percent-encoding: {}", e)))
}

fn optional<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn required<'a>(params: &'a HashMap<String, String>, key: &str) -> Result<&'a str, PaymentError> {
    optional(params, key).ok_or_else(|| PaymentError::MissingField(key.to_string()))
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, PaymentError> {
    Decimal::from_str(value)
        .map_err(|_| PaymentError::InvalidAmount(format!("{}: {}", field, value)))
}

fn parse_amount(field: &str, value: &str) -> Result<Decimal, PaymentError> {
    let amount = parse_decimal(field, value)?;
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "{} must be positive: {}",
            field, value
        )));
    }
    Ok(amount)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PaymentError> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| PaymentError::MalformedDeeplink(format!("ts: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    const RECIPIENT: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

    fn codec() -> DeeplinkCodec {
        DeeplinkCodec::new("monadpay", "link.metamask.io", dec!(2.0), 300)
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            recipient: RECIPIENT.to_string(),
            fiat_amount: dec!(10),
            fiat_currency: "USD".to_string(),
            rate_units_per_fiat: dec!(2.0),
            token_amount: dec!(20.000000),
            transaction_id: Uuid::new_v4(),
            created_at: Utc.timestamp_millis_opt(1_717_000_000_123).unwrap(),
            expiry_seconds: 300,
            nonce: "5f2b9c".to_string(),
            signature: "q+/Zk9a3Lw==".to_string(),
        }
    }

    #[test]
    fn pay_link_round_trips() {
        let original = request();
        let uri = codec().encode(&original);

        assert!(uri.starts_with("monadpay://pay?to="));
        assert!(uri.contains("sig=q%2B%2FZk9a3Lw%3D%3D"));

        match codec().decode(&uri).unwrap() {
            DeeplinkIntent::Pay(decoded) => assert_eq!(decoded, original),
            other => panic!("Expected Pay intent, got {:?}", other),
        }
    }

    #[test]
    fn wallet_send_link_round_trips() {
        let original = request();
        let uri = codec().encode_wallet_send(&original, 10143).unwrap();
        assert_eq!(
            uri,
            format!(
                "https://link.metamask.io/send/{}@10143?value=20000000000000000000",
                RECIPIENT
            )
        );

        let intent = codec().decode(&uri).unwrap();
        assert_eq!(intent.chain_id(), Some(10143));
        let decoded = intent.into_request();
        assert_eq!(decoded.recipient, original.recipient);
        assert_eq!(decoded.token_amount, original.token_amount);
        assert_eq!(decoded.fiat_currency, "USD");
        assert_eq!(decoded.rate_units_per_fiat, dec!(2.0));
        assert_eq!(decoded.expiry_seconds, 300);
        assert!(decoded.signature.is_empty());
    }

    #[test]
    fn wallet_send_divides_wei_by_ten_to_the_eighteen() {
        let uri = format!(
            "https://link.metamask.io/send/{}@10143?value=1500000000000000",
            RECIPIENT
        );
        let request = codec().decode(&uri).unwrap().into_request();
        assert_eq!(request.token_amount, dec!(0.0015));
    }

    #[test]
    fn missing_recipient_is_missing_field() {
        let mut uri = codec().encode(&request());
        uri = uri.replacen(&format!("to={}&", RECIPIENT), "", 1);
        assert!(matches!(
            codec().decode(&uri),
            Err(PaymentError::MissingField(field)) if field == "to"
        ));

        let empty = codec().encode(&request()).replacen(RECIPIENT, "", 1);
        assert!(matches!(
            codec().decode(&empty),
            Err(PaymentError::MissingField(_))
        ));

        let send = "https://link.metamask.io/send/@10143?value=1000";
        assert!(matches!(
            codec().decode(send),
            Err(PaymentError::MissingField(_))
        ));
    }

    #[test]
    fn pay_link_requires_amount_and_transaction_id() {
        let uri = format!("monadpay://pay?to={}&amount_mon=1.5", RECIPIENT);
        assert!(matches!(
            codec().decode(&uri),
            Err(PaymentError::MissingField(field)) if field == "txn_id"
        ));

        let uri = format!("monadpay://pay?to={}&txn_id={}", RECIPIENT, Uuid::new_v4());
        assert!(matches!(
            codec().decode(&uri),
            Err(PaymentError::MissingField(field)) if field == "amount_mon"
        ));

        let uri = format!("https://link.metamask.io/send/{}@10143", RECIPIENT);
        assert!(matches!(
            codec().decode(&uri),
            Err(PaymentError::MissingField(field)) if field == "value"
        ));
    }

    #[test]
    fn minimal_pay_link_gets_defaults() {
        let txn = Uuid::new_v4();
        let uri = format!(
            "MonadPay://pay?to={}&amount_mon=3.25&txn_id={}",
            RECIPIENT, txn
        );
        let request = codec().decode(&uri).unwrap().into_request();
        assert_eq!(request.transaction_id, txn);
        assert_eq!(request.fiat_amount, Decimal::ZERO);
        assert_eq!(request.rate_units_per_fiat, dec!(2.0));
        assert_eq!(request.expiry_seconds, 300);
    }

    #[test]
    fn rejects_unknown_shapes_and_bad_values() {
        for uri in [
            "not a link",
            "otherapp://pay?to=0x1",
            "https://example.com/send/0x1@1?value=1",
            "https://link.metamask.io/receive/0x1@1?value=1",
        ] {
            assert!(
                matches!(codec().decode(uri), Err(PaymentError::MalformedDeeplink(_))),
                "{} should be malformed",
                uri
            );
        }

        let bad_amount = format!(
            "monadpay://pay?to={}&amount_mon=-1&txn_id={}",
            RECIPIENT,
            Uuid::new_v4()
        );
        assert!(matches!(
            codec().decode(&bad_amount),
            Err(PaymentError::InvalidAmount(_))
        ));

        let bad_txn = format!("monadpay://pay?to={}&amount_mon=1&txn_id=abc", RECIPIENT);
        assert!(matches!(
            codec().decode(&bad_txn),
            Err(PaymentError::MalformedDeeplink(_))
        ));

        let zero = format!("https://link.metamask.io/send/{}@10143?value=0", RECIPIENT);
        assert!(matches!(
            codec().decode(&zero),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn wallet_send_rejects_values_beyond_decimal_precision() {
        let uri = format!(
            "https://link.metamask.io/send/{}@10143?value=123456789012345678901234567890123",
            RECIPIENT
        );
        assert!(matches!(
            codec().decode(&uri),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    proptest! {
        #[test]
        fn wallet_send_round_trips_for_arbitrary_requests(
            recipient in proptest::array::uniform20(any::<u8>()),
            micros in 1i64..1_000_000_000_000_000,
            chain_id in 1u64..u64::from(u32::MAX),
        ) {
            let original = PaymentRequest {
                recipient: format!("{:?}", ethers::types::Address::from(recipient)),
                token_amount: Decimal::new(micros, 6),
                ..request()
            };

            let uri = codec().encode_wallet_send(&original, chain_id).unwrap();
            let intent = codec().decode(&uri).unwrap();
            prop_assert_eq!(intent.chain_id(), Some(chain_id));

            let decoded = intent.into_request();
            prop_assert_eq!(decoded.recipient, original.recipient);
            prop_assert_eq!(decoded.token_amount, original.token_amount);
        }

        #[test]
        fn pay_link_round_trips_for_arbitrary_requests(
            cents in 1i64..100_000_000,
            rate_milli in 1i64..10_000_000,
            expiry in 1u64..86_400,
            millis in 1_600_000_000_000i64..2_000_000_000_000,
            nonce in "[a-zA-Z0-9 +/=&?%]{0,24}",
            currency in "[A-Z]{3}",
        ) {
            let fiat_amount = Decimal::new(cents, 2);
            let rate = Decimal::new(rate_milli, 3);
            let original = PaymentRequest {
                recipient: RECIPIENT.to_string(),
                fiat_amount,
                fiat_currency: currency,
                rate_units_per_fiat: rate,
                token_amount: (fiat_amount * rate).round_dp(6),
                transaction_id: Uuid::new_v4(),
                created_at: Utc.timestamp_millis_opt(millis).unwrap(),
                expiry_seconds: expiry,
                nonce: nonce.trim().to_string(),
                signature: "AAEC/w+=".to_string(),
            };
            prop_assume!(original.token_amount > Decimal::ZERO);

            let decoded = codec().decode(&codec().encode(&original)).unwrap().into_request();
            prop_assert_eq!(decoded, original);
        }
    }
}
