use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency pair written `<BASE>_<QUOTE>`; the rate is QUOTE units per 1 BASE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub const TOKEN: &'static str = "MONAD";

    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    /// Token units per 1 unit of `fiat`.
    pub fn fiat_to_token(fiat: &str) -> Self {
        Self::new(fiat, Self::TOKEN)
    }

    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('_') {
            Some((base, quote))
                if !base.is_empty()
                    && !quote.is_empty()
                    && base.chars().all(|c| c.is_ascii_alphanumeric())
                    && quote.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Ok(Self::new(base, quote))
            }
            _ => Err(PaymentError::UnsupportedPair(s.to_string())),
        }
    }
}

impl Serialize for CurrencyPair {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CurrencyPair {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub pair: CurrencyPair,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Body of `/api/rate`, where the rate is a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRate {
    pub pair: CurrencyPair,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<RateQuote> for PublishedRate {
    fn from(quote: RateQuote) -> Self {
        Self {
            pair: quote.pair,
            rate: quote.rate,
            timestamp: quote.timestamp,
        }
    }
}

/// Result of converting a fiat amount with a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub rate_units_per_fiat: Decimal,
    pub token_amount: Decimal,
    pub rate_timestamp: DateTime<Utc>,
}
