use crate::{
    error::PaymentError,
    models::{CurrencyPair, RateQuote},
    services::CacheService,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of exchange rates by currency pair.
#[async_trait]
pub trait RateFeed: Send + Sync {
    async fn quote(&self, pair: &CurrencyPair) -> Result<RateQuote, PaymentError>;
}

/// Fixed rate table, used when no external feed is configured.
pub struct StaticRateFeed {
    rates: HashMap<CurrencyPair, Decimal>,
}

impl StaticRateFeed {
    /// Table holding `USD_MONAD = mon_per_usd` and its inverse.
    pub fn new(mon_per_usd: Decimal) -> Self {
        let mut rates = HashMap::new();
        let usd_monad = CurrencyPair::fiat_to_token("USD");
        if !mon_per_usd.is_zero() {
            rates.insert(usd_monad.inverse(), (Decimal::ONE / mon_per_usd).normalize());
        }
        rates.insert(usd_monad, mon_per_usd);
        Self { rates }
    }
}

#[async_trait]
impl RateFeed for StaticRateFeed {
    async fn quote(&self, pair: &CurrencyPair) -> Result<RateQuote, PaymentError> {
        let rate = self
            .rates
            .get(pair)
            .copied()
            .ok_or_else(|| PaymentError::UnsupportedPair(pair.to_string()))?;

        Ok(RateQuote {
            pair: pair.clone(),
            rate,
            timestamp: Utc::now(),
        })
    }
}

/// Price feed reached over HTTP: `GET <url>?pair=<BASE_QUOTE>` answering
/// `{ "rate": <decimal>, "timestamp": <unix millis> }`.
pub struct HttpRateFeed {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct FeedResponse {
    rate: Decimal,
    timestamp: i64,
}

impl HttpRateFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateFeed for HttpRateFeed {
    async fn quote(&self, pair: &CurrencyPair) -> Result<RateQuote, PaymentError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("pair", pair.to_string())])
            .send()
            .await
            .map_err(|e| PaymentError::TransientLookupFailure(format!("Rate feed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                return Err(PaymentError::UnsupportedPair(pair.to_string()));
            }
            status => {
                return Err(PaymentError::TransientLookupFailure(format!(
                    "Rate feed returned {}",
                    status
                )));
            }
        }

        let body: FeedResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::TransientLookupFailure(format!("Rate feed body: {}", e)))?;

        if body.rate <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(format!(
                "Rate feed returned non-positive rate {} for {}",
                body.rate, pair
            )));
        }

        let timestamp: DateTime<Utc> = Utc
            .timestamp_millis_opt(body.timestamp)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(RateQuote {
            pair: pair.clone(),
            rate: body.rate,
            timestamp,
        })
    }
}

/// Rate lookups with a short-lived cache in front of the feed.
pub struct RateService {
    feed: Arc<dyn RateFeed>,
    cache: Arc<CacheService>,
    ttl_secs: u64,
}

impl RateService {
    pub fn new(feed: Arc<dyn RateFeed>, cache: Arc<CacheService>) -> Self {
        Self {
            feed,
            cache,
            ttl_secs: 30,
        }
    }

    /// Returns the quote and whether it came from cache.
    pub async fn quote(&self, pair: &CurrencyPair) -> Result<(RateQuote, bool), PaymentError> {
        let cache_key = format!("rate:{}", pair);
        if let Some(cached) = self.cache.get::<RateQuote>(&cache_key).await.ok().flatten() {
            tracing::debug!("Returning cached rate for {}", pair);
            return Ok((cached, true));
        }

        let quote = self.feed.quote(pair).await?;

        self.cache
            .set(&cache_key, &quote, self.ttl_secs)
            .await
            .map_err(|e| PaymentError::CacheError(e.to_string()))?;

        tracing::info!("Rate {} = {} at {}", pair, quote.rate, quote.timestamp);

        Ok((quote, false))
    }
}
