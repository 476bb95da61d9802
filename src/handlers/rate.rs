use crate::{
    error::PaymentError,
    handlers::AppState,
    models::{ApiResponse, CurrencyPair, PublishedRate},
};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RateParams {
    pub pair: Option<String>,
}

pub async fn get_rate(
    State(state): State<AppState>,
    Query(params): Query<RateParams>,
) -> Result<Json<ApiResponse<PublishedRate>>, PaymentError> {
    let pair: CurrencyPair = params
        .pair
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| PaymentError::MissingField("pair".to_string()))?
        .parse()?;

    let (quote, cache_hit) = state.rates.quote(&pair).await?;

    Ok(Json(ApiResponse {
        success: true,
        data: quote.into(),
        timestamp: Utc::now(),
        cache_hit,
        data_source: "rate-feed".to_string(),
        request_id: Uuid::new_v4().to_string(),
    }))
}
