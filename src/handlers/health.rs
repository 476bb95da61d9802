use crate::{handlers::AppState, models::HealthStatus};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let redis_ok = state.cache.ping().await.unwrap_or(false);
    let head_block = state.chain.head_block().await.ok();
    let rpc_ok = head_block.is_some();

    let status = if redis_ok && rpc_ok {
        "healthy"
    } else if rpc_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        redis: redis_ok,
        monad_rpc: rpc_ok,
        head_block,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
