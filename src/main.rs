use anyhow::{Context, Result};
use monadpay::{
    config::Config,
    handlers::{router, AppState},
    services::*,
};
use std::{net::SocketAddr, sync::Arc};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting MonadPay API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let cache = Arc::new(CacheService::new(&config.redis_url).await?);
    let chain = Arc::new(
        ChainService::new(
            &config.monad_rpc_url,
            config.monad_rpc_fallback.as_deref(),
            config.chain_id,
            config.finality_depth,
        )
        .await?,
    );

    let feed: Arc<dyn RateFeed> = match &config.rate_feed_url {
        Some(url) => {
            tracing::info!("Using rate feed at {}", url);
            Arc::new(HttpRateFeed::new(url.clone()))
        }
        None => {
            tracing::info!(
                "No rate feed configured, using fixed rate {} MON per USD",
                config.deeplink.default_rate_mon_per_usd
            );
            Arc::new(StaticRateFeed::new(config.deeplink.default_rate_mon_per_usd))
        }
    };
    let rates = Arc::new(RateService::new(feed, cache.clone()));

    let payments = Arc::new(PaymentService::new(
        DeeplinkCodec::from_settings(&config.deeplink),
        RequestSigner::new(&config.signing_key)?,
        rates.clone(),
        config.merchant_address,
        config.chain_id,
        config.deeplink.expiry_seconds,
    ));
    let verifier = Arc::new(PaymentVerifier::new(chain.clone(), cache.clone()));
    let analytics = Arc::new(Analytics::new(cache.clone()));

    let state = AppState {
        payments,
        rates,
        verifier,
        chain,
        cache,
        analytics,
    };

    let governor = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_second)
        .burst_size(config.rate_limit_burst)
        .finish()
        .context("RATE_LIMIT_PER_SECOND and RATE_LIMIT_BURST must be positive")?;

    let app = router(state)
        .layer(GovernorLayer {
            config: Box::leak(Box::new(governor)),
        })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("WebSocket dashboard: ws://{}/ws/dashboard", addr);
    tracing::info!("Merchant wallet: {:?}", config.merchant_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        return;
    }
    tracing::info!("Shutting down gracefully...");
}
