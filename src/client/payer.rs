use anyhow::{bail, Context, Result};
use ethers::utils::format_ether;
use monadpay::{
    client::PaymentClient,
    config::{DeeplinkSettings, PollSettings},
    models::{ApiResponse, VerificationResult},
    services::{CacheService, ChainService, DeeplinkCodec, PaymentPoller, PaymentVerifier},
};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let deeplink = match std::env::args().nth(1) {
        Some(link) => link,
        None => bail!("usage: monadpay-payer <deeplink>"),
    };

    let server =
        std::env::var("MONADPAY_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let rpc_url = std::env::var("MONAD_RPC_URL")
        .unwrap_or_else(|_| "https://testnet-rpc.monad.xyz".to_string());
    let private_key =
        std::env::var("PAYER_PRIVATE_KEY").context("PAYER_PRIVATE_KEY is required")?;
    let default_chain_id: u64 = std::env::var("MONAD_CHAIN_ID")
        .unwrap_or_else(|_| "10143".to_string())
        .parse()
        .context("MONAD_CHAIN_ID must be a number")?;
    let finality_depth: u64 = std::env::var("FINALITY_DEPTH")
        .unwrap_or_else(|_| "2".to_string())
        .parse()
        .context("FINALITY_DEPTH must be a number")?;

    let codec = DeeplinkCodec::from_settings(&DeeplinkSettings::from_env()?);
    let poll = PollSettings::from_env()?;
    let intent = codec.decode(&deeplink)?;
    let chain_id = intent.chain_id().unwrap_or(default_chain_id);
    let request = intent.into_request();

    println!("MonadPay Payer");
    println!("==============");
    println!("Pay to:   {}", request.recipient);
    println!(
        "Amount:   {} MON ({} {})",
        request.token_amount, request.fiat_amount, request.fiat_currency
    );
    println!("Order:    {}", request.transaction_id);
    println!();

    if request.is_expired(chrono::Utc::now()) {
        bail!("Payment request expired at {}", request.expires_at());
    }

    let client = PaymentClient::new(&rpc_url, &private_key, chain_id).await?;
    println!("Payer:    {:?}", client.address());
    println!("Balance:  {} MON", format_ether(client.balance().await?));

    let tx_hash = client.pay(&request).await?;
    println!("Sent:     {:?}", tx_hash);

    let chain = Arc::new(ChainService::new(&rpc_url, None, chain_id, finality_depth).await?);
    let verifier = Arc::new(PaymentVerifier::new(chain, Arc::new(CacheService::memory_only())));
    let outcome = PaymentPoller::new(verifier, poll)
        .watch(&request, tx_hash)
        .await;

    println!(
        "Local check: {:?} after {} attempt(s){}",
        outcome.result.status,
        outcome.attempts,
        if outcome.exhausted { " (gave up)" } else { "" }
    );

    let response = Client::new()
        .post(format!("{}/api/verify-payment", server))
        .json(&json!({ "deeplink": deeplink, "txHash": format!("{:?}", tx_hash) }))
        .send()
        .await
        .context("Failed to reach MonadPay server")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("Merchant verification failed ({}): {}", status, body);
    }

    let verified: ApiResponse<VerificationResult> = response.json().await?;
    println!("Merchant: {}", serde_json::to_string_pretty(&verified.data)?);

    Ok(())
}
