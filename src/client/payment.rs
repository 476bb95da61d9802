use crate::models::PaymentRequest;
use anyhow::{bail, Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionRequest, H256, U256},
    utils::format_ether,
};
use std::{sync::Arc, time::Duration};

/// Gas for a plain value transfer.
const TRANSFER_GAS: u64 = 21_000;

/// Wallet side of a payment: sends MON to the address a request names.
pub struct PaymentClient {
    provider: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl PaymentClient {
    pub async fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;

        let served = provider.get_chainid().await?;
        if served != U256::from(chain_id) {
            bail!("RPC endpoint serves chain {}, expected {}", served, chain_id);
        }

        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid payer private key")?
            .with_chain_id(chain_id);

        Ok(Self {
            provider: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    pub async fn balance(&self) -> Result<U256> {
        Ok(self.provider.get_balance(self.address(), None).await?)
    }

    /// Sends the requested amount and waits for the receipt.
    pub async fn pay(&self, request: &PaymentRequest) -> Result<H256> {
        let recipient = request.recipient_address()?;
        let value = request.token_amount_wei()?;

        let balance = self.balance().await?;
        if balance < value {
            bail!(
                "Insufficient MON balance: {} < {}",
                format_ether(balance),
                format_ether(value)
            );
        }

        tracing::info!(
            "Sending {} MON to {:?} for {} {}",
            request.token_amount,
            recipient,
            request.fiat_amount,
            request.fiat_currency
        );

        let tx = TransactionRequest::new()
            .from(self.address())
            .to(recipient)
            .value(value)
            .gas(TRANSFER_GAS);

        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .context("Failed to send payment")?
            .interval(Duration::from_millis(500));

        tracing::info!("Transaction {:?} sent, waiting for receipt...", *pending);

        let receipt = pending
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow::anyhow!("Transaction dropped"))?;

        if receipt.status != Some(1.into()) {
            bail!("Transaction {:?} reverted", receipt.transaction_hash);
        }

        Ok(receipt.transaction_hash)
    }
}
