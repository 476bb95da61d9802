use crate::{error::PaymentError, models::ObservedTransaction};
use anyhow::{bail, Result};
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Block, BlockNumber, Transaction, TransactionReceipt, H256},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read access to the ledger a payment is settled on.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// `Ok(None)` when the node does not know the transaction (yet).
    async fn lookup(&self, tx_hash: H256) -> Result<Option<ObservedTransaction>, PaymentError>;

    async fn head_block(&self) -> Result<u64, PaymentError>;
}

/// JSON-RPC backed source with an optional fallback endpoint.
pub struct ChainService {
    primary: Arc<Provider<Http>>,
    fallback: Option<Arc<Provider<Http>>>,
    finality_depth: u64,
}

impl ChainService {
    pub async fn new(
        rpc_url: &str,
        fallback_url: Option<&str>,
        expected_chain_id: u64,
        finality_depth: u64,
    ) -> Result<Self> {
        let primary = Arc::new(Provider::<Http>::try_from(rpc_url)?);

        let fallback = if let Some(url) = fallback_url {
            Some(Arc::new(Provider::<Http>::try_from(url)?))
        } else {
            None
        };

        let chain_id = primary.get_chainid().await?;
        if chain_id != U256::from(expected_chain_id) {
            bail!(
                "RPC endpoint serves chain {}, expected {}",
                chain_id,
                expected_chain_id
            );
        }
        let block_number = primary.get_block_number().await?;
        tracing::info!(
            "Monad RPC connected (chain {}), current block: {}",
            chain_id,
            block_number
        );

        Ok(Self {
            primary,
            fallback,
            finality_depth,
        })
    }

    async fn get_transaction(&self, tx_hash: H256) -> Result<Option<Transaction>, ProviderError> {
        match self.primary.get_transaction(tx_hash).await {
            Ok(tx) => Ok(tx),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Primary RPC failed ({}), trying fallback", e);
                    fallback.get_transaction(tx_hash).await
                }
                None => Err(e),
            },
        }
    }

    async fn get_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ProviderError> {
        match self.primary.get_transaction_receipt(tx_hash).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!("Primary RPC failed ({}), trying fallback", e);
                    fallback.get_transaction_receipt(tx_hash).await
                }
                None => Err(e),
            },
        }
    }

    async fn get_block_number(&self) -> Result<u64, ProviderError> {
        match self.primary.get_block_number().await {
            Ok(num) => Ok(num.as_u64()),
            Err(e) => match &self.fallback {
                Some(fallback) => fallback.get_block_number().await.map(|n| n.as_u64()),
                None => Err(e),
            },
        }
    }

    /// Highest finalized block, or `latest - finality_depth` when the node
    /// does not support the `finalized` tag.
    async fn finalized_block(&self) -> Result<u64, ProviderError> {
        let tagged = self
            .primary
            .get_block(BlockNumber::Finalized)
            .await
            .ok()
            .flatten();

        match tagged_height(tagged) {
            Some(number) => Ok(number),
            None => {
                let latest = self.get_block_number().await?;
                Ok(latest.saturating_sub(self.finality_depth))
            }
        }
    }
}

fn tagged_height(block: Option<Block<H256>>) -> Option<u64> {
    match block {
        Some(Block {
            number: Some(number),
            ..
        }) => Some(number.as_u64()),
        _ => None,
    }
}

fn lookup_failure(e: ProviderError) -> PaymentError {
    PaymentError::TransientLookupFailure(e.to_string())
}

#[async_trait]
impl TransactionSource for ChainService {
    async fn lookup(&self, tx_hash: H256) -> Result<Option<ObservedTransaction>, PaymentError> {
        let Some(tx) = self.get_transaction(tx_hash).await.map_err(lookup_failure)? else {
            return Ok(None);
        };

        let receipt = self.get_receipt(tx_hash).await.map_err(lookup_failure)?;

        let (block_number, succeeded) = match &receipt {
            Some(receipt) => (
                receipt.block_number.map(|n| n.as_u64()),
                Some(receipt.status == Some(1.into())),
            ),
            None => (tx.block_number.map(|n| n.as_u64()), None),
        };

        let finalized = match (receipt.is_some(), block_number) {
            (true, Some(block)) => block <= self.finalized_block().await.map_err(lookup_failure)?,
            _ => false,
        };

        tracing::debug!(
            "Observed {:?}: block={:?} succeeded={:?} finalized={}",
            tx_hash,
            block_number,
            succeeded,
            finalized
        );

        Ok(Some(ObservedTransaction {
            hash: tx_hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            block_number,
            succeeded,
            finalized,
        }))
    }

    async fn head_block(&self) -> Result<u64, PaymentError> {
        self.get_block_number().await.map_err(lookup_failure)
    }
}

/// Ledger held in memory. Backs local demos and tests.
#[derive(Default)]
pub struct InMemoryLedger {
    transactions: RwLock<HashMap<H256, ObservedTransaction>>,
    pending_failures: AtomicU32,
    head: RwLock<u64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, tx: ObservedTransaction) {
        let mut head = self.head.write().await;
        if let Some(block) = tx.block_number {
            *head = (*head).max(block);
        }
        self.transactions.write().await.insert(tx.hash, tx);
    }

    /// The next `count` lookups fail as if the RPC endpoint were down.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TransactionSource for InMemoryLedger {
    async fn lookup(&self, tx_hash: H256) -> Result<Option<ObservedTransaction>, PaymentError> {
        if self.take_failure() {
            return Err(PaymentError::TransientLookupFailure(
                "ledger unavailable".to_string(),
            ));
        }
        Ok(self.transactions.read().await.get(&tx_hash).cloned())
    }

    async fn head_block(&self) -> Result<u64, PaymentError> {
        if self.take_failure() {
            return Err(PaymentError::TransientLookupFailure(
                "ledger unavailable".to_string(),
            ));
        }
        Ok(*self.head.read().await)
    }
}
