//! Receipt source abstraction over an EVM JSON-RPC backend

use crate::error::{TxMgrError, TxMgrResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{TransactionReceipt, H256};
use std::time::Duration;
use tracing::debug;

/// Minimal view of the chain needed to confirm a submitted transaction
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// Current chain tip height
    async fn block_number(&self) -> TxMgrResult<u64>;

    /// Receipt for a transaction hash, if the chain currently knows it.
    /// Absence is `Ok(None)`, distinct from a lookup failure.
    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> TxMgrResult<Option<TransactionReceipt>>;
}

/// Adapter exposing any ethers middleware as a receipt source
pub struct EthReceiptSource<M> {
    inner: M,
}

impl<M> EthReceiptSource<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<M: Middleware> ReceiptSource for EthReceiptSource<M> {
    async fn block_number(&self) -> TxMgrResult<u64> {
        self.inner
            .get_block_number()
            .await
            .map(|block| block.as_u64())
            .map_err(|e| TxMgrError::Rpc(e.to_string()))
    }

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> TxMgrResult<Option<TransactionReceipt>> {
        self.inner
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| TxMgrError::Rpc(e.to_string()))
    }
}

/// Connect to an HTTP JSON-RPC endpoint, bounding the initial round-trip
pub async fn connect_with_timeout(
    url: &str,
    timeout: Duration,
) -> TxMgrResult<Provider<Http>> {
    let provider = Provider::<Http>::try_from(url)
        .map_err(|e| TxMgrError::Rpc(format!("invalid rpc url {}: {}", url, e)))?
        .interval(Duration::from_millis(100));

    // Probe the endpoint so a dead url fails here instead of on first use
    let block = tokio::time::timeout(timeout, provider.get_block_number())
        .await
        .map_err(|_| TxMgrError::Rpc(format!("timed out connecting to {}", url)))?
        .map_err(|e| TxMgrError::Rpc(e.to_string()))?;

    debug!("connected to {} at block {}", url, block);
    Ok(provider)
}
