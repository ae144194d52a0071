//! Submission driver: republishes a transaction until one variant confirms
//!
//! Handles:
//! - Periodic resubmission with a freshly priced variant per attempt
//! - Receipt polling with a configurable confirmation depth
//! - First-wins receipt delivery across overlapping attempts
//! - Fatal abort when consecutive nonce-too-low errors show another sender
//!   has taken our nonce

use crate::chain::ReceiptSource;
use crate::config::Config;
use crate::error::{TxMgrError, TxMgrResult};
use crate::send_state::SendState;

use async_trait::async_trait;
use ethers::types::{Transaction, TransactionReceipt};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Rebuilds the managed transaction with a fresh gas price. Called once per
/// submission attempt; must honour the cancellation token.
pub type UpdateGasPriceFunc = Arc<
    dyn Fn(CancellationToken) -> BoxFuture<'static, TxMgrResult<Transaction>> + Send + Sync,
>;

/// Broadcasts a signed transaction to the network. Errors are classified
/// against the nonce-too-low sentinel by the send state.
pub type SendTransactionFunc = Arc<
    dyn Fn(CancellationToken, Transaction) -> BoxFuture<'static, TxMgrResult<()>> + Send + Sync,
>;

/// Drives one logical transaction to a confirmed receipt
#[async_trait]
pub trait TxManager: Send + Sync {
    /// Submit and resubmit until one variant lands with enough
    /// confirmations. Returns exactly one confirmed receipt, or a
    /// cancellation error (the caller's or a fatal abort).
    async fn send(
        &self,
        cancel: CancellationToken,
        update_gas_price: UpdateGasPriceFunc,
        send_tx: SendTransactionFunc,
    ) -> TxMgrResult<TransactionReceipt>;
}

/// Transaction manager backed by a single receipt source
pub struct SimpleTxManager {
    cfg: Config,
    backend: Arc<dyn ReceiptSource>,
}

impl SimpleTxManager {
    /// Create a new manager. Fails on invalid configuration.
    pub fn new(cfg: Config, backend: Arc<dyn ReceiptSource>) -> TxMgrResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg, backend })
    }
}

#[async_trait]
impl TxManager for SimpleTxManager {
    async fn send(
        &self,
        cancel: CancellationToken,
        update_gas_price: UpdateGasPriceFunc,
        send_tx: SendTransactionFunc,
    ) -> TxMgrResult<TransactionReceipt> {
        // Child scope: attempts cancel each other through it without ever
        // touching the caller's token.
        let cancel = cancel.child_token();

        let send_state = Arc::new(SendState::new(self.cfg.safe_abort_nonce_too_low_count));

        // Single-slot channel; waiters offer receipts with try_send and the
        // first one wins.
        let (receipt_tx, mut receipt_rx) = mpsc::channel(1);

        let attempt = AttemptCtx {
            backend: self.backend.clone(),
            send_state: send_state.clone(),
            cancel: cancel.clone(),
            receipt_tx,
            update_gas_price,
            send_tx,
            receipt_query_interval: self.cfg.receipt_query_interval(),
            num_confirmations: self.cfg.num_confirmations,
        };

        let mut attempts = JoinSet::new();
        attempts.spawn(attempt.clone().run());

        let resubmission_timeout = self.cfg.resubmission_timeout();
        let mut ticker = interval_at(
            Instant::now() + resubmission_timeout,
            resubmission_timeout,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Do not pile on more variants while a mined one is
                    // ripening toward its confirmation depth
                    if send_state.is_waiting_for_confirmation() {
                        continue;
                    }
                    attempts.spawn(attempt.clone().run());
                }
                _ = cancel.cancelled() => break Err(TxMgrError::Cancelled),
                Some(receipt) = receipt_rx.recv() => break Ok(receipt),
            }
        };

        // Stop the remaining attempts and wait until every one of them has
        // observed the cancellation
        cancel.cancel();
        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                error!("submission attempt task failed: {}", e);
            }
        }

        result
    }
}

/// Everything one submission attempt needs; cloned per spawn
#[derive(Clone)]
struct AttemptCtx {
    backend: Arc<dyn ReceiptSource>,
    send_state: Arc<SendState>,
    cancel: CancellationToken,
    receipt_tx: mpsc::Sender<TransactionReceipt>,
    update_gas_price: UpdateGasPriceFunc,
    send_tx: SendTransactionFunc,
    receipt_query_interval: Duration,
    num_confirmations: u64,
}

impl AttemptCtx {
    /// One attempt: rebuild, broadcast, wait for confirmation
    async fn run(self) {
        let tx = match (self.update_gas_price)(self.cancel.clone()).await {
            Ok(tx) => tx,
            Err(e) if e.is_cancellation() => return,
            Err(e) => {
                // A failure to price the transaction affects every attempt,
                // so the whole send is torn down
                error!("unable to update transaction gas price: {}", e);
                self.cancel.cancel();
                return;
            }
        };

        debug!(
            "publishing transaction {:?} (nonce {}, gas_tip_cap {:?}, gas_fee_cap {:?})",
            tx.hash, tx.nonce, tx.max_priority_fee_per_gas, tx.max_fee_per_gas
        );

        let sent = (self.send_tx)(self.cancel.clone(), tx.clone()).await;
        self.send_state.record_send_error(sent.as_ref().err());

        if let Err(e) = sent {
            if e.is_cancellation() {
                return;
            }
            error!("unable to publish transaction {:?}: {}", tx.hash, e);
            if self.send_state.should_abort_immediately() {
                self.cancel.cancel();
            }
            return;
        }

        debug!("transaction {:?} published (nonce {})", tx.hash, tx.nonce);

        match wait_mined_with_state(
            &self.cancel,
            self.backend.as_ref(),
            &tx,
            self.receipt_query_interval,
            self.num_confirmations,
            Some(&self.send_state),
        )
        .await
        {
            Ok(receipt) => {
                if self.receipt_tx.try_send(receipt).is_err() {
                    trace!("discarding receipt for {:?}, another variant won", tx.hash);
                }
            }
            Err(e) => {
                debug!("wait for transaction {:?} ended: {}", tx.hash, e);
            }
        }
    }
}

/// Poll for a transaction's receipt until it has `num_confirmations`
/// confirmations, for callers that broadcast outside the manager
pub async fn wait_mined(
    cancel: &CancellationToken,
    backend: &dyn ReceiptSource,
    tx: &Transaction,
    query_interval: Duration,
    num_confirmations: u64,
) -> TxMgrResult<TransactionReceipt> {
    wait_mined_with_state(cancel, backend, tx, query_interval, num_confirmations, None).await
}

async fn wait_mined_with_state(
    cancel: &CancellationToken,
    backend: &dyn ReceiptSource,
    tx: &Transaction,
    query_interval: Duration,
    num_confirmations: u64,
    send_state: Option<&SendState>,
) -> TxMgrResult<TransactionReceipt> {
    let tx_hash = tx.hash;

    // First poll runs immediately; the interval never queues catch-up ticks
    let mut query_ticker = interval_at(Instant::now() + query_interval, query_interval);
    query_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        match backend.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                if let Some(state) = send_state {
                    state.tx_mined(tx_hash);
                }

                // The height is absent while the node still reports the
                // transaction as pending; no decision on this tick
                if let Some(tx_height) = receipt.block_number.map(|b| b.as_u64()) {
                    match backend.block_number().await {
                        Ok(tip_height) => {
                            trace!(
                                "transaction {:?} mined at {} (tip {}, want {} confirmations)",
                                tx_hash,
                                tx_height,
                                tip_height,
                                num_confirmations
                            );

                            if tx_height + num_confirmations <= tip_height + 1 {
                                debug!("transaction {:?} confirmed", tx_hash);
                                return Ok(receipt);
                            }

                            let confs_remaining =
                                (tx_height + num_confirmations) - (tip_height + 1);
                            trace!(
                                "transaction {:?} not yet confirmed, {} confirmations remaining",
                                tx_hash,
                                confs_remaining
                            );
                        }
                        // The wait survives a flaky tip lookup; next tick retries
                        Err(e) => error!("unable to fetch block number: {}", e),
                    }
                }
            }
            Err(e) => {
                trace!("receipt lookup for {:?} failed: {}", tx_hash, e);
            }
            Ok(None) => {
                if let Some(state) = send_state {
                    state.tx_not_mined(tx_hash);
                }
                trace!("transaction {:?} not yet mined", tx_hash);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(TxMgrError::Cancelled),
            _ = query_ticker.tick() => {}
        }
    }
}
