//! Resilient transaction submission for EVM-style backends
//!
//! Drives one logical transaction to a confirmed receipt:
//! - Republishes with a freshly priced variant until one lands with enough
//!   confirmations
//! - Survives transient broadcast and receipt-lookup failures
//! - Aborts when consecutive nonce-too-low errors show another sender has
//!   taken our nonce, unless one of our variants is already on-chain
//!
//! The caller supplies the pricing and broadcast hooks; the manager supplies
//! the retry, confirmation, and cancellation machinery.

pub mod chain;
pub mod config;
pub mod error;
pub mod gas;
pub mod manager;
pub mod send_state;

pub use chain::{connect_with_timeout, EthReceiptSource, ReceiptSource};
pub use config::Config;
pub use error::{TxMgrError, TxMgrResult, NONCE_TOO_LOW};
pub use gas::{bump_fees, calc_gas_fee_cap};
pub use manager::{
    wait_mined, SendTransactionFunc, SimpleTxManager, TxManager, UpdateGasPriceFunc,
};
pub use send_state::{NonceClassifier, SendState};
