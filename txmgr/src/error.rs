//! Error types for the transaction manager

use thiserror::Error;

/// Canonical substring an EVM backend reports when a transaction's nonce is
/// behind the account's current nonce.
pub const NONCE_TOO_LOW: &str = "nonce too low";

/// Main error type for transaction submission
#[derive(Error, Debug)]
pub enum TxMgrError {
    #[error("send cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("gas price update failed: {0}")]
    GasPrice(String),

    #[error("transaction send failed: {0}")]
    Send(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

impl TxMgrError {
    /// Check if the error is a cancellation signal rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TxMgrError::Cancelled)
    }

    /// Check if the error message carries the backend's nonce-too-low sentinel.
    /// Matching is by substring, so wrappers that preserve the message satisfy
    /// the contract.
    pub fn is_nonce_too_low(&self) -> bool {
        self.to_string().to_ascii_lowercase().contains(NONCE_TOO_LOW)
    }
}

/// Result type for transaction manager operations
pub type TxMgrResult<T> = Result<T, TxMgrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_too_low_detection() {
        let err = TxMgrError::Send("nonce too low: next nonce 42, tx nonce 40".to_string());
        assert!(err.is_nonce_too_low());

        let err = TxMgrError::Send("Nonce Too Low".to_string());
        assert!(err.is_nonce_too_low());

        let err = TxMgrError::Send("insufficient funds".to_string());
        assert!(!err.is_nonce_too_low());
    }

    #[test]
    fn test_cancellation_detection() {
        assert!(TxMgrError::Cancelled.is_cancellation());
        assert!(!TxMgrError::Send("nonce too low".to_string()).is_cancellation());
    }
}
