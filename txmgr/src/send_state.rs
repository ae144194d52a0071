//! Per-send accounting shared by concurrent submission attempts
//!
//! Tracks which variants of the managed transaction have been observed
//! mined, and how many consecutive nonce-too-low errors the broadcast hook
//! has produced. The two together decide whether another sender has taken
//! our nonce and the whole send should abort.

use crate::error::TxMgrError;

use ethers::types::H256;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Predicate deciding whether a send error counts toward the abort threshold.
/// The default matches the backend's nonce-too-low message by substring;
/// callers with typed backend errors can supply their own.
pub type NonceClassifier = Arc<dyn Fn(&TxMgrError) -> bool + Send + Sync>;

// mined_txs and the counter are coupled by the reset rule, so both live
// under one lock.
struct Inner {
    mined_txs: HashSet<H256>,
    nonce_too_low_count: u64,
}

/// Shared tally of mined variants and nonce-too-low send errors for one
/// logical send
pub struct SendState {
    inner: RwLock<Inner>,
    safe_abort_nonce_too_low_count: u64,
    classifier: NonceClassifier,
}

impl SendState {
    /// Create a send state with the default substring classifier
    pub fn new(safe_abort_nonce_too_low_count: u64) -> Self {
        Self::with_classifier(
            safe_abort_nonce_too_low_count,
            Arc::new(|err: &TxMgrError| err.is_nonce_too_low()),
        )
    }

    /// Create a send state with a caller-supplied nonce-error classifier
    pub fn with_classifier(
        safe_abort_nonce_too_low_count: u64,
        classifier: NonceClassifier,
    ) -> Self {
        assert!(
            safe_abort_nonce_too_low_count > 0,
            "safe_abort_nonce_too_low_count must be > 0"
        );
        Self {
            inner: RwLock::new(Inner {
                mined_txs: HashSet::new(),
                nonce_too_low_count: 0,
            }),
            safe_abort_nonce_too_low_count,
            classifier,
        }
    }

    /// Record the outcome of a broadcast. `None` is a no-op; only errors the
    /// classifier recognizes as nonce-too-low advance the counter.
    pub fn record_send_error(&self, err: Option<&TxMgrError>) {
        let err = match err {
            Some(err) => err,
            None => return,
        };

        if !(self.classifier)(err) {
            return;
        }

        self.inner.write().nonce_too_low_count += 1;
    }

    /// Record that a variant was observed mined
    pub fn tx_mined(&self, tx_hash: H256) {
        self.inner.write().mined_txs.insert(tx_hash);
    }

    /// Record that a variant is no longer observed mined.
    ///
    /// When the removal empties the set the nonce-too-low streak is reset:
    /// a variant that was mined and then vanished means the streak is not
    /// evidence of a stuck submitter.
    pub fn tx_not_mined(&self, tx_hash: H256) {
        let mut inner = self.inner.write();

        let was_mined = inner.mined_txs.remove(&tx_hash);
        if was_mined && inner.mined_txs.is_empty() {
            inner.nonce_too_low_count = 0;
        }
    }

    /// Whether the nonce-too-low streak has crossed the abort threshold with
    /// no variant alive on-chain. Once any variant is mined, further
    /// nonce-too-low errors from parallel attempts are expected and benign.
    pub fn should_abort_immediately(&self) -> bool {
        let inner = self.inner.read();

        if !inner.mined_txs.is_empty() {
            return false;
        }

        inner.nonce_too_low_count >= self.safe_abort_nonce_too_low_count
    }

    /// Whether a mined variant is still ripening toward its confirmation
    /// depth. The driver suppresses new attempts while this holds.
    pub fn is_waiting_for_confirmation(&self) -> bool {
        !self.inner.read().mined_txs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    fn nonce_too_low() -> TxMgrError {
        TxMgrError::Send("nonce too low".to_string())
    }

    #[test]
    fn test_record_none_is_noop() {
        let state = SendState::new(1);
        state.record_send_error(None);
        assert!(!state.should_abort_immediately());
    }

    #[test]
    fn test_only_nonce_too_low_counts() {
        let state = SendState::new(2);

        state.record_send_error(Some(&TxMgrError::Send("connection reset".to_string())));
        state.record_send_error(Some(&TxMgrError::Rpc("timeout".to_string())));
        assert!(!state.should_abort_immediately());

        state.record_send_error(Some(&nonce_too_low()));
        state.record_send_error(Some(&nonce_too_low()));
        assert!(state.should_abort_immediately());
    }

    #[test]
    fn test_abort_requires_threshold() {
        let state = SendState::new(3);

        state.record_send_error(Some(&nonce_too_low()));
        state.record_send_error(Some(&nonce_too_low()));
        assert!(!state.should_abort_immediately());

        state.record_send_error(Some(&nonce_too_low()));
        assert!(state.should_abort_immediately());
    }

    #[test]
    fn test_mined_variant_suppresses_abort() {
        let state = SendState::new(1);

        state.tx_mined(hash(1));
        state.record_send_error(Some(&nonce_too_low()));
        state.record_send_error(Some(&nonce_too_low()));

        // Counter is over threshold but a variant is alive on-chain
        assert!(!state.should_abort_immediately());
        assert!(state.is_waiting_for_confirmation());
    }

    #[test]
    fn test_reorg_resets_counter() {
        let state = SendState::new(2);

        state.tx_mined(hash(1));
        state.record_send_error(Some(&nonce_too_low()));
        state.record_send_error(Some(&nonce_too_low()));

        // Removing the only mined variant empties the set and clears the streak
        state.tx_not_mined(hash(1));
        assert!(!state.is_waiting_for_confirmation());
        assert!(!state.should_abort_immediately());

        // A new streak restarts from zero
        state.record_send_error(Some(&nonce_too_low()));
        assert!(!state.should_abort_immediately());
        state.record_send_error(Some(&nonce_too_low()));
        assert!(state.should_abort_immediately());
    }

    #[test]
    fn test_removal_of_unknown_hash_does_not_reset() {
        let state = SendState::new(1);

        state.record_send_error(Some(&nonce_too_low()));

        // Hash was never mined; the streak must survive
        state.tx_not_mined(hash(9));
        assert!(state.should_abort_immediately());
    }

    #[test]
    fn test_reset_only_when_set_empties() {
        let state = SendState::new(1);

        state.tx_mined(hash(1));
        state.tx_mined(hash(2));
        state.record_send_error(Some(&nonce_too_low()));

        state.tx_not_mined(hash(1));
        assert!(state.is_waiting_for_confirmation());

        // Set is still non-empty, so the counter was not reset; emptying it now is
        state.tx_not_mined(hash(2));
        assert!(!state.should_abort_immediately());
    }

    #[test]
    fn test_custom_classifier() {
        let state = SendState::with_classifier(
            1,
            Arc::new(|err: &TxMgrError| matches!(err, TxMgrError::Rpc(_))),
        );

        state.record_send_error(Some(&nonce_too_low()));
        assert!(!state.should_abort_immediately());

        state.record_send_error(Some(&TxMgrError::Rpc("rejected".to_string())));
        assert!(state.should_abort_immediately());
    }

    #[test]
    #[should_panic(expected = "safe_abort_nonce_too_low_count must be > 0")]
    fn test_zero_threshold_panics() {
        SendState::new(0);
    }
}
