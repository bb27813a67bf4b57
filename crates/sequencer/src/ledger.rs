//! A self-contained stand-in for the on-chain contract `zkseq-settlement`
//! submits to: an in-process "chain" that accepts a submission, advances
//! a fake block height and remembers the new root, without touching an
//! RPC endpoint or a real contract ABI (both out of scope — on-chain
//! verification is not implemented here).
//!
//! [`SequencerConfig::rpc_endpoints`] and
//! [`SequencerConfig::contract_addresses`] are threaded through so a
//! future `AlloyLedger` can be dropped in without touching
//! `zkseq-settlement` or the wiring in `lib.rs` — everything downstream
//! only ever sees the `Ledger` trait object.

use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;
use parking_lot::Mutex;
use zkseq_settlement::{Ledger, SettlementError, StateTransitionSubmission, TxReceipt};

struct Inner {
    root: Fr,
    next_block: u64,
}

/// An in-memory ledger: every `submit` "mines" instantly and
/// unconditionally accepts the new root, so the settlement loop never
/// retries against it. Good enough to exercise the full submit →
/// reconcile → mark-settled path without a real chain.
pub struct MockLedger {
    inner: Mutex<Inner>,
}

impl MockLedger {
    pub fn new(genesis_root: Fr) -> Self {
        Self {
            inner: Mutex::new(Inner { root: genesis_root, next_block: 1 }),
        }
    }

    pub fn shared(genesis_root: Fr) -> Arc<Self> {
        Arc::new(Self::new(genesis_root))
    }
}

#[async_trait]
impl Ledger for Arc<MockLedger> {
    async fn current_state_root(&self) -> Result<Fr, SettlementError> {
        Ok(self.inner.lock().root)
    }

    async fn submit(&self, submission: &StateTransitionSubmission) -> Result<TxReceipt, SettlementError> {
        let mut inner = self.inner.lock();
        if inner.root != submission.root_hash_before {
            return Err(SettlementError::Ledger(format!(
                "stale root: chain is at {}, submission assumed {}",
                inner.root, submission.root_hash_before
            )));
        }
        inner.root = submission.root_hash_after;
        let block_number = inner.next_block;
        inner.next_block += 1;

        let mut hash_bytes = [0u8; 32];
        hash_bytes[..8].copy_from_slice(&block_number.to_be_bytes());
        Ok(TxReceipt {
            tx_hash: alloy::primitives::B256::from(hash_bytes),
            block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(before: Fr, after: Fr) -> StateTransitionSubmission {
        StateTransitionSubmission {
            vote_ids: vec![],
            root_hash_before: before,
            root_hash_after: after,
            voters_count: 1,
            overwritten_votes_count: 0,
            census_root: Fr::from(0u64),
            blob_commitment_limbs: [Fr::from(0u64), Fr::from(0u64), Fr::from(0u64)],
        }
    }

    #[tokio::test]
    async fn accepts_a_submission_matching_the_current_root_and_advances_it() {
        let ledger = MockLedger::shared(Fr::from(1u64));
        let receipt = ledger.submit(&submission(Fr::from(1u64), Fr::from(2u64))).await.unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(ledger.current_state_root().await.unwrap(), Fr::from(2u64));
    }

    #[tokio::test]
    async fn rejects_a_submission_whose_before_root_is_stale() {
        let ledger = MockLedger::shared(Fr::from(1u64));
        ledger.submit(&submission(Fr::from(1u64), Fr::from(2u64))).await.unwrap();
        let result = ledger.submit(&submission(Fr::from(1u64), Fr::from(3u64))).await;
        assert!(matches!(result, Err(SettlementError::Ledger(_))));
    }
}
