//! Settlement: submits finalized batches to the ledger and reconciles
//! the engine's cached state root with what actually landed on chain.
//! The chain client itself is a capability the caller provides; this
//! crate only drives the submit/wait/retry loop.

use std::time::Duration;

use alloy::primitives::B256;
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use async_trait::async_trait;
use thiserror::Error;
use zkseq_types::VoteId;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("ledger rejected the submission: {0}")]
    Ledger(String),
    #[error("timed out waiting for transaction inclusion")]
    Timeout,
    #[error("exhausted {0} retries without a successful submission")]
    RetriesExhausted(u32),
}

/// The 8 public inputs in their fixed on-chain order:
/// `(rootBefore, rootAfter, voters, overwritten, censusRoot, blobLimbs[0..2])`.
#[derive(Clone, Debug)]
pub struct StateTransitionSubmission {
    pub vote_ids: Vec<VoteId>,
    pub root_hash_before: Fr,
    pub root_hash_after: Fr,
    pub voters_count: u64,
    pub overwritten_votes_count: u64,
    pub census_root: Fr,
    pub blob_commitment_limbs: [Fr; 3],
}

fn field_to_word(value: Fr) -> B256 {
    let bytes = value.into_bigint().to_bytes_be();
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    B256::from(word)
}

impl StateTransitionSubmission {
    /// The 8 × 32-byte big-endian words, in the order the ledger expects.
    pub fn public_input_words(&self) -> [B256; 8] {
        [
            field_to_word(self.root_hash_before),
            field_to_word(self.root_hash_after),
            field_to_word(Fr::from(self.voters_count)),
            field_to_word(Fr::from(self.overwritten_votes_count)),
            field_to_word(self.census_root),
            field_to_word(self.blob_commitment_limbs[0]),
            field_to_word(self.blob_commitment_limbs[1]),
            field_to_word(self.blob_commitment_limbs[2]),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
}

/// The ledger capability: submitting a state transition and reading the
/// currently finalized root back. A real implementation talks to an L1
/// contract the way `hotshot-state-prover`'s `LightClient` client does;
/// this crate is deliberately blind to how.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn current_state_root(&self) -> Result<Fr, SettlementError>;
    /// Submits the transition and waits for inclusion, returning only
    /// once the transaction is mined (mirroring `submit_state_and_proof`'s
    /// `.watch()` behavior) or failing.
    async fn submit(&self, submission: &StateTransitionSubmission) -> Result<TxReceipt, SettlementError>;
}

/// Lets the settlement loop push the engine's cached root back in line
/// with whatever is actually finalized on chain, at startup and after
/// every receipt.
pub trait StateReconciler: Send + Sync {
    fn reconcile(&self, on_chain_root: Fr);
}

/// Lets the settlement loop mark vote IDs `settled` once their batch's
/// transaction is mined.
pub trait VoteStatusSink: Send + Sync {
    fn mark_settled(&self, vote_ids: &[VoteId]);
}

pub struct SettlementService<L, R, V> {
    ledger: L,
    reconciler: R,
    sink: V,
    retry_interval: Duration,
}

impl<L, R, V> SettlementService<L, R, V>
where
    L: Ledger,
    R: StateReconciler,
    V: VoteStatusSink,
{
    pub fn new(ledger: L, reconciler: R, sink: V, retry_interval: Duration) -> Self {
        Self {
            ledger,
            reconciler,
            sink,
            retry_interval,
        }
    }

    /// Reconcile the caller's cached root against the chain. Call once
    /// at startup, before any batch is submitted.
    pub async fn reconcile_at_startup(&self) -> Result<Fr, SettlementError> {
        let root = self.ledger.current_state_root().await?;
        self.reconciler.reconcile(root);
        Ok(root)
    }

    /// Submit a finalized batch, retrying on ledger failure up to
    /// `max_retries` times. On success, reconciles the cached root and
    /// marks every vote in the batch `settled`. On exhaustion, the batch
    /// is left un-settled for the caller to retry later — the engine is
    /// never rolled back, since its state only diverges from on-chain
    /// truth by not-yet-submitted batches, never by wrongly-applied ones.
    pub async fn submit_with_retry(
        &self,
        submission: StateTransitionSubmission,
        max_retries: u32,
    ) -> Result<TxReceipt, SettlementError> {
        for attempt in 0..max_retries {
            match self.ledger.submit(&submission).await {
                Ok(receipt) => {
                    let root = self.ledger.current_state_root().await?;
                    self.reconciler.reconcile(root);
                    self.sink.mark_settled(&submission.vote_ids);
                    return Ok(receipt);
                },
                Err(err) => {
                    tracing::warn!(attempt, %err, "settlement submission failed, retrying");
                    tokio::time::sleep(self.retry_interval).await;
                },
            }
        }
        Err(SettlementError::RetriesExhausted(max_retries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FlakyLedger {
        succeed_after: u32,
        attempts: Mutex<u32>,
        root: Fr,
    }

    #[async_trait]
    impl Ledger for Arc<FlakyLedger> {
        async fn current_state_root(&self) -> Result<Fr, SettlementError> {
            Ok(self.root)
        }

        async fn submit(&self, _submission: &StateTransitionSubmission) -> Result<TxReceipt, SettlementError> {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            if *attempts < self.succeed_after {
                return Err(SettlementError::Ledger("nonce too low".into()));
            }
            Ok(TxReceipt {
                tx_hash: B256::repeat_byte(0xab),
                block_number: 42,
            })
        }
    }

    struct RecordingReconciler {
        seen: Mutex<Vec<Fr>>,
    }
    impl StateReconciler for Arc<RecordingReconciler> {
        fn reconcile(&self, on_chain_root: Fr) {
            self.seen.lock().push(on_chain_root);
        }
    }

    struct RecordingSink {
        settled: Mutex<Vec<VoteId>>,
    }
    impl VoteStatusSink for Arc<RecordingSink> {
        fn mark_settled(&self, vote_ids: &[VoteId]) {
            self.settled.lock().extend_from_slice(vote_ids);
        }
    }

    fn submission() -> StateTransitionSubmission {
        StateTransitionSubmission {
            vote_ids: vec![VoteId(Fr::from(1u64))],
            root_hash_before: Fr::from(10u64),
            root_hash_after: Fr::from(11u64),
            voters_count: 1,
            overwritten_votes_count: 0,
            census_root: Fr::from(99u64),
            blob_commitment_limbs: [Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_the_ledger_accepts_then_reconciles_and_settles() {
        let ledger = Arc::new(FlakyLedger {
            succeed_after: 3,
            attempts: Mutex::new(0),
            root: Fr::from(11u64),
        });
        let reconciler = Arc::new(RecordingReconciler { seen: Mutex::new(vec![]) });
        let sink = Arc::new(RecordingSink { settled: Mutex::new(vec![]) });
        let service = SettlementService::new(
            ledger.clone(),
            reconciler.clone(),
            sink.clone(),
            Duration::from_millis(1),
        );

        let handle = tokio::spawn(async move { service.submit_with_retry(submission(), 5).await });
        tokio::time::advance(Duration::from_millis(10)).await;
        let receipt = handle.await.unwrap().unwrap();

        assert_eq!(receipt.block_number, 42);
        assert_eq!(*reconciler.seen.lock(), vec![Fr::from(11u64)]);
        assert_eq!(sink.settled.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_retries_leaves_nothing_settled() {
        let ledger = Arc::new(FlakyLedger {
            succeed_after: 100,
            attempts: Mutex::new(0),
            root: Fr::from(11u64),
        });
        let reconciler = Arc::new(RecordingReconciler { seen: Mutex::new(vec![]) });
        let sink = Arc::new(RecordingSink { settled: Mutex::new(vec![]) });
        let service = SettlementService::new(ledger, reconciler, sink.clone(), Duration::from_millis(1));

        let handle = tokio::spawn(async move { service.submit_with_retry(submission(), 3).await });
        tokio::time::advance(Duration::from_millis(10)).await;
        let result = handle.await.unwrap();

        assert!(matches!(result, Err(SettlementError::RetriesExhausted(3))));
        assert!(sink.settled.lock().is_empty());
    }

    #[test]
    fn public_input_words_preserve_order() {
        let words = submission().public_input_words();
        assert_eq!(words[0], field_to_word(Fr::from(10u64)));
        assert_eq!(words[4], field_to_word(Fr::from(99u64)));
    }
}
