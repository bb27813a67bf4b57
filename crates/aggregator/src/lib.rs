//! Aggregation Driver: batches validated votes, aggregates their
//! per-vote sub-hashes into one Poseidon commitment, requests a proof
//! over it, and on success hands the batch to the State Engine.
//!
//! Forms a batch when either `votes_per_batch` votes are queued or
//! `batch_time_window` has elapsed since the oldest queued vote, a
//! configurable trigger.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ark_bn254::Fr;
use ark_ed_on_bn254::{EdwardsAffine, Fr as EdFr};
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use zkseq_crypto::poseidon;
use zkseq_engine::{PendingVote, PublicInputs as EnginePublicInputs, StateEngine};
use zkseq_prover::{Prover, PublicInputs as ProverPublicInputs};
use zkseq_types::consts::{AGGREGATOR_DUMMY_SCALAR, VOTES_PER_BATCH};
use zkseq_types::{Ballot, Rte, VoteId};

use alloy::primitives::Address;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("poseidon hashing failed: {0}")]
    Hash(#[from] zkseq_crypto::PoseidonError),
    #[error("engine failure: {0}")]
    Engine(#[from] zkseq_engine::EngineError),
    #[error("proving failed: {0}")]
    Prove(#[from] zkseq_prover::ProverError),
}

/// A vote admitted by the validator, carrying the sub-hash its ballot
/// proof already committed to.
pub struct QueuedVote {
    pub vote_id: VoteId,
    pub address: Address,
    pub weight: u64,
    pub sub_hash: Fr,
    pub ballot_rte: Ballot<Rte>,
}

/// The result of forming and proving one batch.
pub struct FinalizedBatch {
    pub vote_ids: Vec<VoteId>,
    pub public_inputs: EnginePublicInputs,
    pub aggregate_hash: Fr,
}

/// Aggregate up to `VOTES_PER_BATCH` per-vote sub-hashes into the single
/// scalar the recursive circuit commits to, padding unused slots with
/// the dummy scalar.
pub fn aggregate_hash(sub_hashes: &[Fr]) -> Result<Fr, AggregatorError> {
    let mut inputs = sub_hashes.to_vec();
    inputs.resize(VOTES_PER_BATCH, Fr::from(AGGREGATOR_DUMMY_SCALAR));
    Ok(poseidon::hash(&inputs)?)
}

struct Inner {
    queue: VecDeque<QueuedVote>,
    oldest_queued_at: Option<std::time::Instant>,
}

pub struct AggregationDriver<Pr> {
    engine: Arc<StateEngine>,
    prover: Pr,
    encryption_key: EdwardsAffine,
    votes_per_batch: usize,
    batch_time_window: Duration,
    inner: Mutex<Inner>,
}

impl<Pr: Prover> AggregationDriver<Pr> {
    pub fn new(
        engine: Arc<StateEngine>,
        prover: Pr,
        encryption_key: EdwardsAffine,
        votes_per_batch: usize,
        batch_time_window: Duration,
    ) -> Self {
        Self {
            engine,
            prover,
            encryption_key,
            votes_per_batch,
            batch_time_window,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                oldest_queued_at: None,
            }),
        }
    }

    pub fn enqueue(&self, vote: QueuedVote) {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() {
            inner.oldest_queued_at = Some(std::time::Instant::now());
        }
        inner.queue.push_back(vote);
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    fn window_elapsed(&self) -> bool {
        self.inner
            .lock()
            .oldest_queued_at
            .is_some_and(|t| t.elapsed() >= self.batch_time_window)
    }

    fn ready(&self) -> bool {
        let inner = self.inner.lock();
        inner.queue.len() >= self.votes_per_batch || (!inner.queue.is_empty() && self.window_elapsed())
    }

    fn drain_batch(&self) -> Vec<QueuedVote> {
        let mut inner = self.inner.lock();
        let n = inner.queue.len().min(self.votes_per_batch);
        let drained: Vec<_> = inner.queue.drain(..n).collect();
        inner.oldest_queued_at = if inner.queue.is_empty() {
            None
        } else {
            Some(std::time::Instant::now())
        };
        drained
    }

    fn requeue(&self, votes: Vec<QueuedVote>) {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() && !votes.is_empty() {
            inner.oldest_queued_at = Some(std::time::Instant::now());
        }
        for vote in votes.into_iter().rev() {
            inner.queue.push_front(vote);
        }
    }

    /// Form one batch (if ready) and attempt to prove and finalize it.
    /// On proof failure, every vote in the attempted batch is returned
    /// to the front of the pending queue for retry.
    pub async fn try_form_and_submit_batch(
        &self,
        k0: EdFr,
    ) -> Result<Option<FinalizedBatch>, AggregatorError> {
        if !self.ready() {
            return Ok(None);
        }
        let batch = self.drain_batch();
        if batch.is_empty() {
            return Ok(None);
        }

        let sub_hashes: Vec<Fr> = batch.iter().map(|v| v.sub_hash).collect();
        let aggregate = aggregate_hash(&sub_hashes)?;
        let public_inputs: ProverPublicInputs = vec![aggregate];

        let proof = match self.prover.prove(&public_inputs).await {
            Ok(proof) => proof,
            Err(e) => {
                tracing::warn!(error = %e, batch_size = batch.len(), "aggregator proof request failed, re-queueing batch");
                self.requeue(batch);
                return Err(AggregatorError::Prove(e));
            }
        };

        let verified = self.prover.verify(&public_inputs, &proof).await?;
        if !verified {
            tracing::warn!(batch_size = batch.len(), "aggregator proof failed verification, re-queueing batch");
            self.requeue(batch);
            return Err(AggregatorError::Prove(zkseq_prover::ProverError::VerificationFailed));
        }

        let vote_ids: Vec<VoteId> = batch.iter().map(|v| v.vote_id).collect();
        let pending_votes: Vec<PendingVote> = batch
            .into_iter()
            .map(|v| PendingVote {
                address: v.address,
                weight: v.weight,
                ballot_rte: v.ballot_rte,
            })
            .collect();

        let public_inputs = self
            .engine
            .add_votes_batch(pending_votes, self.encryption_key, k0)?;

        Ok(Some(FinalizedBatch {
            vote_ids,
            public_inputs,
            aggregate_hash: aggregate,
        }))
    }

    /// Drive the batch-formation loop until `cancel` fires. Intended to
    /// be spawned as a background task by the sequencer.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, poll_interval: Duration, k0_seed: EdFr)
    where
        Pr: 'static,
    {
        let mut k = k0_seed;
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("aggregation driver stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.try_form_and_submit_batch(k).await {
                        Ok(Some(batch)) => {
                            tracing::info!(voters = batch.public_inputs.voters_count, "finalized batch");
                            k = zkseq_crypto::elgamal::next_chained_k(k);
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "batch attempt failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::{AffineRepr, CurveGroup};
    use ark_std::{rand::rngs::StdRng, rand::SeedableRng, UniformRand};
    use zkseq_prover::MockProver;
    use zkseq_types::ElGamalPair;

    fn test_key(rng: &mut StdRng) -> EdwardsAffine {
        (EdwardsAffine::generator() * EdFr::rand(rng)).into_affine()
    }

    fn dummy_vote(sub_hash: Fr, address: Address) -> QueuedVote {
        QueuedVote {
            vote_id: VoteId(sub_hash),
            address,
            weight: 1,
            sub_hash,
            ballot_rte: Ballot::from_pairs(vec![ElGamalPair::zero(); 1]),
        }
    }

    #[test]
    fn aggregate_hash_pads_to_votes_per_batch() {
        let one = aggregate_hash(&[Fr::from(1u64)]).unwrap();
        let also_one_explicit_pad = aggregate_hash(&{
            let mut v = vec![Fr::from(1u64)];
            v.resize(VOTES_PER_BATCH, Fr::from(AGGREGATOR_DUMMY_SCALAR));
            v
        })
        .unwrap();
        assert_eq!(one, also_one_explicit_pad);
    }

    #[tokio::test]
    async fn forms_a_batch_once_votes_per_batch_reached() {
        let mut rng = StdRng::seed_from_u64(11);
        let pk = test_key(&mut rng);
        let engine = Arc::new(StateEngine::new(Fr::from(0u64)));
        let driver = AggregationDriver::new(engine, MockProver, pk, 2, Duration::from_secs(3600));

        driver.enqueue(dummy_vote(Fr::from(1u64), Address::repeat_byte(1)));
        assert!(driver.try_form_and_submit_batch(EdFr::from(1u64)).await.unwrap().is_none());

        driver.enqueue(dummy_vote(Fr::from(2u64), Address::repeat_byte(2)));
        let batch = driver.try_form_and_submit_batch(EdFr::from(1u64)).await.unwrap();
        assert!(batch.is_some());
        assert_eq!(batch.unwrap().vote_ids.len(), 2);
        assert_eq!(driver.pending_len(), 0);
    }

    #[tokio::test]
    async fn forms_a_batch_once_window_elapses() {
        let mut rng = StdRng::seed_from_u64(12);
        let pk = test_key(&mut rng);
        let engine = Arc::new(StateEngine::new(Fr::from(0u64)));
        let driver = AggregationDriver::new(engine, MockProver, pk, 10, Duration::from_millis(1));

        driver.enqueue(dummy_vote(Fr::from(5u64), Address::repeat_byte(9)));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let batch = driver.try_form_and_submit_batch(EdFr::from(1u64)).await.unwrap();
        assert!(batch.is_some());
    }
}
