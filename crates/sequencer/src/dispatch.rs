//! Routes the Aggregation Driver's proof requests out to external worker
//! nodes over the `GET /workers/job` / `POST /workers/job/{voteID}` pair,
//! instead of proving locally the way a bare [`MockProver`] would.
//!
//! [`AggregationDriver`] is generic over [`Prover`] and only ever calls
//! `prove`/`verify`; this type is the glue that makes that call show up
//! as a job on the wire. A request blocks until some worker claims the
//! matching job and reports back, the same way a real recursive-proving
//! cluster would be fronted.
//!
//! `verify` still delegates to [`MockProver`]: the workers in this
//! deployment "prove" by computing the same Poseidon commitment the mock
//! prover would, so a real SNARK verifier could be substituted here
//! without touching the dispatch protocol.

use std::collections::VecDeque;
use std::sync::Arc;

use ark_bn254::Fr;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use zkseq_prover::{MockProver, Proof, Prover, ProverError, PublicInputs};
use zkseq_types::VoteId;

struct WaitingJob {
    public_inputs: PublicInputs,
    completion: oneshot::Sender<Result<Proof, ProverError>>,
}

/// The payload `GET /workers/job` hands to whichever worker claims a job:
/// enough to let it recompute the same Poseidon commitment locally.
#[derive(Clone, Debug)]
pub struct JobPayload {
    pub vote_id: VoteId,
    pub public_inputs: PublicInputs,
}

#[derive(Default)]
pub struct WorkerDispatchProver {
    inner: MockProver,
    waiting: DashMap<VoteId, WaitingJob>,
    queue: Mutex<VecDeque<VoteId>>,
}

impl WorkerDispatchProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the next unclaimed job, if any — the `GET /workers/job`
    /// handler's source of truth for whether there's work to assign.
    pub fn next_job(&self) -> Option<JobPayload> {
        loop {
            let vote_id = self.queue.lock().pop_front()?;
            if let Some(entry) = self.waiting.get(&vote_id) {
                return Some(JobPayload {
                    vote_id,
                    public_inputs: entry.public_inputs.clone(),
                });
            }
            // Job was already completed (e.g. requeued by an expiry tick
            // before any worker picked it up) — drop the stale ID and
            // keep looking.
        }
    }

    /// `POST /workers/job/{voteID}`: resolve a pending dispatch with the
    /// worker's reported outcome. Returns `false` if no such job (or the
    /// job is not this dispatcher's).
    pub fn complete(&self, vote_id: VoteId, success: bool, commitment: Option<Fr>) -> bool {
        let Some((_, job)) = self.waiting.remove(&vote_id) else {
            return false;
        };
        let result = if success {
            match commitment {
                Some(value) => Ok(Proof(value)),
                None => Err(ProverError::ProveFailed("worker reported success with no proof".into())),
            }
        } else {
            Err(ProverError::ProveFailed("worker reported failure".into()))
        };
        let _ = job.completion.send(result);
        true
    }
}

#[async_trait]
impl Prover for Arc<WorkerDispatchProver> {
    async fn setup(&self) -> Result<(), ProverError> {
        self.inner.setup().await
    }

    /// Publishes the job and waits for a worker to claim and complete it
    /// via the HTTP dispatch surface.
    async fn prove(&self, public_inputs: &PublicInputs) -> Result<Proof, ProverError> {
        if public_inputs.is_empty() {
            return Err(ProverError::ProveFailed("no public inputs".into()));
        }
        let vote_id = VoteId(public_inputs[0]);
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(
            vote_id,
            WaitingJob {
                public_inputs: public_inputs.clone(),
                completion: tx,
            },
        );
        self.queue.lock().push_back(vote_id);
        rx.await
            .map_err(|_| ProverError::ProveFailed("dispatch cancelled before a worker responded".into()))?
    }

    async fn verify(&self, public_inputs: &PublicInputs, proof: &Proof) -> Result<bool, ProverError> {
        self.inner.verify(public_inputs, proof).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_claimed_job_completes_the_matching_prove_call() {
        let dispatcher = Arc::new(WorkerDispatchProver::new());
        let d = dispatcher.clone();
        let public_inputs = vec![Fr::from(7u64)];
        let handle = tokio::spawn({
            let d = d.clone();
            let inputs = public_inputs.clone();
            async move { d.prove(&inputs).await }
        });

        // Give the prove() call a chance to publish its job.
        tokio::task::yield_now().await;
        let job = loop {
            if let Some(job) = dispatcher.next_job() {
                break job;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(job.public_inputs, public_inputs);

        let commitment = zkseq_crypto::poseidon::hash(&public_inputs).unwrap();
        assert!(dispatcher.complete(job.vote_id, true, Some(commitment)));

        let proof = handle.await.unwrap().unwrap();
        assert!(dispatcher.verify(&public_inputs, &proof).await.unwrap());
    }

    #[tokio::test]
    async fn a_worker_reported_failure_propagates_to_the_caller() {
        let dispatcher = Arc::new(WorkerDispatchProver::new());
        let public_inputs = vec![Fr::from(1u64)];
        let handle = tokio::spawn({
            let d = dispatcher.clone();
            let inputs = public_inputs.clone();
            async move { d.prove(&inputs).await }
        });

        tokio::task::yield_now().await;
        let job = loop {
            if let Some(job) = dispatcher.next_job() {
                break job;
            }
            tokio::task::yield_now().await;
        };
        dispatcher.complete(job.vote_id, false, None);
        assert!(handle.await.unwrap().is_err());
    }
}
