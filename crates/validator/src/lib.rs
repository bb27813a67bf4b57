//! Vote Entry Validator: the seven-step admission sequence every
//! submitted ballot runs through before it is handed to the aggregation
//! driver.
//!
//! The validator owns no storage of its own. It is generic over two
//! small capability traits — [`ProcessDirectory`] and [`PendingIndex`] —
//! so the sequencer can wire it directly against the storage crate
//! without the validator depending on storage or the state engine.

use std::sync::Arc;

use alloy::primitives::Address;
use async_lock::Mutex as AsyncMutex;
use dashmap::DashMap;
use zkseq_ballot::ballot_inputs_hash;
use zkseq_census::{Census, CensusWitness};
use zkseq_prover::{Proof, Prover, PublicInputs as ProverPublicInputs};
use zkseq_types::process::ProcessStatus;
use zkseq_types::{Ballot, ProcessId, Te, VoteError, VoteId};

/// Read access to process metadata the validator needs: liveness,
/// voters count against the cap, and the census to verify witnesses
/// against.
pub trait ProcessDirectory: Send + Sync {
    fn status(&self, process_id: ProcessId) -> Option<ProcessStatus>;
    fn voters_count(&self, process_id: ProcessId) -> Option<u64>;
    fn max_voters(&self, process_id: ProcessId) -> Option<u64>;
    fn census(&self, process_id: ProcessId) -> Option<Arc<Census>>;
}

/// Whether a vote-ID is already pending or settled for an address, and
/// if so, what its ballot-inputs hash was — needed to tell an identical
/// resubmission (`BallotAlreadyProcessing`) from a genuine conflict
/// (`DuplicateVote`).
pub trait PendingIndex: Send + Sync {
    fn existing_for_address(
        &self,
        process_id: ProcessId,
        address: Address,
    ) -> Option<(VoteId, ark_bn254::Fr)>;

    /// Commit a freshly validated vote as the address's pending entry.
    /// Called by the validator under the per-`(process, address)`
    /// admission lock, so the uniqueness check above and this commit are
    /// atomic from the caller's point of view.
    fn admit(&self, process_id: ProcessId, address: Address, vote_id: VoteId, inputs_hash: ark_bn254::Fr);

    /// Mark a previously admitted vote as abandoned: it lost the
    /// earliest-hash tie-break to a later submission for the same
    /// address and will never be batched.
    fn mark_error(&self, process_id: ProcessId, vote_id: VoteId);
}

/// Everything the validator needs to check a single submission.
pub struct Submission {
    pub process_id: ProcessId,
    pub address: Address,
    pub weight: u64,
    pub ballot_mode: zkseq_types::BallotMode,
    pub encryption_key_te: ark_ed_on_bn254::EdwardsAffine,
    pub ballot_te: Ballot<Te>,
    pub vote_id: VoteId,
    pub census_witness: CensusWitness,
    pub proof: Proof,
}

pub struct VoteEntryValidator<D, P, Pr> {
    directory: D,
    pending: P,
    prover: Pr,
    admission_locks: DashMap<(ProcessId, Address), Arc<AsyncMutex<()>>>,
}

impl<D, P, Pr> VoteEntryValidator<D, P, Pr>
where
    D: ProcessDirectory,
    P: PendingIndex,
    Pr: Prover,
{
    pub fn new(directory: D, pending: P, prover: Pr) -> Self {
        Self {
            directory,
            pending,
            prover,
            admission_locks: DashMap::new(),
        }
    }

    /// Run the full seven-step admission sequence. Returns the accepted
    /// `voteID` or the specific rejection kind.
    pub async fn validate(&self, submission: Submission) -> Result<VoteId, VoteError> {
        let process_id = submission.process_id;
        let address = submission.address;

        // Step 1: liveness.
        let status = self
            .directory
            .status(process_id)
            .ok_or(VoteError::UnknownProcess(process_id))?;
        if !status.accepts_votes() {
            return Err(VoteError::ProcessNotAccepting(process_id));
        }

        // Step 2: capacity.
        let voters = self
            .directory
            .voters_count(process_id)
            .unwrap_or(0);
        let max = self.directory.max_voters(process_id).unwrap_or(u64::MAX);
        if voters >= max {
            return Err(VoteError::MaxVotersReached(process_id));
        }

        // Admission lock: serialize concurrent submissions for the same
        // (process, address) so step 6's duplicate check can't race. The
        // per-key mutex is held for the whole remaining sequence,
        // including the commit to `pending` in step 7, so two concurrent
        // submissions for the same address are fully ordered — the
        // uniqueness check and the commit that makes it visible to the
        // next caller happen atomically, not as two separately-lockable
        // steps.
        let lock_key = (process_id, address);
        let key_lock = self
            .admission_locks
            .entry(lock_key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = key_lock.lock().await;

        self.validate_locked(&submission, status).await
    }

    async fn validate_locked(
        &self,
        submission: &Submission,
        _status: ProcessStatus,
    ) -> Result<VoteId, VoteError> {
        // Step 3: recompute the ballot-inputs hash.
        let recomputed = ballot_inputs_hash(
            submission.process_id,
            &submission.ballot_mode,
            submission.encryption_key_te,
            submission.address,
            submission.vote_id,
            &submission.ballot_te,
            submission.weight,
        )
        .map_err(|e| VoteError::InvalidInput(e.to_string()))?;

        // Step 4: verify the ballot proof against that public input.
        let public_inputs: ProverPublicInputs = vec![recomputed];
        let verified = self
            .prover
            .verify(&public_inputs, &submission.proof)
            .await
            .map_err(|_| VoteError::ProofVerificationFailed)?;
        if !verified {
            return Err(VoteError::ProofVerificationFailed);
        }

        // Step 5: census witness.
        let census = self
            .directory
            .census(submission.process_id)
            .ok_or(VoteError::UnknownProcess(submission.process_id))?;
        let witness_ok = census
            .verify_proof(submission.address, submission.weight, &submission.census_witness)
            .map_err(|_| VoteError::InvalidCensusProof)?;
        if !witness_ok {
            return Err(VoteError::InvalidCensusProof);
        }

        // Step 6: uniqueness, with the earliest-hash-wins tie-break for
        // genuinely concurrent distinct submissions.
        if let Some((existing_vote_id, existing_hash)) = self
            .pending
            .existing_for_address(submission.process_id, submission.address)
        {
            if existing_vote_id == submission.vote_id {
                return Err(VoteError::BallotAlreadyProcessing(
                    submission.vote_id,
                    submission.address,
                ));
            }
            if existing_hash <= recomputed {
                return Err(VoteError::DuplicateVote {
                    vote_id: submission.vote_id,
                    address: submission.address,
                });
            }
            // The new submission wins the tie-break; the vote it
            // supersedes is abandoned rather than left `Pending` forever.
            self.pending.mark_error(submission.process_id, existing_vote_id);
        }

        // Step 7: admission, committed under the same lock that guarded
        // the uniqueness check above. Enqueuing onto the aggregation
        // driver's batching queue is still the caller's responsibility
        // once this returns `Ok`; the validator's contract ends at
        // acceptance-and-commit.
        self.pending
            .admit(submission.process_id, submission.address, submission.vote_id, recomputed);
        Ok(submission.vote_id)
    }
}
