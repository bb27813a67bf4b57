//! The error taxonomy shared by crates with no domain-specific error of
//! their own. `zkseq-prover` and `zkseq-settlement` define and own their
//! own error enums instead of extending this one.
//!
//! Every boundary-facing failure is an enumerable, named kind so the HTTP
//! layer and the retry logic upstream can match on it instead of parsing
//! strings.

use alloy::primitives::Address;

use crate::ids::{ProcessId, VoteId};

#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    #[error("process {0} does not exist")]
    UnknownProcess(ProcessId),

    #[error("process {0} is not accepting votes")]
    ProcessNotAccepting(ProcessId),

    #[error("process {0} has reached its max-voters limit")]
    MaxVotersReached(ProcessId),

    #[error("malformed submission: {0}")]
    InvalidInput(String),

    #[error("census witness does not verify against the process census root")]
    InvalidCensusProof,

    #[error("ballot proof failed verification")]
    ProofVerificationFailed,

    #[error("vote {vote_id} for {address} is already processing with a different ballot")]
    DuplicateVote { vote_id: VoteId, address: Address },

    #[error("vote {0} for {1} is already processing with an identical ballot")]
    BallotAlreadyProcessing(VoteId, Address),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker {0} is not registered")]
    WorkerNotFound(Address),

    #[error("worker {0} is banned")]
    WorkerBanned(Address),

    #[error("worker {0} already has a job in flight")]
    WorkerBusy(Address),

    #[error("no pending job for vote {0}")]
    NoSuchJob(VoteId),

    #[error("authentication token failed to verify")]
    InvalidToken,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("record not found for key {0}")]
    NotFound(String),

    #[error("record at key {0} failed to decode: {1}")]
    Corrupt(String, String),
}
