//! Shared data model, identifiers and error taxonomy for the sequencer
//! workspace. Every other crate depends on this one and nothing in here
//! depends back on them.

pub mod auth;
pub mod ballot;
pub mod ballot_mode;
pub mod consts;
pub mod error;
pub mod ids;
pub mod job;
pub mod process;
pub mod vote;
pub mod worker;

pub use ballot::{Ballot, ElGamalPair, Rte, Te};
pub use ballot_mode::BallotMode;
pub use error::{StorageError, VoteError, WorkerError};
pub use ids::{ProcessId, VoteId};
pub use job::Job;
pub use process::{Process, ProcessStatus};
pub use vote::Vote;
pub use worker::Worker;
