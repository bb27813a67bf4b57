//! Compile-time constants shared across the workspace.
//!
//! These mirror the circuit-fixed parameters of the system: the number of
//! ElGamal ciphertext pairs packed into a ballot, and the number of vote
//! slots aggregated into a single recursively-proven batch. Both are
//! baked into the (out-of-scope) circuit arithmetization, so they are
//! immutable process-wide constants here rather than configuration.

/// Number of ElGamal ciphertext pairs carried by every ballot, zero-padded.
pub const FIELDS_PER_BALLOT: usize = 8;

/// Number of vote slots in a single batch. Unused slots carry dummy proofs.
pub const VOTES_PER_BATCH: usize = 10;

/// The dummy scalar used to pad unused aggregator input slots.
pub const AGGREGATOR_DUMMY_SCALAR: u64 = 1;
