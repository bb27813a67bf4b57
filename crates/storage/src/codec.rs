//! Canonical on-disk encodings for the record types that mix arkworks
//! curve/field data (no native serde) with plain serde-friendly data.
//! `ark-serialize` handles the curve data; `bincode` wraps the result,
//! matching the split the ambient stack calls for.

use alloy::primitives::{Address, B256};
use ark_bn254::Fr;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zkseq_types::ballot::{Ballot, Rte, Te};
use zkseq_types::vote::{CensusWitness, Vote, VoteStatus};
use zkseq_types::worker::Worker;
use zkseq_types::{ProcessId, VoteId};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode encoding failed: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("curve point encoding failed: {0}")]
    Curve(#[from] ark_serialize::SerializationError),
}

#[derive(Serialize, Deserialize)]
struct VoteRecord {
    address: [u8; 20],
    vote_id: VoteId,
    weight: u64,
    ballot: Vec<u8>,
    reencrypted_ballot: Option<Vec<u8>>,
    census_witness: CensusWitness,
}

pub fn encode_vote(vote: &Vote) -> Result<Vec<u8>, CodecError> {
    let mut ballot_bytes = Vec::new();
    vote.ballot.serialize_compressed(&mut ballot_bytes)?;

    let reencrypted_ballot = vote
        .reencrypted_ballot
        .as_ref()
        .map(|b| {
            let mut buf = Vec::new();
            b.serialize_compressed(&mut buf)?;
            Ok::<_, ark_serialize::SerializationError>(buf)
        })
        .transpose()?;

    let record = VoteRecord {
        address: *vote.address,
        vote_id: vote.vote_id,
        weight: vote.weight,
        ballot: ballot_bytes,
        reencrypted_ballot,
        census_witness: vote.census_witness.clone(),
    };
    Ok(bincode::serialize(&record)?)
}

pub fn decode_vote(bytes: &[u8]) -> Result<Vote, CodecError> {
    let record: VoteRecord = bincode::deserialize(bytes)?;
    let ballot: Ballot<Rte> = Ballot::deserialize_compressed(&record.ballot[..])?;
    let reencrypted_ballot = record
        .reencrypted_ballot
        .as_deref()
        .map(Ballot::<Te>::deserialize_compressed)
        .transpose()?;

    Ok(Vote {
        address: Address::from(record.address),
        vote_id: record.vote_id,
        weight: record.weight,
        ballot,
        reencrypted_ballot,
        census_witness: record.census_witness,
    })
}

#[derive(Serialize, Deserialize)]
struct WorkerRecord {
    address: [u8; 20],
    name: String,
    consecutive_failures: u32,
    banned_until_unix_nanos: i64,
    total_successes: u32,
    total_failures: u32,
}

pub fn encode_worker(worker: &Worker) -> Result<Vec<u8>, CodecError> {
    use std::sync::atomic::Ordering;
    let record = WorkerRecord {
        address: *worker.address,
        name: worker.name(),
        consecutive_failures: worker.consecutive_failures.load(Ordering::SeqCst),
        banned_until_unix_nanos: worker.banned_until_unix_nanos.load(Ordering::SeqCst),
        total_successes: worker.total_successes.load(Ordering::SeqCst),
        total_failures: worker.total_failures.load(Ordering::SeqCst),
    };
    Ok(bincode::serialize(&record)?)
}

pub fn decode_worker(bytes: &[u8]) -> Result<Worker, CodecError> {
    let record: WorkerRecord = bincode::deserialize(bytes)?;
    let worker = Worker::new(Address::from(record.address), record.name);
    worker
        .consecutive_failures
        .store(record.consecutive_failures, std::sync::atomic::Ordering::SeqCst);
    worker
        .banned_until_unix_nanos
        .store(record.banned_until_unix_nanos, std::sync::atomic::Ordering::SeqCst);
    worker
        .total_successes
        .store(record.total_successes, std::sync::atomic::Ordering::SeqCst);
    worker
        .total_failures
        .store(record.total_failures, std::sync::atomic::Ordering::SeqCst);
    Ok(worker)
}

/// The record behind the `pending/<pid>/<voteID>` key space: the
/// address-uniqueness entry the validator's tie-break reads, plus the
/// vote's current lifecycle status, so both the `by_address` index and
/// the status table in `PendingVotes` can be rebuilt from a single scan.
#[derive(Serialize, Deserialize)]
struct PendingRecord {
    process_id: [u8; 32],
    vote_id: VoteId,
    address: [u8; 20],
    inputs_hash: Vec<u8>,
    status: VoteStatus,
}

pub fn encode_pending(
    process_id: ProcessId,
    vote_id: VoteId,
    address: Address,
    inputs_hash: Fr,
    status: VoteStatus,
) -> Result<Vec<u8>, CodecError> {
    let mut hash_bytes = Vec::new();
    inputs_hash.serialize_compressed(&mut hash_bytes)?;
    let record = PendingRecord {
        process_id: process_id.to_bytes32(),
        vote_id,
        address: *address,
        inputs_hash: hash_bytes,
        status,
    };
    Ok(bincode::serialize(&record)?)
}

pub fn decode_pending(bytes: &[u8]) -> Result<(ProcessId, VoteId, Address, Fr, VoteStatus), CodecError> {
    let record: PendingRecord = bincode::deserialize(bytes)?;
    let inputs_hash = Fr::deserialize_compressed(&record.inputs_hash[..])?;
    Ok((
        ProcessId(B256::from(record.process_id)),
        record.vote_id,
        Address::from(record.address),
        inputs_hash,
        record.status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use zkseq_types::ballot::ElGamalPair;

    #[test]
    fn vote_round_trips_through_its_wire_encoding() {
        let ballot = Ballot::<Rte>::from_pairs(vec![ElGamalPair::zero()]);
        let vote = Vote::new(
            Address::repeat_byte(9),
            VoteId(Fr::from(3u64)),
            1,
            ballot,
            CensusWitness(vec![1, 2, 3]),
        );
        let encoded = encode_vote(&vote).unwrap();
        let decoded = decode_vote(&encoded).unwrap();
        assert_eq!(decoded, vote);
    }

    #[test]
    fn pending_record_round_trips_through_its_wire_encoding() {
        use alloy::primitives::B256;

        let process_id = ProcessId(B256::repeat_byte(2));
        let vote_id = VoteId(Fr::from(11u64));
        let address = Address::repeat_byte(6);
        let inputs_hash = Fr::from(99u64);

        let encoded = encode_pending(process_id, vote_id, address, inputs_hash, VoteStatus::Pending).unwrap();
        let (decoded_pid, decoded_vid, decoded_addr, decoded_hash, decoded_status) =
            decode_pending(&encoded).unwrap();

        assert_eq!(decoded_pid, process_id);
        assert_eq!(decoded_vid, vote_id);
        assert_eq!(decoded_addr, address);
        assert_eq!(decoded_hash, inputs_hash);
        assert_eq!(decoded_status, VoteStatus::Pending);
    }

    #[test]
    fn worker_round_trips_through_its_wire_encoding() {
        let worker = Worker::new(Address::repeat_byte(4), "alice".into());
        worker.consecutive_failures.store(2, std::sync::atomic::Ordering::SeqCst);
        let encoded = encode_worker(&worker).unwrap();
        let decoded = decode_worker(&encoded).unwrap();
        assert_eq!(decoded.name(), "alice");
        assert_eq!(
            decoded.consecutive_failures.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }
}
