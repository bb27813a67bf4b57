//! `Vote`: a single voter's submission, before and after re-encryption.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::ballot::{Ballot, Rte, Te};
use crate::ids::VoteId;

/// A census inclusion witness, mode-specific in shape. Carried opaquely
/// here; the census crate knows how to verify it against a census root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusWitness(pub Vec<u8>);

/// A vote as it enters the system (`ballot`, reduced twisted Edwards) and
/// as it is carried internally once re-encrypted (`reencrypted_ballot`,
/// canonical twisted Edwards).
#[derive(Clone, Debug, PartialEq)]
pub struct Vote {
    pub address: Address,
    pub vote_id: VoteId,
    pub weight: u64,
    pub ballot: Ballot<Rte>,
    pub reencrypted_ballot: Option<Ballot<Te>>,
    pub census_witness: CensusWitness,
}

/// Status of a vote as observed through `GET /processes/{id}/votes/{voteID}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Pending,
    Verified,
    Proving,
    Settled,
    Error,
    Unknown,
}

impl Vote {
    pub fn new(
        address: Address,
        vote_id: VoteId,
        weight: u64,
        ballot: Ballot<Rte>,
        census_witness: CensusWitness,
    ) -> Self {
        Self {
            address,
            vote_id,
            weight,
            ballot,
            reencrypted_ballot: None,
            census_witness,
        }
    }
}
