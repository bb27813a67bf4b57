//! A LeanIMT-style incremental Merkle tree over `address -> weight`
//! entries, Poseidon-hashed.
//!
//! Unlike a fixed-depth sparse tree, a LeanIMT's depth grows with its
//! leaf count and it never hashes a node with a missing sibling: a node
//! with only one child is simply promoted unchanged to the next level.
//! This keeps the root stable as the census grows by `AddBulk` without
//! baking in a maximum capacity.

use alloy::primitives::Address;
use ark_bn254::Fr;
use indexmap::IndexMap;
use zkseq_crypto::{address_to_field, poseidon};

use crate::CensusError;

fn leaf_hash(address: Address, weight: u64) -> Result<Fr, CensusError> {
    poseidon::hash(&[address_to_field(address), Fr::from(weight)]).map_err(CensusError::Hash)
}

fn node_hash(left: Fr, right: Fr) -> Result<Fr, CensusError> {
    poseidon::hash(&[left, right]).map_err(CensusError::Hash)
}

/// One Merkle inclusion witness: the sibling at every level from the leaf
/// up to the root, and the left/right path bit at each level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub siblings: Vec<Fr>,
    pub path_bits: Vec<bool>,
}

/// A key-weighted incremental Merkle tree keyed by insertion order.
#[derive(Clone, Debug, Default)]
pub struct MerkleCensus {
    entries: IndexMap<Address, u64>,
}

impl MerkleCensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a batch of entries. Idempotent per address: a
    /// repeated address overwrites its weight rather than duplicating
    /// the leaf.
    pub fn add_bulk(&mut self, entries: impl IntoIterator<Item = (Address, u64)>) {
        for (address, weight) in entries {
            self.entries.insert(address, weight);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn leaves(&self) -> Result<Vec<Fr>, CensusError> {
        self.entries
            .iter()
            .map(|(address, weight)| leaf_hash(*address, *weight))
            .collect()
    }

    /// The current Merkle root. An empty census roots at zero.
    pub fn root(&self) -> Result<Fr, CensusError> {
        let mut level = self.leaves()?;
        if level.is_empty() {
            return Ok(Fr::from(0u64));
        }
        while level.len() > 1 {
            level = fold_level(&level)?;
        }
        Ok(level[0])
    }

    /// `GenerateProof(address)`: the sibling chain needed to recompute
    /// the root from `address`'s leaf.
    pub fn generate_proof(&self, address: Address) -> Result<MerkleProof, CensusError> {
        let index = self
            .entries
            .get_index_of(&address)
            .ok_or(CensusError::UnknownAddress)?;

        let mut level = self.leaves()?;
        let mut idx = index;
        let mut siblings = Vec::new();
        let mut path_bits = Vec::new();

        while level.len() > 1 {
            let is_right = idx % 2 == 1;
            let sibling_idx = if is_right { idx - 1 } else { idx + 1 };
            if let Some(sibling) = level.get(sibling_idx) {
                siblings.push(*sibling);
                path_bits.push(is_right);
            }
            level = fold_level(&level)?;
            idx /= 2;
        }

        Ok(MerkleProof {
            siblings,
            path_bits,
        })
    }

    /// Verify a proof against this tree's current root, independent of
    /// any live tree state: takes the leaf value directly so callers
    /// (e.g. the validator, reconstructing a witness from wire bytes)
    /// don't need a `MerkleCensus` instance at all.
    pub fn verify_proof(
        root: Fr,
        address: Address,
        weight: u64,
        proof: &MerkleProof,
    ) -> Result<bool, CensusError> {
        let mut acc = leaf_hash(address, weight)?;
        for (sibling, is_right) in proof.siblings.iter().zip(&proof.path_bits) {
            acc = if *is_right {
                node_hash(*sibling, acc)?
            } else {
                node_hash(acc, *sibling)?
            };
        }
        Ok(acc == root)
    }
}

/// Promote one level of a LeanIMT up by one: pair up adjacent nodes,
/// hashing them together; an odd node out is promoted unchanged.
fn fold_level(level: &[Fr]) -> Result<Vec<Fr>, CensusError> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    let mut iter = level.chunks(2);
    for pair in &mut iter {
        next.push(match pair {
            [left, right] => node_hash(*left, *right)?,
            [single] => *single,
            _ => unreachable!(),
        });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entry_roots_at_its_own_leaf() {
        let mut census = MerkleCensus::new();
        let addr = Address::repeat_byte(0x01);
        census.add_bulk([(addr, 3u64)]);
        assert_eq!(census.root().unwrap(), leaf_hash(addr, 3).unwrap());
    }

    #[test]
    fn proof_verifies_against_root() {
        let mut census = MerkleCensus::new();
        let addrs: Vec<_> = (0u8..5).map(Address::repeat_byte).collect();
        census.add_bulk(addrs.iter().map(|a| (*a, 10u64)));

        let root = census.root().unwrap();
        for addr in &addrs {
            let proof = census.generate_proof(*addr).unwrap();
            assert!(MerkleCensus::verify_proof(root, *addr, 10, &proof).unwrap());
        }
    }

    #[test]
    fn unknown_address_is_rejected() {
        let census = MerkleCensus::new();
        assert!(matches!(
            census.generate_proof(Address::ZERO),
            Err(CensusError::UnknownAddress)
        ));
    }

    #[test]
    fn proof_fails_against_tampered_weight() {
        let mut census = MerkleCensus::new();
        let addr = Address::repeat_byte(0x02);
        census.add_bulk([(addr, 7u64)]);
        let root = census.root().unwrap();
        let proof = census.generate_proof(addr).unwrap();
        assert!(!MerkleCensus::verify_proof(root, addr, 8, &proof).unwrap());
    }

    #[test]
    fn update_overwrites_weight_idempotently() {
        let mut census = MerkleCensus::new();
        let addr = Address::repeat_byte(0x03);
        census.add_bulk([(addr, 1u64)]);
        census.add_bulk([(addr, 2u64)]);
        assert_eq!(census.len(), 1);
        assert_eq!(census.root().unwrap(), leaf_hash(addr, 2).unwrap());
    }
}
