//! Circom-compatible Poseidon hashing over the BN254 scalar field, used
//! everywhere the system commits to a fixed-arity tuple of field elements:
//! vote-ID derivation, census roots, the aggregation hash.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoseidonError {
    #[error("poseidon hashing failed: {0}")]
    Failed(String),
}

/// Hash `inputs` with the circom-parameterized Poseidon instance sized to
/// `inputs.len()`. A fresh hasher is built per call: `light-poseidon`'s
/// round constants are keyed by arity, so callers hashing the same arity
/// repeatedly should prefer [`hash_with`] to avoid rebuilding them.
pub fn hash(inputs: &[Fr]) -> Result<Fr, PoseidonError> {
    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| PoseidonError::Failed(e.to_string()))?;
    hash_with(&mut hasher, inputs)
}

pub fn hash_with(hasher: &mut Poseidon<Fr>, inputs: &[Fr]) -> Result<Fr, PoseidonError> {
    hasher
        .hash(inputs)
        .map_err(|e| PoseidonError::Failed(e.to_string()))
}

/// Build a reusable hasher for a known, fixed arity.
pub fn hasher_for_arity(arity: usize) -> Result<Poseidon<Fr>, PoseidonError> {
    Poseidon::<Fr>::new_circom(arity).map_err(|e| PoseidonError::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_hash_identically() {
        let a = hash(&[Fr::from(1u64), Fr::from(2u64)]).unwrap();
        let b = hash(&[Fr::from(1u64), Fr::from(2u64)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_hash_differently() {
        let a = hash(&[Fr::from(1u64), Fr::from(2u64)]).unwrap();
        let b = hash(&[Fr::from(1u64), Fr::from(3u64)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn arity_is_part_of_the_domain() {
        let a = hash(&[Fr::from(1u64), Fr::from(0u64)]).unwrap();
        let b = hash(&[Fr::from(1u64)]).unwrap();
        assert_ne!(a, b);
    }
}
