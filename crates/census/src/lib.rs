//! Census: a voter eligibility set, either a Merkle tree or a CSP
//! signer's key.
//!
//! Dispatch is static over a tagged enum rather than dynamic over a
//! trait object: the four variants are closed and known at compile
//! time, and each carries a different witness shape on the wire.

pub mod csp;
pub mod error;
pub mod merkle;

pub use error::CensusError;

use alloy::primitives::Address;
use ark_bn254::Fr;
use ark_ed_on_bn254::EdwardsConfig;
use ark_serialize::CanonicalDeserialize;

use csp::{CspBabyJubJub, CspBls};
use merkle::{MerkleCensus, MerkleProof};

type SchnorrVerKey = jf_signature::schnorr::VerKey<EdwardsConfig>;
type SchnorrSignature = jf_signature::schnorr::Signature<EdwardsConfig>;
type BlsVerKey = jf_signature::bls_over_bn254::VerKey;
type BlsSignature = jf_signature::bls_over_bn254::Signature;

/// The message a CSP signer attests: `(address, weight)`. The census is
/// already scoped to a single process, so `processID` need not be
/// folded in separately.
fn census_message(address: Address, weight: u64) -> Vec<u8> {
    let mut message = address.as_slice().to_vec();
    message.extend_from_slice(&weight.to_le_bytes());
    message
}

/// A mode-specific inclusion witness, opaque to callers that don't need
/// to interpret it (the validator forwards it to the census it was
/// generated against).
#[derive(Clone, Debug)]
pub enum CensusWitness {
    Merkle(MerkleProof),
    Csp {
        ver_key_bytes: Vec<u8>,
        signature_bytes: Vec<u8>,
    },
}

/// `{MerkleStatic, MerkleDynamic, CSPBabyJubJub, CSPBLS12-377}`. Static
/// censuses are frozen after process setup; dynamic ones accept
/// `AddBulk` while the process is `Accepting`.
pub enum Census {
    MerkleStatic(MerkleCensus),
    MerkleDynamic(MerkleCensus),
    CspBabyJubJub {
        root: Fr,
        ver_key: SchnorrVerKey,
    },
    CspBls {
        root: Fr,
        ver_key: BlsVerKey,
    },
}

impl Census {
    pub fn from_csp_baby_jub_jub(signer: &CspBabyJubJub) -> Result<Self, CensusError> {
        Ok(Census::CspBabyJubJub {
            root: signer.root()?,
            ver_key: signer.ver_key().clone(),
        })
    }

    pub fn from_csp_bls(signer: &CspBls) -> Result<Self, CensusError> {
        Ok(Census::CspBls {
            root: signer.root()?,
            ver_key: signer.ver_key(),
        })
    }

    pub fn root(&self) -> Result<Fr, CensusError> {
        match self {
            Census::MerkleStatic(tree) | Census::MerkleDynamic(tree) => tree.root(),
            Census::CspBabyJubJub { root, .. } | Census::CspBls { root, .. } => Ok(*root),
        }
    }

    /// Only `MerkleDynamic` censuses accept bulk additions after setup;
    /// every other variant rejects growth.
    pub fn add_bulk(
        &mut self,
        entries: impl IntoIterator<Item = (Address, u64)>,
    ) -> Result<(), CensusError> {
        match self {
            Census::MerkleDynamic(tree) => {
                tree.add_bulk(entries);
                Ok(())
            }
            _ => Err(CensusError::UnsupportedOrigin),
        }
    }

    pub fn verify_proof(
        &self,
        address: Address,
        weight: u64,
        witness: &CensusWitness,
    ) -> Result<bool, CensusError> {
        match (self, witness) {
            (Census::MerkleStatic(tree) | Census::MerkleDynamic(tree), CensusWitness::Merkle(proof)) => {
                MerkleCensus::verify_proof(tree.root()?, address, weight, proof)
            }
            (
                Census::CspBabyJubJub { ver_key, .. },
                CensusWitness::Csp {
                    ver_key_bytes,
                    signature_bytes,
                },
            ) => {
                let claimed = SchnorrVerKey::deserialize_compressed(ver_key_bytes.as_slice())
                    .map_err(|e| CensusError::Signer(e.to_string()))?;
                if claimed != *ver_key {
                    return Ok(false);
                }
                let signature = SchnorrSignature::deserialize_compressed(signature_bytes.as_slice())
                    .map_err(|e| CensusError::Signer(e.to_string()))?;
                let message = census_message(address, weight);
                Ok(CspBabyJubJub::verify_proof(ver_key, &message, &signature))
            }
            (
                Census::CspBls { ver_key, .. },
                CensusWitness::Csp {
                    ver_key_bytes,
                    signature_bytes,
                },
            ) => {
                let claimed = BlsVerKey::deserialize_compressed(ver_key_bytes.as_slice())
                    .map_err(|e| CensusError::Signer(e.to_string()))?;
                if claimed != *ver_key {
                    return Ok(false);
                }
                let signature = BlsSignature::deserialize_compressed(signature_bytes.as_slice())
                    .map_err(|e| CensusError::Signer(e.to_string()))?;
                let message = census_message(address, weight);
                Ok(CspBls::verify_proof(ver_key, &message, &signature))
            }
            _ => Err(CensusError::UnsupportedOrigin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::SeedableRng;

    #[test]
    fn static_census_rejects_growth() {
        let mut census = Census::MerkleStatic(MerkleCensus::new());
        let result = census.add_bulk([(Address::ZERO, 1u64)]);
        assert!(matches!(result, Err(CensusError::UnsupportedOrigin)));
    }

    #[test]
    fn dynamic_census_accepts_growth() {
        let mut census = Census::MerkleDynamic(MerkleCensus::new());
        assert!(census.add_bulk([(Address::ZERO, 1u64)]).is_ok());
        assert_ne!(census.root().unwrap(), Fr::from(0u64));
    }

    #[test]
    fn mismatched_witness_kind_is_rejected() {
        let mut rng = ark_std::rand::rngs::StdRng::seed_from_u64(1);
        let signer = CspBabyJubJub::key_gen(&mut rng).unwrap();
        let census = Census::from_csp_baby_jub_jub(&signer).unwrap();
        let witness = CensusWitness::Merkle(merkle::MerkleProof {
            siblings: vec![],
            path_bits: vec![],
        });
        assert!(matches!(
            census.verify_proof(Address::ZERO, 1, &witness),
            Err(CensusError::UnsupportedOrigin)
        ));
    }

    #[test]
    fn csp_baby_jub_jub_accepts_a_genuine_signature() {
        let mut rng = ark_std::rand::rngs::StdRng::seed_from_u64(2);
        let signer = CspBabyJubJub::key_gen(&mut rng).unwrap();
        let census = Census::from_csp_baby_jub_jub(&signer).unwrap();
        let address = Address::repeat_byte(7);
        let weight = 5u64;
        let signature = signer.generate_proof(&census_message(address, weight), &mut rng).unwrap();
        let witness = signer.to_witness(&signature).unwrap();
        assert!(census.verify_proof(address, weight, &witness).unwrap());
    }

    #[test]
    fn csp_baby_jub_jub_rejects_a_tampered_weight() {
        let mut rng = ark_std::rand::rngs::StdRng::seed_from_u64(3);
        let signer = CspBabyJubJub::key_gen(&mut rng).unwrap();
        let census = Census::from_csp_baby_jub_jub(&signer).unwrap();
        let address = Address::repeat_byte(7);
        let signature = signer.generate_proof(&census_message(address, 5u64), &mut rng).unwrap();
        let witness = signer.to_witness(&signature).unwrap();
        assert!(!census.verify_proof(address, 9u64, &witness).unwrap());
    }

    #[test]
    fn csp_baby_jub_jub_rejects_a_foreign_signer() {
        let mut rng = ark_std::rand::rngs::StdRng::seed_from_u64(4);
        let signer = CspBabyJubJub::key_gen(&mut rng).unwrap();
        let impostor = CspBabyJubJub::key_gen(&mut rng).unwrap();
        let census = Census::from_csp_baby_jub_jub(&signer).unwrap();
        let address = Address::repeat_byte(7);
        let signature = impostor.generate_proof(&census_message(address, 5u64), &mut rng).unwrap();
        let witness = impostor.to_witness(&signature).unwrap();
        assert!(!census.verify_proof(address, 5u64, &witness).unwrap());
    }

    #[test]
    fn csp_bls_accepts_a_genuine_signature() {
        let mut rng = ark_std::rand::rngs::StdRng::seed_from_u64(5);
        let signer = CspBls::key_gen(&mut rng);
        let census = Census::from_csp_bls(&signer).unwrap();
        let address = Address::repeat_byte(11);
        let weight = 3u64;
        let signature = signer.generate_proof(&census_message(address, weight)).unwrap();
        let witness = signer.to_witness(&signature).unwrap();
        assert!(census.verify_proof(address, weight, &witness).unwrap());
    }
}
