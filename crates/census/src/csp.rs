//! CSP (Credential Service Provider) censuses: eligibility is attested by
//! a signer's key rather than a Merkle tree. The census root is
//! `Poseidon(signer_public_key)`.
//!
//! Two signature schemes are supported: Schnorr over the BabyJubJub-shaped
//! curve embedded in BN254, and BLS over BN254 standing in for a
//! BLS12-377 variant (`jf-signature` ships BLS over BN254, not BLS12-377;
//! see DESIGN.md).

use ark_bn254::Fr as BnFr;
use ark_ed_on_bn254::{EdwardsConfig, Fr as EdFr};
use ark_ff::PrimeField;
use ark_std::rand::{CryptoRng, RngCore};
use jf_signature::{
    bls_over_bn254::{BLSOverBN254CurveSignatureScheme, KeyPair as BlsKeyPair, VerKey as BlsVerKey},
    schnorr::{SchnorrSignatureScheme, SignKey as SchnorrSignKey, VerKey as SchnorrVerKey},
    SignatureScheme,
};
use zkseq_crypto::poseidon;

use crate::CensusError;

type SchnorrScheme = SchnorrSignatureScheme<EdwardsConfig>;

/// A BabyJubJub-Schnorr CSP signer.
pub struct CspBabyJubJub {
    sign_key: SchnorrSignKey<EdFr>,
    ver_key: SchnorrVerKey<EdwardsConfig>,
}

impl CspBabyJubJub {
    pub fn key_gen<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CensusError> {
        let (sign_key, ver_key) =
            SchnorrScheme::key_gen(&(), rng).map_err(|e| CensusError::Signer(e.to_string()))?;
        Ok(Self { sign_key, ver_key })
    }

    /// `root() = Poseidon(signer_public_key)`.
    pub fn root(&self) -> Result<BnFr, CensusError> {
        let bytes = jf_utils::to_bytes!(&self.ver_key).map_err(|e| CensusError::Signer(e.to_string()))?;
        let field = BnFr::from_be_bytes_mod_order(&bytes);
        poseidon::hash(&[field]).map_err(CensusError::Hash)
    }

    /// `GenerateProof(processID, address, weight)`: sign the tuple with
    /// the CSP key; the caller converts `(signature, publicKey)` to the
    /// fixed circuit shape.
    pub fn generate_proof<R: RngCore + CryptoRng>(
        &self,
        message: &[u8],
        rng: &mut R,
    ) -> Result<jf_signature::schnorr::Signature<EdwardsConfig>, CensusError> {
        SchnorrScheme::sign(&(), &self.sign_key, message, rng)
            .map_err(|e| CensusError::Signer(e.to_string()))
    }

    pub fn verify_proof(
        ver_key: &SchnorrVerKey<EdwardsConfig>,
        message: &[u8],
        signature: &jf_signature::schnorr::Signature<EdwardsConfig>,
    ) -> bool {
        SchnorrScheme::verify(&(), ver_key, message, signature).is_ok()
    }

    pub fn ver_key(&self) -> &SchnorrVerKey<EdwardsConfig> {
        &self.ver_key
    }

    /// Convert a freshly generated proof into the wire-shaped
    /// [`crate::CensusWitness`] the validator forwards to
    /// [`crate::Census::verify_proof`].
    pub fn to_witness(
        &self,
        signature: &jf_signature::schnorr::Signature<EdwardsConfig>,
    ) -> Result<crate::CensusWitness, CensusError> {
        Ok(crate::CensusWitness::Csp {
            ver_key_bytes: jf_utils::to_bytes!(&self.ver_key).map_err(|e| CensusError::Signer(e.to_string()))?,
            signature_bytes: jf_utils::to_bytes!(signature).map_err(|e| CensusError::Signer(e.to_string()))?,
        })
    }
}

/// A BLS CSP signer (BLS12-377 stand-in, see module docs).
pub struct CspBls {
    key_pair: BlsKeyPair,
}

impl CspBls {
    pub fn key_gen<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            key_pair: BlsKeyPair::generate(rng),
        }
    }

    pub fn root(&self) -> Result<BnFr, CensusError> {
        let bytes =
            jf_utils::to_bytes!(&self.key_pair.ver_key()).map_err(|e| CensusError::Signer(e.to_string()))?;
        let field = BnFr::from_be_bytes_mod_order(&bytes);
        poseidon::hash(&[field]).map_err(CensusError::Hash)
    }

    pub fn generate_proof(
        &self,
        message: &[u8],
    ) -> Result<jf_signature::bls_over_bn254::Signature, CensusError> {
        BLSOverBN254CurveSignatureScheme::sign(&(), self.key_pair.sign_key_ref(), message, &mut ark_std::rand::rngs::OsRng)
            .map_err(|e| CensusError::Signer(e.to_string()))
    }

    pub fn verify_proof(
        ver_key: &BlsVerKey,
        message: &[u8],
        signature: &jf_signature::bls_over_bn254::Signature,
    ) -> bool {
        BLSOverBN254CurveSignatureScheme::verify(&(), ver_key, message, signature).is_ok()
    }

    pub fn ver_key(&self) -> BlsVerKey {
        self.key_pair.ver_key()
    }

    /// Convert a freshly generated proof into the wire-shaped
    /// [`crate::CensusWitness`] the validator forwards to
    /// [`crate::Census::verify_proof`].
    pub fn to_witness(
        &self,
        signature: &jf_signature::bls_over_bn254::Signature,
    ) -> Result<crate::CensusWitness, CensusError> {
        let ver_key = self.key_pair.ver_key();
        Ok(crate::CensusWitness::Csp {
            ver_key_bytes: jf_utils::to_bytes!(&ver_key).map_err(|e| CensusError::Signer(e.to_string()))?,
            signature_bytes: jf_utils::to_bytes!(signature).map_err(|e| CensusError::Signer(e.to_string()))?,
        })
    }
}
