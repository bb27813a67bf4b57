//! The prover interface the Ballot Proof Composer, the Aggregation
//! Driver and the Settlement layer all submit work to.
//!
//! The actual recursive SNARK circuits (ballot validity, batch
//! aggregation) are out of scope here: no bit-reversal permutation or
//! blob/KZG evaluation is implemented, and blob commitment limbs are
//! carried opaquely. What's modeled is the shape every caller needs: an
//! async `setup/prove/verify` capability, with a deterministic mock
//! implementation standing in for the real
//! circuits so the rest of the pipeline can be built and tested against
//! it.

use ark_bn254::Fr;
use async_trait::async_trait;
use thiserror::Error;
use zkseq_crypto::poseidon;

#[derive(Debug, Error)]
pub enum ProverError {
    #[error("prover setup failed: {0}")]
    SetupFailed(String),
    #[error("proving failed: {0}")]
    ProveFailed(String),
    #[error("proof failed verification")]
    VerificationFailed,
}

/// A proof, opaque outside this crate's mock implementation. A real
/// prover would hand back SNARK proof bytes here; the mock hands back a
/// Poseidon commitment of its inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof(pub Fr);

/// The public inputs a ballot proof or an aggregation proof commits to,
/// as an ordered field-element tuple. Shape is caller-defined; the
/// prover only ever sees it as a flat slice.
pub type PublicInputs = Vec<Fr>;

#[async_trait]
pub trait Prover: Send + Sync {
    /// One-time (or per-circuit-size) setup. Real SNARKs load a
    /// structured reference string here; the mock is a no-op.
    async fn setup(&self) -> Result<(), ProverError>;

    async fn prove(&self, public_inputs: &PublicInputs) -> Result<Proof, ProverError>;

    async fn verify(&self, public_inputs: &PublicInputs, proof: &Proof) -> Result<bool, ProverError>;
}

/// A deterministic stand-in prover: "proving" is hashing the public
/// inputs, "verifying" is recomputing that hash and comparing. It proves
/// nothing cryptographically, but it is wired through exactly the same
/// interface a real prover would be, so swapping it out later touches
/// only this module.
#[derive(Default)]
pub struct MockProver;

#[async_trait]
impl Prover for MockProver {
    async fn setup(&self) -> Result<(), ProverError> {
        Ok(())
    }

    async fn prove(&self, public_inputs: &PublicInputs) -> Result<Proof, ProverError> {
        if public_inputs.is_empty() {
            return Err(ProverError::ProveFailed("no public inputs".into()));
        }
        let commitment = poseidon::hash(public_inputs)
            .map_err(|e| ProverError::ProveFailed(e.to_string()))?;
        tracing::debug!(?commitment, "mock prover produced a proof");
        Ok(Proof(commitment))
    }

    async fn verify(&self, public_inputs: &PublicInputs, proof: &Proof) -> Result<bool, ProverError> {
        let expected = poseidon::hash(public_inputs)
            .map_err(|_| ProverError::VerificationFailed)?;
        Ok(expected == proof.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_prover_round_trips() {
        let prover = MockProver;
        let inputs = vec![Fr::from(1u64), Fr::from(2u64)];
        let proof = prover.prove(&inputs).await.unwrap();
        assert!(prover.verify(&inputs, &proof).await.unwrap());
    }

    #[tokio::test]
    async fn mock_prover_rejects_tampered_inputs() {
        let prover = MockProver;
        let inputs = vec![Fr::from(1u64), Fr::from(2u64)];
        let proof = prover.prove(&inputs).await.unwrap();
        let tampered = vec![Fr::from(1u64), Fr::from(3u64)];
        assert!(!prover.verify(&tampered, &proof).await.unwrap());
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected() {
        let prover = MockProver;
        assert!(prover.prove(&vec![]).await.is_err());
    }
}
