//! Ballot Proof Composer: turns raw voter input into an encrypted,
//! padded ballot plus the deterministic vote-ID and circuit-input hash
//! the proof commits to.
//!
//! Pure by construction: every function here is a deterministic
//! transform of its arguments plus the caller-supplied randomness `k`.
//! Nothing reads the clock, storage, or global RNG state.

use ark_bn254::Fr as BnFr;
use ark_ed_on_bn254::{EdwardsAffine, Fr as EdFr};
use ark_ff::PrimeField;
use thiserror::Error;
use zkseq_crypto::{address_to_field, elgamal, poseidon};
use zkseq_types::ballot_mode::BallotMode;
use zkseq_types::ids::{ProcessId, VoteId};
use zkseq_types::{Ballot, ElGamalPair, Rte};

use alloy::primitives::Address;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("too many field values: {0} exceeds the ballot's field capacity")]
    TooManyFields(usize),
    #[error("encryption key is not a valid curve point")]
    InvalidEncryptionKey,
    #[error("poseidon hashing failed: {0}")]
    Hash(#[from] zkseq_crypto::PoseidonError),
}

/// The composer's output up to the point a ballot proof can be
/// requested: the encrypted ballot and its vote-ID. The circuit-input
/// hash ([`ballot_inputs_hash`]) is computed separately once the state
/// engine has re-encrypted the ballot into its canonical TE form.
pub struct ComposedBallot {
    pub ballot: Ballot<Rte>,
    pub vote_id: VoteId,
}

/// Zero-pad `fields` to the ballot's fixed width. A programmer error if
/// more fields are supplied than fit; voter input is validated upstream
/// of this call.
pub fn pad_fields(fields: &[EdFr], capacity: usize) -> Result<Vec<EdFr>, ComposeError> {
    if fields.len() > capacity {
        return Err(ComposeError::TooManyFields(fields.len()));
    }
    let mut padded = fields.to_vec();
    padded.resize(capacity, EdFr::from(0u64));
    Ok(padded)
}

/// Encrypt every padded field under the process encryption key with a
/// strictly-incrementing scalar derived from `k` (`k`, `2k`, `3k`, ...),
/// so every ciphertext pair uses independent-looking but deterministic
/// randomness while the whole ballot is reproducible from a single `k`.
///
/// Rejects an `encryption_key` that isn't a valid point on the curve:
/// encrypting under it would silently produce ciphertexts nobody can
/// decrypt.
pub fn encrypt_fields(fields: &[EdFr], encryption_key: EdwardsAffine, k: EdFr) -> Result<Vec<ElGamalPair>, ComposeError> {
    if !encryption_key.is_on_curve() {
        return Err(ComposeError::InvalidEncryptionKey);
    }
    Ok(fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let k_i = k * EdFr::from((i + 1) as u64);
            elgamal::encrypt(encryption_key, *field, k_i)
        })
        .collect())
}

/// `voteID = Poseidon(processID_mod_p, address_mod_p, k_mod_p)`.
pub fn derive_vote_id(process_id: ProcessId, address: Address, k: EdFr) -> Result<VoteId, ComposeError> {
    let k_bn = BnFr::from_le_bytes_mod_order(&{
        use ark_ff::BigInteger;
        k.into_bigint().to_bytes_le()
    });
    let hash = poseidon::hash(&[process_id.to_field(), address_to_field(address), k_bn])?;
    Ok(VoteId(hash))
}

/// Compose the ordered circuit-input tuple and hash it with Poseidon to
/// produce the ballot proof's public-input commitment. The ballot's TE
/// limbs are flattened `(c1.x, c1.y, c2.x, c2.y)` per pair, in order.
#[allow(clippy::too_many_arguments)]
pub fn ballot_inputs_hash(
    process_id: ProcessId,
    ballot_mode: &BallotMode,
    encryption_key_te: EdwardsAffine,
    address: Address,
    vote_id: VoteId,
    ballot_te: &Ballot<zkseq_types::Te>,
    weight: u64,
) -> Result<BnFr, ComposeError> {
    let mut inputs = vec![
        process_id.to_field(),
        ballot_mode.pack(),
        affine_x(encryption_key_te),
        affine_y(encryption_key_te),
        address_to_field(address),
        vote_id.0,
    ];
    for pair in ballot_te.pairs() {
        inputs.push(affine_x(pair.c1));
        inputs.push(affine_y(pair.c1));
        inputs.push(affine_x(pair.c2));
        inputs.push(affine_y(pair.c2));
    }
    inputs.push(BnFr::from(weight));

    Ok(poseidon::hash(&inputs)?)
}

fn affine_x(point: EdwardsAffine) -> BnFr {
    zkseq_crypto::fq_to_scalar(point.x)
}

fn affine_y(point: EdwardsAffine) -> BnFr {
    zkseq_crypto::fq_to_scalar(point.y)
}

/// Run the full composer pipeline: pad, encrypt, derive the vote-ID.
/// Building the ballot-inputs hash requires the batch-assigned TE
/// ballot and is done separately once the state engine has
/// re-encrypted it.
pub fn compose(
    process_id: ProcessId,
    address: Address,
    encryption_key: EdwardsAffine,
    k: EdFr,
    fields: &[EdFr],
    capacity: usize,
) -> Result<ComposedBallot, ComposeError> {
    let padded = pad_fields(fields, capacity)?;
    let pairs = encrypt_fields(&padded, encryption_key, k)?;
    let vote_id = derive_vote_id(process_id, address, k)?;
    Ok(ComposedBallot {
        ballot: Ballot::from_pairs(pairs),
        vote_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::{AffineRepr, CurveGroup};
    use ark_std::{rand::rngs::StdRng, rand::SeedableRng, UniformRand};

    fn test_key(rng: &mut StdRng) -> EdwardsAffine {
        (EdwardsAffine::generator() * EdFr::rand(rng)).into_affine()
    }

    #[test]
    fn pad_fields_zero_pads_to_capacity() {
        let padded = pad_fields(&[EdFr::from(1u64), EdFr::from(2u64)], 4).unwrap();
        assert_eq!(padded, vec![EdFr::from(1u64), EdFr::from(2u64), EdFr::from(0u64), EdFr::from(0u64)]);
    }

    #[test]
    fn pad_fields_rejects_overflow() {
        assert!(matches!(pad_fields(&[EdFr::from(1u64); 3], 2), Err(ComposeError::TooManyFields(3))));
    }

    #[test]
    fn compose_is_pure() {
        let mut rng = StdRng::seed_from_u64(1);
        let pk = test_key(&mut rng);
        let process_id = ProcessId::derive(Address::repeat_byte(9), 1, 1);
        let address = Address::repeat_byte(3);
        let k = EdFr::from(77u64);
        let fields = [EdFr::from(5u64)];

        let a = compose(process_id, address, pk, k, &fields, 8).unwrap();
        let b = compose(process_id, address, pk, k, &fields, 8).unwrap();
        assert_eq!(a.vote_id.0, b.vote_id.0);
        assert_eq!(a.ballot.pairs(), b.ballot.pairs());
    }

    #[test]
    fn compose_rejects_an_encryption_key_off_the_curve() {
        let process_id = ProcessId::derive(Address::repeat_byte(9), 1, 1);
        let address = Address::repeat_byte(3);
        let off_curve = EdwardsAffine::new_unchecked(BnFr::from(1u64), BnFr::from(1u64));

        let result = compose(process_id, address, off_curve, EdFr::from(7u64), &[EdFr::from(5u64)], 8);
        assert!(matches!(result, Err(ComposeError::InvalidEncryptionKey)));
    }

    #[test]
    fn vote_id_changes_with_k() {
        let process_id = ProcessId::derive(Address::repeat_byte(9), 1, 1);
        let address = Address::repeat_byte(3);
        let a = derive_vote_id(process_id, address, EdFr::from(1u64)).unwrap();
        let b = derive_vote_id(process_id, address, EdFr::from(2u64)).unwrap();
        assert_ne!(a.0, b.0);
    }
}
