//! Exponential ElGamal over the twisted Edwards curve embedded in BN254
//! (`ark_ed_on_bn254`, a BabyJubJub-shaped curve), plus the rerandomization
//! used to turn a voter-submitted ciphertext into the canonical in-circuit
//! one, re-encrypting ballots with batch-local randomness.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::EdwardsAffine;
use ark_ed_on_bn254::Fr;
use ark_std::{rand::RngCore, UniformRand};
use zkseq_types::ElGamalPair;

/// `c1 = k*G`, `c2 = message*G + k*pk`. The message is committed to in
/// the exponent (exponential ElGamal): recovering it at tally time is a
/// bounded discrete-log search over the homomorphically-summed result,
/// out of scope here.
pub fn encrypt(pk: EdwardsAffine, message: Fr, k: Fr) -> ElGamalPair {
    let g = EdwardsAffine::generator();
    let c1 = (g * k).into_affine();
    let c2 = (g * message + pk * k).into_affine();
    ElGamalPair { c1, c2 }
}

/// Rerandomize a ciphertext with fresh randomness `k`, without touching
/// the plaintext it encrypts: `(c1 + k*G, c2 + k*pk)`.
pub fn rerandomize(pair: ElGamalPair, pk: EdwardsAffine, k: Fr) -> ElGamalPair {
    let g = EdwardsAffine::generator();
    let c1 = (pair.c1.into_group() + g * k).into_affine();
    let c2 = (pair.c2.into_group() + pk * k).into_affine();
    ElGamalPair { c1, c2 }
}

/// Homomorphically add two ciphertexts under the same key: the additive
/// structure the State Engine's results accumulator relies on.
pub fn add(a: ElGamalPair, b: ElGamalPair) -> ElGamalPair {
    ElGamalPair {
        c1: (a.c1.into_group() + b.c1).into_affine(),
        c2: (a.c2.into_group() + b.c2).into_affine(),
    }
}

/// Homomorphically subtract `b` from `a` (used when a batch overwrites an
/// earlier vote from the same address: subtract the old ballot, add the
/// new one).
pub fn sub(a: ElGamalPair, b: ElGamalPair) -> ElGamalPair {
    ElGamalPair {
        c1: (a.c1.into_group() - b.c1).into_affine(),
        c2: (a.c2.into_group() - b.c2).into_affine(),
    }
}

/// Derive the next randomness in a batch's re-encryption chain.
/// Re-encryption within a batch is strictly sequential: each ballot's `k`
/// is derived from the previous one, never drawn independently, so that
/// the whole chain is reproducible from a single `k_batch` seed.
pub fn next_chained_k(previous: Fr) -> Fr {
    crate::poseidon::hash(&[previous]).expect("fixed unary poseidon never fails")
}

/// Sample a fresh, uniformly random scalar. Callers in non-test code must
/// use an OS-backed RNG (`rand::rngs::OsRng`), never a seeded one.
pub fn random_scalar<R: RngCore + ?Sized>(rng: &mut R) -> Fr {
    Fr::rand(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::rngs::StdRng;
    use ark_std::rand::SeedableRng;

    fn test_pk(rng: &mut StdRng) -> (Fr, EdwardsAffine) {
        let sk = Fr::rand(rng);
        let pk = (EdwardsAffine::generator() * sk).into_affine();
        (sk, pk)
    }

    #[test]
    fn rerandomize_preserves_plaintext_under_decryption() {
        let mut rng = StdRng::seed_from_u64(42);
        let (sk, pk) = test_pk(&mut rng);
        let message = Fr::from(7u64);
        let k = Fr::rand(&mut rng);
        let ct = encrypt(pk, message, k);

        let k2 = Fr::rand(&mut rng);
        let ct2 = rerandomize(ct, pk, k2);

        let decrypt = |pair: ElGamalPair| -> EdwardsAffine {
            (pair.c2.into_group() - pair.c1 * sk).into_affine()
        };
        assert_eq!(decrypt(ct), decrypt(ct2));
    }

    #[test]
    fn add_then_sub_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let (_, pk) = test_pk(&mut rng);
        let a = encrypt(pk, Fr::from(3u64), Fr::rand(&mut rng));
        let b = encrypt(pk, Fr::from(5u64), Fr::rand(&mut rng));
        let summed = add(a, b);
        let back = sub(summed, b);
        assert_eq!(back, a);
    }

    #[test]
    fn chained_k_is_deterministic_and_varies() {
        let k0 = Fr::from(1u64);
        let k1 = next_chained_k(k0);
        let k1_again = next_chained_k(k0);
        assert_eq!(k1, k1_again);
        assert_ne!(k0, k1);
    }
}
