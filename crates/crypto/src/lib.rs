//! Field/curve arithmetic primitives shared by the ballot composer, the
//! census generator and the state engine: Poseidon hashing and ElGamal
//! encryption over the twisted Edwards curve embedded in BN254.

pub mod elgamal;
pub mod poseidon;

pub use poseidon::PoseidonError;

use alloy::primitives::Address;
use ark_bn254::Fr;
use ark_ff::PrimeField;

/// Reduce an address into the BN254 scalar field, the representation
/// every Poseidon-hashed tuple that mentions an address actually uses.
pub fn address_to_field(address: Address) -> Fr {
    Fr::from_be_bytes_mod_order(address.as_slice())
}

/// Cross from the embedded curve's base field into BN254's scalar field
/// (what every Poseidon hash here operates over). Every ballot limb that
/// enters a circuit-input hash goes through this reduction.
pub fn fq_to_scalar(value: ark_ed_on_bn254::Fq) -> Fr {
    use ark_ff::BigInteger;
    Fr::from_le_bytes_mod_order(&value.into_bigint().to_bytes_le())
}
