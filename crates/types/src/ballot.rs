//! Ballots: ordered ElGamal ciphertexts over a twisted Edwards curve,
//! representable in two coordinate systems (reduced twisted Edwards and
//! canonical twisted Edwards).

use ark_ed_on_bn254::EdwardsAffine;
use ark_ff::Zero;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::consts::FIELDS_PER_BALLOT;

/// Coordinate-system marker: Reduced Twisted Edwards. Used off-circuit,
/// by the voter client and at ingress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rte;

/// Coordinate-system marker: Twisted Edwards. The canonical in-circuit
/// representation; what the state engine commits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Te;

/// One ElGamal ciphertext pair, `(c1, c2) = (k*G, m*G + k*PK)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct ElGamalPair {
    pub c1: EdwardsAffine,
    pub c2: EdwardsAffine,
}

impl ElGamalPair {
    pub fn zero() -> Self {
        Self {
            c1: EdwardsAffine::zero(),
            c2: EdwardsAffine::zero(),
        }
    }
}

/// An ordered sequence of exactly [`FIELDS_PER_BALLOT`] ElGamal pairs,
/// tagged with its coordinate system at the type level so the composer,
/// the validator and the state engine can't mix them up by accident.
///
/// `CanonicalSerialize`/`CanonicalDeserialize` are implemented by hand below:
/// the coordinate marker carries no data and must not constrain `Coord`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ballot<Coord> {
    pairs: Vec<ElGamalPair>,
    _coord: std::marker::PhantomData<Coord>,
}

impl<Coord: Send + Sync> CanonicalSerialize for Ballot<Coord> {
    fn serialize_with_mode<W: ark_serialize::Write>(
        &self,
        writer: W,
        compress: ark_serialize::Compress,
    ) -> Result<(), ark_serialize::SerializationError> {
        self.pairs.serialize_with_mode(writer, compress)
    }

    fn serialized_size(&self, compress: ark_serialize::Compress) -> usize {
        self.pairs.serialized_size(compress)
    }
}

impl<Coord: Send + Sync> ark_serialize::Valid for Ballot<Coord> {
    fn check(&self) -> Result<(), ark_serialize::SerializationError> {
        self.pairs.check()
    }
}

impl<Coord: Send + Sync> CanonicalDeserialize for Ballot<Coord> {
    fn deserialize_with_mode<R: ark_serialize::Read>(
        reader: R,
        compress: ark_serialize::Compress,
        validate: ark_serialize::Validate,
    ) -> Result<Self, ark_serialize::SerializationError> {
        Ok(Self {
            pairs: Vec::<ElGamalPair>::deserialize_with_mode(reader, compress, validate)?,
            _coord: std::marker::PhantomData,
        })
    }
}

impl<Coord> Ballot<Coord> {
    /// Build a ballot from already-encrypted pairs, zero-padding to
    /// [`FIELDS_PER_BALLOT`]. Panics if more pairs than fit are supplied;
    /// that is a programmer error in the composer, never voter input.
    pub fn from_pairs(mut pairs: Vec<ElGamalPair>) -> Self {
        assert!(
            pairs.len() <= FIELDS_PER_BALLOT,
            "ballot carries more fields than FIELDS_PER_BALLOT"
        );
        pairs.resize(FIELDS_PER_BALLOT, ElGamalPair::zero());
        Self {
            pairs,
            _coord: std::marker::PhantomData,
        }
    }

    pub fn pairs(&self) -> &[ElGamalPair] {
        &self.pairs
    }
}

impl Ballot<Rte> {
    /// Convert every pair from reduced twisted Edwards into the canonical
    /// twisted Edwards form used in-circuit.
    pub fn into_te(self, convert: impl Fn(ElGamalPair) -> ElGamalPair) -> Ballot<Te> {
        Ballot {
            pairs: self.pairs.into_iter().map(convert).collect(),
            _coord: std::marker::PhantomData,
        }
    }
}
