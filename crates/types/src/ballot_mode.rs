//! `BallotMode`: the tallying policy, packed to a single scalar for
//! circuit input.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};

const NUM_FIELDS_BITS: u32 = 8;
const MIN_VALUE_BITS: u32 = 16;
const MAX_VALUE_BITS: u32 = 16;
const MIN_VALUE_SUM_BITS: u32 = 32;
const MAX_VALUE_SUM_BITS: u32 = 32;
const COST_EXPONENT_BITS: u32 = 8;

const NUM_FIELDS_SHIFT: u32 = 0;
const UNIQUE_VALUES_SHIFT: u32 = NUM_FIELDS_SHIFT + NUM_FIELDS_BITS;
const MIN_VALUE_SHIFT: u32 = UNIQUE_VALUES_SHIFT + 1;
const MAX_VALUE_SHIFT: u32 = MIN_VALUE_SHIFT + MIN_VALUE_BITS;
const MIN_VALUE_SUM_SHIFT: u32 = MAX_VALUE_SHIFT + MAX_VALUE_BITS;
const MAX_VALUE_SUM_SHIFT: u32 = MIN_VALUE_SUM_SHIFT + MIN_VALUE_SUM_BITS;
const COST_EXPONENT_SHIFT: u32 = MAX_VALUE_SUM_SHIFT + MAX_VALUE_SUM_BITS;
const COST_FROM_WEIGHT_SHIFT: u32 = COST_EXPONENT_SHIFT + COST_EXPONENT_BITS;

fn mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

/// The tallying policy for a process. Packs into a single field element so
/// it can be committed to as one circuit public input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotMode {
    pub num_fields: u8,
    pub unique_values: bool,
    pub min_value: u16,
    pub max_value: u16,
    pub min_value_sum: u32,
    pub max_value_sum: u32,
    pub cost_exponent: u8,
    pub cost_from_weight: bool,
}

impl BallotMode {
    /// Concatenate every bounded-width field into a single scalar.
    pub fn pack(&self) -> Fr {
        let mut bits: u128 = 0;
        bits |= (self.num_fields as u128 & mask(NUM_FIELDS_BITS)) << NUM_FIELDS_SHIFT;
        bits |= (self.unique_values as u128) << UNIQUE_VALUES_SHIFT;
        bits |= (self.min_value as u128 & mask(MIN_VALUE_BITS)) << MIN_VALUE_SHIFT;
        bits |= (self.max_value as u128 & mask(MAX_VALUE_BITS)) << MAX_VALUE_SHIFT;
        bits |= (self.min_value_sum as u128 & mask(MIN_VALUE_SUM_BITS)) << MIN_VALUE_SUM_SHIFT;
        bits |= (self.max_value_sum as u128 & mask(MAX_VALUE_SUM_BITS)) << MAX_VALUE_SUM_SHIFT;
        bits |= (self.cost_exponent as u128 & mask(COST_EXPONENT_BITS)) << COST_EXPONENT_SHIFT;
        bits |= (self.cost_from_weight as u128) << COST_FROM_WEIGHT_SHIFT;
        Fr::from(bits)
    }

    /// Invert [`Self::pack`]. The packing is a fixed-width concatenation so
    /// this always round-trips for values produced by `pack`.
    pub fn unpack(packed: Fr) -> Self {
        let bits: u128 = packed.into_bigint_u128();
        Self {
            num_fields: ((bits >> NUM_FIELDS_SHIFT) & mask(NUM_FIELDS_BITS)) as u8,
            unique_values: ((bits >> UNIQUE_VALUES_SHIFT) & 1) != 0,
            min_value: ((bits >> MIN_VALUE_SHIFT) & mask(MIN_VALUE_BITS)) as u16,
            max_value: ((bits >> MAX_VALUE_SHIFT) & mask(MAX_VALUE_BITS)) as u16,
            min_value_sum: ((bits >> MIN_VALUE_SUM_SHIFT) & mask(MIN_VALUE_SUM_BITS)) as u32,
            max_value_sum: ((bits >> MAX_VALUE_SUM_SHIFT) & mask(MAX_VALUE_SUM_BITS)) as u32,
            cost_exponent: ((bits >> COST_EXPONENT_SHIFT) & mask(COST_EXPONENT_BITS)) as u8,
            cost_from_weight: ((bits >> COST_FROM_WEIGHT_SHIFT) & 1) != 0,
        }
    }
}

/// Narrow helper: every `BallotMode` field fits in 114 bits, well inside a
/// `u128`, so round-tripping through the field's little-endian byte
/// representation never truncates.
trait IntoU128 {
    fn into_bigint_u128(self) -> u128;
}

impl IntoU128 for Fr {
    fn into_bigint_u128(self) -> u128 {
        let bytes = self.into_bigint().to_bytes_le();
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes[..16]);
        u128::from_le_bytes(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let mode = BallotMode {
            num_fields: 5,
            unique_values: true,
            min_value: 0,
            max_value: 10_000,
            min_value_sum: 0,
            max_value_sum: 50_000,
            cost_exponent: 2,
            cost_from_weight: false,
        };
        let packed = mode.pack();
        assert_eq!(BallotMode::unpack(packed), mode);
    }

    #[test]
    fn pack_unpack_round_trips_at_bounds() {
        let mode = BallotMode {
            num_fields: u8::MAX,
            unique_values: false,
            min_value: u16::MAX,
            max_value: u16::MAX,
            min_value_sum: u32::MAX,
            max_value_sum: u32::MAX,
            cost_exponent: u8::MAX,
            cost_from_weight: true,
        };
        assert_eq!(BallotMode::unpack(mode.pack()), mode);
    }
}
