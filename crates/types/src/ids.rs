//! Identifiers: `ProcessId` and `VoteId`.

use std::fmt;

use alloy::primitives::{keccak256, Address, B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};

/// A voting process identifier: a deterministic function of the organizing
/// address, the chain ID it was created on, and a per-organization nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub B256);

impl ProcessId {
    /// Deterministically derive a `ProcessId`. Pure: identical inputs
    /// always yield the identical id.
    pub fn derive(organization: Address, chain_id: u64, nonce: u64) -> Self {
        let mut buf = Vec::with_capacity(20 + 8 + 8);
        buf.extend_from_slice(organization.as_slice());
        buf.extend_from_slice(&chain_id.to_be_bytes());
        buf.extend_from_slice(&nonce.to_be_bytes());
        Self(keccak256(buf))
    }

    /// Reduce the id modulo the ballot-proof scalar field, as consumed by
    /// the Poseidon-based circuit input hash.
    pub fn to_field(self) -> Fr {
        Fr::from_le_bytes_mod_order(self.0.as_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_bytes32(self) -> [u8; 32] {
        self.0 .0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `voteID = Poseidon(processID, address, k)`, signed by the voter.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VoteId(pub Fr);

impl VoteId {
    pub fn to_u256(self) -> U256 {
        let bytes = self.0.into_bigint().to_bytes_be();
        U256::from_be_slice(&bytes)
    }
}

// `Fr` has no serde impl (arkworks fields serialize canonically via
// `ark-serialize`, not serde); bridge through the big-endian hex encoding
// used on the wire everywhere else a scalar crosses the API boundary.
impl Serialize for VoteId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        format!("0x{:x}", self.to_u256()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VoteId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let u = U256::from_str_radix(s.trim_start_matches("0x"), 16)
            .map_err(serde::de::Error::custom)?;
        Ok(VoteId(Fr::from_be_bytes_mod_order(&u.to_be_bytes::<32>())))
    }
}

impl fmt::Debug for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoteId({})", self.to_u256())
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u256())
    }
}

impl std::hash::Hash for VoteId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.into_bigint().to_bytes_be().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_is_pure() {
        let org = Address::repeat_byte(0x11);
        let a = ProcessId::derive(org, 1, 7);
        let b = ProcessId::derive(org, 1, 7);
        assert_eq!(a, b);

        let c = ProcessId::derive(org, 1, 8);
        assert_ne!(a, c);
    }
}
