//! `Process`: a single voting event and its lifecycle.

use alloy::primitives::Address;
use ark_ed_on_bn254::EdwardsAffine;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ballot_mode::BallotMode;
use crate::ids::ProcessId;

/// Lifecycle status of a [`Process`]. Monotonic except for the `Setup` to
/// `Ready` step, which an organizer may repeat while still configuring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Setup,
    Ready,
    Accepting,
    Ended,
    Results,
}

impl ProcessStatus {
    /// `Results` is terminal: once reached no vote is ever admitted again
    /// and the process's state root is frozen.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessStatus::Results)
    }

    pub fn accepts_votes(self) -> bool {
        matches!(self, ProcessStatus::Accepting)
    }
}

/// A voting process: its census descriptor (by root, the concrete census
/// itself lives in the census crate), tallying policy, encryption key and
/// on-chain-facing bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub organization: Address,
    pub census_root: [u8; 32],
    pub ballot_mode: BallotMode,
    pub encryption_key: EdwardsAffinePoint,
    pub state_root: [u8; 32],
    pub start_time_unix: i64,
    pub duration_secs: u64,
    pub max_voters: u64,
    pub status: ProcessStatus,
}

/// Serde-friendly wrapper around an `EdwardsAffine` point: arkworks curve
/// types carry no serde impl, so the point is stored as its canonical
/// compressed `ark-serialize` bytes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdwardsAffinePoint(pub EdwardsAffine);

impl Serialize for EdwardsAffinePoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use ark_serialize::CanonicalSerialize;
        let mut buf = Vec::new();
        self.0
            .serialize_compressed(&mut buf)
            .map_err(serde::ser::Error::custom)?;
        serde_bytes_as_hex(&buf, serializer)
    }
}

impl<'de> Deserialize<'de> for EdwardsAffinePoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use ark_serialize::CanonicalDeserialize;
        let bytes = hex_as_bytes(deserializer)?;
        let point = EdwardsAffine::deserialize_compressed(&bytes[..])
            .map_err(serde::de::Error::custom)?;
        Ok(EdwardsAffinePoint(point))
    }
}

fn serde_bytes_as_hex<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn hex_as_bytes<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

impl Process {
    pub fn is_full(&self, current_voters: u64) -> bool {
        current_voters >= self.max_voters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_is_the_only_terminal_status() {
        for status in [
            ProcessStatus::Setup,
            ProcessStatus::Ready,
            ProcessStatus::Accepting,
            ProcessStatus::Ended,
        ] {
            assert!(!status.is_terminal());
        }
        assert!(ProcessStatus::Results.is_terminal());
    }

    #[test]
    fn only_accepting_accepts_votes() {
        assert!(ProcessStatus::Accepting.accepts_votes());
        assert!(!ProcessStatus::Ready.accepts_votes());
    }
}
