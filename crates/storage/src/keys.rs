//! Key-space builders for the persistent layout: `process/<pid>`,
//! `vote/<pid>/<voteID>`, `pending/<pid>/<voteID>`, `census/<root>`,
//! `worker/<addr>`.

use alloy::primitives::Address;
use zkseq_types::{ProcessId, VoteId};

fn vote_id_token(vote_id: VoteId) -> String {
    format!("{}", vote_id.to_u256())
}

pub fn process_key(pid: ProcessId) -> Vec<u8> {
    format!("process/{pid}").into_bytes()
}

pub fn vote_key(pid: ProcessId, vote_id: VoteId) -> Vec<u8> {
    format!("vote/{pid}/{}", vote_id_token(vote_id)).into_bytes()
}

pub fn pending_key(pid: ProcessId, vote_id: VoteId) -> Vec<u8> {
    format!("pending/{pid}/{}", vote_id_token(vote_id)).into_bytes()
}

pub fn census_key(root: &[u8; 32]) -> Vec<u8> {
    format!("census/0x{}", hex::encode(root)).into_bytes()
}

pub fn worker_key(address: Address) -> Vec<u8> {
    format!("worker/{address}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use ark_bn254::Fr;

    #[test]
    fn keys_carry_their_prefix_and_are_stable() {
        let pid = ProcessId(B256::repeat_byte(1));
        let vid = VoteId(Fr::from(7u64));
        assert!(String::from_utf8(process_key(pid)).unwrap().starts_with("process/"));
        assert!(String::from_utf8(vote_key(pid, vid)).unwrap().starts_with("vote/"));
        assert!(String::from_utf8(pending_key(pid, vid)).unwrap().starts_with("pending/"));
        assert_eq!(vote_key(pid, vid), vote_key(pid, vid));
    }
}
