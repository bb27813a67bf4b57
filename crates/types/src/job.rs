//! `Job`: a pending proving assignment handed to a worker.

use alloy::primitives::Address;

use crate::ids::VoteId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub vote_id: VoteId,
    pub worker: Address,
    pub issued_at_unix_nanos: i64,
    pub expires_at_unix_nanos: i64,
}

impl Job {
    pub fn new(vote_id: VoteId, worker: Address, issued_at_unix_nanos: i64, timeout_nanos: i64) -> Self {
        Self {
            vote_id,
            worker,
            issued_at_unix_nanos,
            expires_at_unix_nanos: issued_at_unix_nanos + timeout_nanos,
        }
    }

    pub fn is_expired(&self, now_unix_nanos: i64) -> bool {
        self.expires_at_unix_nanos < now_unix_nanos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;

    #[test]
    fn job_expires_after_its_deadline() {
        let job = Job::new(crate::VoteId(Fr::from(1u64)), Address::ZERO, 0, 1_000);
        assert!(!job.is_expired(999));
        assert!(job.is_expired(1_001));
    }
}
