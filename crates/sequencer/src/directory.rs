//! Wires the capability traits `zkseq-validator` and `zkseq-settlement`
//! are generic over (`ProcessDirectory`, `PendingIndex`, `StateReconciler`,
//! `VoteStatusSink`) against the concrete per-process state this crate
//! owns: one [`StateEngine`], one [`Census`] and one [`Process`] record
//! per `ProcessId`, plus the pending-vote index the validator's
//! uniqueness check reads.
//!
//! This is an acyclic ownership DAG: the sequencer root (`Sequencer` in
//! `lib.rs`) owns a [`ProcessRegistry`] and a [`PendingVotes`], and passes
//! borrowed clones of both down into the validator and the settlement
//! service. Neither capability owns its caller.

use std::sync::Arc;

use alloy::primitives::Address;
use ark_bn254::Fr;
use dashmap::DashMap;
use zkseq_census::Census;
use zkseq_engine::StateEngine;
use zkseq_settlement::{StateReconciler, VoteStatusSink};
use zkseq_storage::{keys, Storage, StorageError};
use zkseq_types::process::{Process, ProcessStatus};
use zkseq_types::vote::VoteStatus;
use zkseq_types::{ProcessId, VoteId};
use zkseq_validator::{PendingIndex, ProcessDirectory};

/// Everything the sequencer keeps in memory for one voting process,
/// beyond the storage-backed [`Process`] record itself.
#[derive(Clone)]
pub struct ProcessHandle {
    pub process: Process,
    pub census: Arc<Census>,
    pub engine: Arc<StateEngine>,
}

/// The in-memory directory of every process this sequencer instance
/// serves. A real deployment hydrates this from `zkseq-storage` at
/// startup (the `process/<pid>` key space); this struct is storage-blind,
/// the way the validator it serves is prover- and storage-blind.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    processes: Arc<DashMap<ProcessId, Arc<ProcessHandle>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: ProcessHandle) {
        self.processes.insert(handle.process.id, Arc::new(handle));
    }

    pub fn get(&self, process_id: ProcessId) -> Option<Arc<ProcessHandle>> {
        self.processes.get(&process_id).map(|entry| entry.clone())
    }

    /// Flip a process to `Ended`/`Results` once its settlement has
    /// landed and voting has closed; a no-op if the process is already
    /// in (or past) that status.
    pub fn set_status(&self, process_id: ProcessId, status: ProcessStatus) {
        if let Some(mut entry) = self.processes.get_mut(&process_id) {
            let handle = Arc::make_mut(&mut entry);
            handle.process.status = status;
        }
    }

    /// `UpdateMaxVoters`: raise (or lower) the cap on an existing,
    /// not-yet-`Results` process.
    pub fn update_max_voters(&self, process_id: ProcessId, max_voters: u64) {
        if let Some(mut entry) = self.processes.get_mut(&process_id) {
            let handle = Arc::make_mut(&mut entry);
            handle.process.max_voters = max_voters;
        }
    }
}

impl ProcessDirectory for ProcessRegistry {
    fn status(&self, process_id: ProcessId) -> Option<ProcessStatus> {
        self.get(process_id).map(|h| h.process.status)
    }

    fn voters_count(&self, process_id: ProcessId) -> Option<u64> {
        self.get(process_id).map(|h| h.engine.voters_count())
    }

    fn max_voters(&self, process_id: ProcessId) -> Option<u64> {
        self.get(process_id).map(|h| h.process.max_voters)
    }

    fn census(&self, process_id: ProcessId) -> Option<Arc<Census>> {
        self.get(process_id).map(|h| h.census.clone())
    }
}

/// The pending-vote index the validator's duplicate check and the
/// `/processes/{id}/votes/{voteID}` status endpoint both read.
#[derive(Clone, Default)]
pub struct PendingVotes {
    by_address: Arc<DashMap<(ProcessId, Address), (VoteId, Fr)>>,
    status: Arc<DashMap<(ProcessId, VoteId), VoteStatus>>,
    storage: Option<Arc<dyn Storage>>,
}

impl PendingVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`Self::new`], but every admission and status transition is
    /// written through to `storage` under the `pending/<pid>/<voteID>`
    /// key space, and [`Self::hydrate`] can restore both indices from it.
    pub fn new_with_storage(storage: Arc<dyn Storage>) -> Self {
        Self {
            by_address: Arc::new(DashMap::new()),
            status: Arc::new(DashMap::new()),
            storage: Some(storage),
        }
    }

    /// Restore the address index and the status table from every record
    /// persisted under `pending/`. A no-op if no storage is wired.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        for (_, value) in storage.scan_prefix(b"pending/").await? {
            match zkseq_storage::codec::decode_pending(&value) {
                Ok((process_id, vote_id, address, inputs_hash, status)) => {
                    if status == VoteStatus::Pending {
                        self.by_address.insert((process_id, address), (vote_id, inputs_hash));
                    }
                    self.status.insert((process_id, vote_id), status);
                },
                Err(error) => tracing::warn!(%error, "failed to decode persisted pending-vote record"),
            }
        }
        Ok(())
    }

    /// Fire-and-forget write-through of one vote's pending/status record.
    fn persist(&self, process_id: ProcessId, vote_id: VoteId, address: Address, inputs_hash: Fr, status: VoteStatus) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        tokio::spawn(async move {
            let key = keys::pending_key(process_id, vote_id);
            match zkseq_storage::codec::encode_pending(process_id, vote_id, address, inputs_hash, status) {
                Ok(bytes) => {
                    if let Err(error) = storage.put(&key, &bytes).await {
                        tracing::warn!(%error, %vote_id, "failed to persist pending-vote record");
                    }
                },
                Err(error) => tracing::warn!(%error, %vote_id, "failed to encode pending-vote record"),
            }
        });
    }

    /// Record a freshly-admitted vote as pending, keyed by its address
    /// (for the uniqueness check) and its vote-ID (for status lookups).
    pub fn admit(&self, process_id: ProcessId, address: Address, vote_id: VoteId, inputs_hash: Fr) {
        self.by_address.insert((process_id, address), (vote_id, inputs_hash));
        self.status.insert((process_id, vote_id), VoteStatus::Pending);
        self.persist(process_id, vote_id, address, inputs_hash, VoteStatus::Pending);
    }

    pub fn set_status(&self, process_id: ProcessId, vote_id: VoteId, status: VoteStatus) {
        self.status.insert((process_id, vote_id), status);
        // Only persisted if this vote still owns its address's pending
        // entry; a vote that's already been superseded or cleared has no
        // address to key the write-through record on.
        if let Some((address, inputs_hash)) = self
            .by_address
            .iter()
            .find(|entry| entry.key().0 == process_id && entry.value().0 == vote_id)
            .map(|entry| (entry.key().1, entry.value().1))
        {
            self.persist(process_id, vote_id, address, inputs_hash, status);
        }
    }

    pub fn status_of(&self, process_id: ProcessId, vote_id: VoteId) -> VoteStatus {
        self.status
            .get(&(process_id, vote_id))
            .map(|s| *s)
            .unwrap_or(VoteStatus::Unknown)
    }

    /// Clear the address-keyed pending entry once a vote's batch is
    /// either finalized or permanently rejected, so a later resubmission
    /// from the same address is treated as a fresh vote rather than a
    /// duplicate.
    pub fn clear_pending(&self, process_id: ProcessId, address: Address) {
        self.by_address.remove(&(process_id, address));
    }
}

impl PendingIndex for PendingVotes {
    fn existing_for_address(&self, process_id: ProcessId, address: Address) -> Option<(VoteId, Fr)> {
        self.by_address.get(&(process_id, address)).map(|entry| *entry)
    }

    fn admit(&self, process_id: ProcessId, address: Address, vote_id: VoteId, inputs_hash: Fr) {
        PendingVotes::admit(self, process_id, address, vote_id, inputs_hash);
    }

    fn mark_error(&self, process_id: ProcessId, vote_id: VoteId) {
        self.set_status(process_id, vote_id, VoteStatus::Error);
    }
}

/// Compares the engine's cached root against what `Settlement` observes
/// on-chain and logs on divergence; this sequencer treats the engine's
/// tree as the source of truth between settlements, so reconciliation
/// here is an alerting signal rather than a mutation.
pub struct RootReconciler {
    pub process_id: ProcessId,
    pub engine: Arc<StateEngine>,
}

impl StateReconciler for RootReconciler {
    fn reconcile(&self, on_chain_root: Fr) {
        match self.engine.root() {
            Ok(cached) if cached == on_chain_root => {
                tracing::debug!(process_id = %self.process_id, "state root reconciled with chain");
            },
            Ok(cached) => {
                tracing::warn!(
                    process_id = %self.process_id,
                    %cached,
                    %on_chain_root,
                    "cached state root diverges from on-chain root"
                );
            },
            Err(error) => {
                tracing::warn!(process_id = %self.process_id, %error, "failed to read cached state root during reconciliation");
            },
        }
    }
}

/// Marks vote IDs `settled` once their batch's transaction is mined.
pub struct SettlementSink {
    pub process_id: ProcessId,
    pub pending: PendingVotes,
}

impl VoteStatusSink for SettlementSink {
    fn mark_settled(&self, vote_ids: &[VoteId]) {
        for vote_id in vote_ids {
            self.pending.set_status(self.process_id, *vote_id, VoteStatus::Settled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn pid() -> ProcessId {
        ProcessId(B256::repeat_byte(3))
    }

    #[tokio::test]
    async fn admitted_votes_are_written_through_and_survive_a_fresh_index() {
        let storage: Arc<dyn Storage> = Arc::new(zkseq_storage::MemoryStorage::new());
        let process_id = pid();
        let address = Address::repeat_byte(4);
        let vote_id = VoteId(Fr::from(5u64));
        let inputs_hash = Fr::from(6u64);

        let pending = PendingVotes::new_with_storage(storage.clone());
        PendingIndex::admit(&pending, process_id, address, vote_id, inputs_hash);

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let restored = PendingVotes::new_with_storage(storage);
        restored.hydrate().await.unwrap();
        assert_eq!(
            restored.existing_for_address(process_id, address),
            Some((vote_id, inputs_hash))
        );
        assert_eq!(restored.status_of(process_id, vote_id), VoteStatus::Pending);
    }

    #[tokio::test]
    async fn a_vote_marked_error_is_excluded_from_the_restored_address_index() {
        let storage: Arc<dyn Storage> = Arc::new(zkseq_storage::MemoryStorage::new());
        let process_id = pid();
        let address = Address::repeat_byte(7);
        let vote_id = VoteId(Fr::from(8u64));
        let inputs_hash = Fr::from(9u64);

        let pending = PendingVotes::new_with_storage(storage.clone());
        PendingIndex::admit(&pending, process_id, address, vote_id, inputs_hash);
        PendingIndex::mark_error(&pending, process_id, vote_id);

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let restored = PendingVotes::new_with_storage(storage);
        restored.hydrate().await.unwrap();
        assert_eq!(restored.existing_for_address(process_id, address), None);
        assert_eq!(restored.status_of(process_id, vote_id), VoteStatus::Error);
    }
}
