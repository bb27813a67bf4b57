//! Worker Manager: a concurrent registry of prover operators,
//! their failure counters and their ban state.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use zkseq_storage::{keys, Storage, StorageError};
use zkseq_types::worker::{BanRules, Worker, WorkerSnapshot};

fn now_unix_nanos() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
}

/// Tracks every registered worker in a single concurrent map. Cloning is
/// cheap (it's an `Arc` over the map plus a handle to the ban ticker);
/// every clone observes the same workers.
#[derive(Clone)]
pub struct WorkerManager {
    workers: Arc<DashMap<Address, Arc<Worker>>>,
    rules: BanRules,
    storage: Option<Arc<dyn Storage>>,
}

impl WorkerManager {
    pub fn new(rules: BanRules) -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            rules,
            storage: None,
        }
    }

    /// Like [`Self::new`], but every mutation (`add_worker`,
    /// `worker_result`, ban/reset transitions) is written through to
    /// `storage` under the `worker/<addr>` key space, and [`Self::hydrate`]
    /// can restore the registry from it at startup.
    pub fn new_with_storage(rules: BanRules, storage: Arc<dyn Storage>) -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            rules,
            storage: Some(storage),
        }
    }

    /// Restore every worker record persisted under `worker/` into the
    /// in-memory registry. A no-op if this manager has no storage wired.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        for (_, value) in storage.scan_prefix(b"worker/").await? {
            match zkseq_storage::codec::decode_worker(&value) {
                Ok(worker) => {
                    self.workers.insert(worker.address, Arc::new(worker));
                },
                Err(error) => tracing::warn!(%error, "failed to decode persisted worker record"),
            }
        }
        Ok(())
    }

    /// Fire-and-forget write-through of a worker's current state. Logged
    /// on failure rather than propagated: storage is a durability aid for
    /// restarts, not a correctness dependency of the in-memory registry
    /// that serves every read in this process's lifetime.
    fn persist(&self, worker: Arc<Worker>) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        tokio::spawn(async move {
            let key = keys::worker_key(worker.address);
            match zkseq_storage::codec::encode_worker(&worker) {
                Ok(bytes) => {
                    if let Err(error) = storage.put(&key, &bytes).await {
                        tracing::warn!(%error, address = %worker.address, "failed to persist worker record");
                    }
                },
                Err(error) => tracing::warn!(%error, address = %worker.address, "failed to encode worker record"),
            }
        });
    }

    /// `AddWorker`: idempotent on `addr`; the name is only set if the
    /// worker didn't already exist or its name was empty.
    pub fn add_worker(&self, address: Address, name: &str) {
        let worker = self
            .workers
            .entry(address)
            .and_modify(|w| w.set_name_if_empty(name))
            .or_insert_with(|| Arc::new(Worker::new(address, name.to_string())))
            .clone();
        self.persist(worker);
    }

    pub fn get_worker(&self, address: Address) -> Option<Arc<Worker>> {
        self.workers.get(&address).map(|w| w.clone())
    }

    fn snapshot(worker: &Worker) -> WorkerSnapshot {
        WorkerSnapshot {
            consecutive_failures: worker.consecutive_failures.load(Ordering::SeqCst),
            banned_until_unix_nanos: worker.banned_until_unix_nanos.load(Ordering::SeqCst),
        }
    }

    /// `WorkerResult`: atomically clear or bump the failure streak and
    /// the matching persistent counter.
    pub fn worker_result(&self, address: Address, success: bool) {
        let Some(worker) = self.workers.get(&address).map(|w| w.clone()) else {
            return;
        };
        if success {
            worker.consecutive_failures.store(0, Ordering::SeqCst);
            worker.total_successes.fetch_add(1, Ordering::SeqCst);
        } else {
            worker.consecutive_failures.fetch_add(1, Ordering::SeqCst);
            worker.total_failures.fetch_add(1, Ordering::SeqCst);
        }
        self.persist(worker);
    }

    pub fn is_banned(&self, address: Address) -> bool {
        self.workers
            .get(&address)
            .map(|w| Self::snapshot(&w).is_banned(self.rules, now_unix_nanos()))
            .unwrap_or(false)
    }

    /// `BannedWorkers`: an O(N) scan, as specified.
    pub fn banned_workers(&self) -> Vec<Address> {
        let now = now_unix_nanos();
        self.workers
            .iter()
            .filter(|entry| Self::snapshot(entry.value()).is_banned(self.rules, now))
            .map(|entry| *entry.key())
            .collect()
    }

    /// `SetBanDuration`: start the ban clock for a worker that has just
    /// tripped the failure threshold.
    pub fn set_ban_duration(&self, address: Address) {
        if let Some(worker) = self.workers.get(&address).map(|w| w.clone()) {
            let until = now_unix_nanos() + (self.rules.ban_timeout_secs as i64) * 1_000_000_000;
            worker.banned_until_unix_nanos.store(until, Ordering::SeqCst);
            self.persist(worker);
        }
    }

    /// `ResetWorker`: clears both counters and the ban time, as if the
    /// worker had just registered.
    pub fn reset_worker(&self, address: Address) {
        if let Some(worker) = self.workers.get(&address).map(|w| w.clone()) {
            worker.consecutive_failures.store(0, Ordering::SeqCst);
            worker.banned_until_unix_nanos.store(0, Ordering::SeqCst);
            self.persist(worker);
        }
    }

    /// One tick of the background ban-maintenance scan: workers newly
    /// over the failure threshold get their ban clock started; workers
    /// whose ban has expired get reset.
    fn tick(&self) {
        let now = now_unix_nanos();
        for entry in self.workers.iter() {
            let worker = entry.value();
            let failures = worker.consecutive_failures.load(Ordering::SeqCst);
            let banned_until = worker.banned_until_unix_nanos.load(Ordering::SeqCst);

            if failures > self.rules.failures_to_get_banned && banned_until == 0 {
                self.set_ban_duration(*entry.key());
            } else if banned_until != 0 && banned_until < now {
                self.reset_worker(*entry.key());
            }
        }
    }

    pub fn clear(&self) {
        self.workers.clear();
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// A running Worker Manager ticker task. Dropping the handle (or calling
/// [`Self::stop`]) cancels the child context derived at `start` and
/// clears every worker, so `get_worker` reliably returns nothing
/// afterward.
pub struct WorkerManagerHandle {
    manager: WorkerManager,
    cancel: CancellationToken,
    _task: AbortOnDropHandle<()>,
}

impl WorkerManagerHandle {
    pub fn manager(&self) -> &WorkerManager {
        &self.manager
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        self.manager.clear();
    }
}

/// `Start(ctx)`: derives a child cancellation context and spawns the
/// ban-maintenance ticker.
pub fn start(manager: WorkerManager, parent: &CancellationToken, tick_interval: Duration) -> WorkerManagerHandle {
    let cancel = parent.child_token();
    let task_manager = manager.clone();
    let task_cancel = cancel.clone();
    let task = AbortOnDropHandle::new(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => return,
                _ = ticker.tick() => task_manager.tick(),
            }
        }
    }));
    WorkerManagerHandle {
        manager,
        cancel,
        _task: task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> BanRules {
        BanRules {
            failures_to_get_banned: 2,
            ban_timeout_secs: 60,
        }
    }

    #[test]
    fn add_worker_is_idempotent_on_name() {
        let manager = WorkerManager::new(rules());
        let addr = Address::repeat_byte(1);
        manager.add_worker(addr, "alice");
        manager.add_worker(addr, "bob");
        assert_eq!(manager.get_worker(addr).unwrap().name(), "alice");
    }

    #[test]
    fn worker_result_is_monotone_across_a_sequence() {
        let manager = WorkerManager::new(rules());
        let addr = Address::repeat_byte(2);
        manager.add_worker(addr, "w");

        manager.worker_result(addr, false);
        manager.worker_result(addr, false);
        manager.worker_result(addr, true);
        manager.worker_result(addr, false);

        let worker = manager.get_worker(addr).unwrap();
        assert_eq!(worker.consecutive_failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn banned_workers_scan_finds_over_threshold() {
        let manager = WorkerManager::new(rules());
        let addr = Address::repeat_byte(3);
        manager.add_worker(addr, "w");
        manager.worker_result(addr, false);
        manager.worker_result(addr, false);
        manager.worker_result(addr, false);

        manager.tick();
        assert!(manager.is_banned(addr));
        assert_eq!(manager.banned_workers(), vec![addr]);
    }

    #[test]
    fn reset_clears_both_counters() {
        let manager = WorkerManager::new(rules());
        let addr = Address::repeat_byte(4);
        manager.add_worker(addr, "w");
        manager.worker_result(addr, false);
        manager.worker_result(addr, false);
        manager.worker_result(addr, false);
        manager.tick();
        assert!(manager.is_banned(addr));

        manager.reset_worker(addr);
        assert!(!manager.is_banned(addr));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_all_workers() {
        let manager = WorkerManager::new(rules());
        manager.add_worker(Address::repeat_byte(5), "w");
        let cancel = CancellationToken::new();
        let handle = start(manager.clone(), &cancel, Duration::from_millis(10));

        handle.stop();
        assert!(manager.get_worker(Address::repeat_byte(5)).is_none());
    }

    #[tokio::test]
    async fn mutations_are_written_through_and_survive_a_fresh_manager() {
        let storage: Arc<dyn Storage> = Arc::new(zkseq_storage::MemoryStorage::new());
        let addr = Address::repeat_byte(7);

        let manager = WorkerManager::new_with_storage(rules(), storage.clone());
        manager.add_worker(addr, "alice");
        manager.worker_result(addr, false);
        manager.worker_result(addr, false);
        manager.worker_result(addr, false);
        manager.tick();
        assert!(manager.is_banned(addr));

        // Give the fire-and-forget persist tasks a turn to run.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let restored = WorkerManager::new_with_storage(rules(), storage);
        restored.hydrate().await.unwrap();
        let worker = restored.get_worker(addr).unwrap();
        assert_eq!(worker.name(), "alice");
        assert!(restored.is_banned(addr));
    }
}
