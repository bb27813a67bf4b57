//! Jobs Manager: the set of pending proving assignments, and the
//! unbuffered `FailedJobs` channel that drives the aggregator's retry
//! loop.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use zkseq_types::{Job, VoteId, WorkerError};

use crate::manager::WorkerManager;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

fn now_unix_nanos() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
}

/// A job that failed, either by explicit `CompleteJob(false)` or by
/// expiry, ready for the aggregation driver's retry consumer.
#[derive(Clone, Debug)]
pub struct FailedJob {
    pub vote_id: VoteId,
    pub worker: Address,
}

/// Owns the pending-jobs map and the failure-notification channel.
/// `failed_tx` is bounded at zero capacity: `send` blocks until a
/// consumer calls `recv`, an intentional backpressure against piling up
/// unhandled failures.
pub struct JobsManager {
    jobs: Arc<DashMap<VoteId, Job>>,
    workers: WorkerManager,
    failed_tx: async_channel::Sender<FailedJob>,
    job_timeout: Duration,
}

impl JobsManager {
    /// Returns the manager and the receiving half of `FailedJobs`; the
    /// caller (the aggregator's retry loop) owns the receiver.
    pub fn new(workers: WorkerManager, job_timeout: Duration) -> (Self, async_channel::Receiver<FailedJob>) {
        let (failed_tx, failed_rx) = async_channel::bounded(0);
        (
            Self {
                jobs: Arc::new(DashMap::new()),
                workers,
                failed_tx,
                job_timeout,
            },
            failed_rx,
        )
    }

    /// `RegisterJob`: assign a vote to a worker, failing if the worker
    /// isn't registered, is banned, or already has a job in flight.
    pub fn register_job(&self, worker: Address, vote_id: VoteId) -> Result<(), JobsError> {
        if self.workers.get_worker(worker).is_none() {
            return Err(WorkerError::WorkerNotFound(worker).into());
        }
        if !self.is_worker_available(worker) {
            return Err(WorkerError::WorkerBanned(worker).into());
        }
        let now = now_unix_nanos();
        let job = Job::new(vote_id, worker, now, self.job_timeout.as_nanos() as i64);
        self.jobs.insert(vote_id, job);
        Ok(())
    }

    /// A worker is available iff it isn't banned and has no job in
    /// flight (one job at a time per worker).
    pub fn is_worker_available(&self, worker: Address) -> bool {
        if self.workers.is_banned(worker) {
            return false;
        }
        !self.jobs.iter().any(|entry| entry.value().worker == worker)
    }

    /// `CompleteJob`: remove the job; on failure, emit it to
    /// `FailedJobs` (blocking until a consumer is ready) before
    /// updating the worker's counters, matching the ordering the
    /// concurrency contract specifies.
    pub async fn complete_job(&self, vote_id: VoteId, success: bool) -> Result<(), JobsError> {
        let Some((_, job)) = self.jobs.remove(&vote_id) else {
            return Err(WorkerError::NoSuchJob(vote_id).into());
        };
        if !success {
            let _ = self
                .failed_tx
                .send(FailedJob {
                    vote_id,
                    worker: job.worker,
                })
                .await;
        }
        self.workers.worker_result(job.worker, success);
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.len()
    }

    /// One tick of the expiry scan: any job past its deadline is
    /// treated as a failure.
    async fn tick(&self) {
        let now = now_unix_nanos();
        let expired: Vec<VoteId> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();
        for vote_id in expired {
            if let Some((_, job)) = self.jobs.remove(&vote_id) {
                let _ = self
                    .failed_tx
                    .send(FailedJob {
                        vote_id,
                        worker: job.worker,
                    })
                    .await;
                self.workers.worker_result(job.worker, false);
            }
        }
    }

    pub fn clear(&self) {
        self.jobs.clear();
    }
}

pub struct JobsManagerHandle {
    jobs: Arc<JobsManager>,
    cancel: CancellationToken,
    _task: AbortOnDropHandle<()>,
}

impl JobsManagerHandle {
    pub fn jobs(&self) -> &Arc<JobsManager> {
        &self.jobs
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        self.jobs.clear();
    }
}

pub fn start(jobs: Arc<JobsManager>, parent: &CancellationToken, tick_interval: Duration) -> JobsManagerHandle {
    let cancel = parent.child_token();
    let task_jobs = jobs.clone();
    let task_cancel = cancel.clone();
    let task = AbortOnDropHandle::new(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => return,
                _ = ticker.tick() => task_jobs.tick().await,
            }
        }
    }));
    JobsManagerHandle {
        jobs,
        cancel,
        _task: task,
    }
}
