//! The sequencer root: the one place every subsystem in this workspace
//! is wired together, behind an acyclic ownership DAG. `Sequencer` owns the
//! process directory, the pending-vote index, the vote-entry validator,
//! the worker/jobs pair and, per process, an aggregation driver and a
//! settlement loop — and hands borrowed capability views down into each
//! rather than letting any of them reach back up.
//!
//! Process provisioning itself (standing up a new `Process` record and
//! its census) is out of band here: a real deployment learns about new
//! processes by indexing a process-registry contract, the way the
//! indexer example this workspace's storage layer is grounded on
//! ingests on-chain state. [`Sequencer::register_process`] is the
//! equivalent ingestion hook this crate exposes in its place.

pub mod api;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod ledger;

pub use config::SequencerConfig;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use ark_bn254::Fr;
use ark_ed_on_bn254::{EdwardsAffine, Fr as EdFr};
use ark_ff::PrimeField;
use ark_std::rand::rngs::StdRng;
use ark_std::rand::SeedableRng;
use ark_std::UniformRand;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use zkseq_aggregator::{AggregationDriver, QueuedVote};
use zkseq_ballot::ballot_inputs_hash;
use zkseq_census::{Census, CensusWitness};
use zkseq_engine::StateEngine;
use zkseq_prover::MockProver;
use zkseq_settlement::{SettlementError, SettlementService, StateTransitionSubmission};
use zkseq_storage::{MemoryStorage, Storage, StorageError};
use zkseq_types::process::{Process, ProcessStatus};
use zkseq_types::vote::VoteStatus;
use zkseq_types::{Ballot, BallotMode, ProcessId, Rte, Te, VoteError, VoteId};
use zkseq_workers::{
    FailedJob, JobsError, JobsManager, JobsManagerHandle, TokenError, WorkerError, WorkerManager,
    WorkerManagerHandle,
};

use crate::directory::{PendingVotes, ProcessHandle, ProcessRegistry, RootReconciler, SettlementSink};
use crate::dispatch::{JobPayload, WorkerDispatchProver};
use crate::ledger::MockLedger;

type Validator = zkseq_validator::VoteEntryValidator<ProcessRegistry, PendingVotes, MockProver>;
type Settlement = SettlementService<Arc<MockLedger>, RootReconciler, SettlementSink>;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Jobs(#[from] JobsError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything registering a process needs beyond the stored [`Process`]
/// record: its census and the field values the engine is seeded with.
pub struct ProcessSetup {
    pub process: Process,
    pub census: Census,
}

/// Per-process runtime state the sequencer root drives in the
/// background: the batching queue and the settlement loop for that
/// process's own state engine and ledger.
struct ProcessRuntime {
    aggregator: Arc<AggregationDriver<Arc<WorkerDispatchProver>>>,
    settlement: Arc<Settlement>,
    k0_seed: EdFr,
}

pub struct Sequencer {
    pub config: SequencerConfig,
    pub address: Address,
    signer: PrivateKeySigner,
    pub processes: ProcessRegistry,
    pub pending: PendingVotes,
    validator: Arc<Validator>,
    pub workers: WorkerManager,
    pub jobs: Arc<JobsManager>,
    dispatcher: Arc<WorkerDispatchProver>,
    runtimes: DashMap<ProcessId, ProcessRuntime>,
    failed_rx: Mutex<Option<async_channel::Receiver<FailedJob>>>,
}

impl Sequencer {
    /// Construct a sequencer backed by a fresh, process-local in-memory
    /// store. Equivalent to [`Self::new_with_storage`] with a
    /// [`MemoryStorage`] — nothing survives a restart.
    pub fn new(config: SequencerConfig) -> Result<Self, SequencerError> {
        Self::new_with_storage(config, Arc::new(MemoryStorage::new()))
    }

    /// Construct a sequencer whose worker registry and pending-vote index
    /// are written through to `storage` (the `worker/` and `pending/` key
    /// spaces). Call [`Self::hydrate`] afterward to restore prior state
    /// before serving traffic.
    pub fn new_with_storage(config: SequencerConfig, storage: Arc<dyn Storage>) -> Result<Self, SequencerError> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| SequencerError::InvalidKey(format!("{e}")))?;
        let address = signer.address();

        let processes = ProcessRegistry::new();
        let pending = PendingVotes::new_with_storage(storage.clone());
        let dispatcher = Arc::new(WorkerDispatchProver::new());
        let validator = Arc::new(Validator::new(processes.clone(), pending.clone(), MockProver));
        let workers = WorkerManager::new_with_storage(config.ban_rules(), storage);
        let (jobs, failed_rx) = JobsManager::new(workers.clone(), config.worker_timeout);

        Ok(Self {
            config,
            address,
            signer,
            processes,
            pending,
            validator,
            workers,
            jobs: Arc::new(jobs),
            dispatcher,
            runtimes: DashMap::new(),
            failed_rx: Mutex::new(Some(failed_rx)),
        })
    }

    /// Restore the worker registry and pending-vote index from whatever
    /// was written through to storage before this process last stopped.
    /// Process/census/state-engine records are out of scope: those are
    /// re-learned from the on-chain process registry at startup, the way
    /// [`Self::register_process`]'s doc comment describes.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        self.workers.hydrate().await?;
        self.pending.hydrate().await?;
        Ok(())
    }

    /// Ingest a process this sequencer should start serving, seeding its
    /// state engine from the census root and standing up its batching
    /// queue and settlement loop. `k0_seed` is the batch's initial
    /// re-encryption randomness, drawn from `OsRng` here rather than a
    /// seeded RNG.
    pub fn register_process(&self, setup: ProcessSetup) -> Result<(), zkseq_census::CensusError> {
        let process_id = setup.process.id;
        let census_root = setup.census.root()?;
        let engine = Arc::new(StateEngine::new(census_root));
        let census = Arc::new(setup.census);

        self.processes.insert(ProcessHandle {
            process: setup.process,
            census: census.clone(),
            engine: engine.clone(),
        });

        let aggregator = Arc::new(AggregationDriver::new(
            engine.clone(),
            self.dispatcher.clone(),
            encryption_key_affine(&self.processes, process_id),
            zkseq_types::consts::VOTES_PER_BATCH,
            self.config.batch_time_window,
        ));

        let ledger = MockLedger::shared(census_root);
        let reconciler = RootReconciler { process_id, engine: engine.clone() };
        let sink = SettlementSink { process_id, pending: self.pending.clone() };
        let settlement = Arc::new(SettlementService::new(ledger, reconciler, sink, Duration::from_millis(200)));

        let mut rng = StdRng::from_entropy();
        let k0_seed = EdFr::rand(&mut rng);

        self.runtimes.insert(process_id, ProcessRuntime { aggregator, settlement, k0_seed });
        Ok(())
    }

    pub fn process_status(&self, process_id: ProcessId) -> Option<ProcessStatus> {
        self.processes.status(process_id)
    }

    /// `POST /votes`: run the validator, then enqueue the accepted vote
    /// for the process's aggregation driver.
    pub async fn submit_vote(&self, submission: VoteSubmission) -> Result<VoteId, VoteError> {
        let process_id = submission.process_id;
        let address = submission.address;
        let weight = submission.weight;
        let vote_id = submission.vote_id;

        let sub_hash = ballot_inputs_hash(
            process_id,
            &submission.ballot_mode,
            submission.encryption_key_te,
            address,
            vote_id,
            &submission.ballot_te,
            weight,
        )
        .map_err(|e| VoteError::InvalidInput(e.to_string()))?;

        let entry = zkseq_validator::Submission {
            process_id,
            address,
            weight,
            ballot_mode: submission.ballot_mode,
            encryption_key_te: submission.encryption_key_te,
            ballot_te: submission.ballot_te,
            vote_id,
            census_witness: submission.census_witness,
            proof: submission.proof,
        };

        // The validator commits the accepted vote to `self.pending` itself,
        // under the same per-address admission lock that guarded its
        // uniqueness check, so acceptance and commit are atomic from a
        // concurrent caller's point of view.
        let accepted = self.validator.validate(entry).await?;

        if let Some(runtime) = self.runtimes.get(&process_id) {
            runtime.aggregator.enqueue(QueuedVote {
                vote_id: accepted,
                address,
                weight,
                sub_hash,
                ballot_rte: submission.ballot_rte,
            });
        }
        Ok(accepted)
    }

    pub fn vote_status(&self, process_id: ProcessId, vote_id: VoteId) -> VoteStatus {
        self.pending.status_of(process_id, vote_id)
    }

    /// `GET /workers/job`: authenticate, register the worker if unseen,
    /// and hand back the next unclaimed aggregation job (if any).
    pub fn request_job(&self, address: Address, token: &[u8], name: &str) -> Result<Option<JobPayload>, SequencerError> {
        zkseq_workers::verify_token(self.address, token, address)?;
        self.workers.add_worker(address, name);
        if self.workers.is_banned(address) {
            return Err(WorkerError::WorkerBanned(address).into());
        }
        if !self.jobs.is_worker_available(address) {
            return Err(WorkerError::WorkerBusy(address).into());
        }
        let Some(job) = self.dispatcher.next_job() else {
            return Ok(None);
        };
        self.jobs.register_job(address, job.vote_id)?;
        Ok(Some(job))
    }

    /// `POST /workers/job/{voteID}`: the worker's reported outcome for
    /// an aggregation proof it claimed.
    pub async fn complete_job(
        &self,
        vote_id: VoteId,
        success: bool,
        commitment: Option<Fr>,
    ) -> Result<(), SequencerError> {
        self.dispatcher.complete(vote_id, success, commitment);
        self.jobs.complete_job(vote_id, success).await?;
        Ok(())
    }

    /// `GET /workers/auth`: the message template and timestamp a worker
    /// signs to mint a fresh token.
    pub fn auth_challenge(&self) -> (String, time::OffsetDateTime) {
        let now = time::OffsetDateTime::now_utc();
        (zkseq_types::auth::auth_message(self.address, now), now)
    }

    /// Every registered process ID this sequencer currently serves —
    /// used by the aggregation/settlement background loop and tests.
    fn process_ids(&self) -> Vec<ProcessId> {
        self.runtimes.iter().map(|entry| *entry.key()).collect()
    }

    async fn drive_process(self: &Arc<Self>, process_id: ProcessId, cancel: CancellationToken) {
        let Some(runtime) = self.runtimes.get(&process_id).map(|e| {
            (e.aggregator.clone(), e.settlement.clone(), e.k0_seed)
        }) else {
            return;
        };
        let (aggregator, settlement, k0_seed) = runtime;
        if let Err(error) = settlement.reconcile_at_startup().await {
            tracing::warn!(%process_id, %error, "startup reconciliation failed");
        }

        let mut k = k0_seed;
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    match aggregator.try_form_and_submit_batch(k).await {
                        Ok(Some(batch)) => {
                            k = zkseq_crypto::elgamal::next_chained_k(k);
                            let submission = StateTransitionSubmission {
                                vote_ids: batch.vote_ids,
                                root_hash_before: batch.public_inputs.root_hash_before,
                                root_hash_after: batch.public_inputs.root_hash_after,
                                voters_count: batch.public_inputs.voters_count,
                                overwritten_votes_count: batch.public_inputs.overwritten_votes_count,
                                census_root: batch.public_inputs.census_root,
                                blob_commitment_limbs: batch.public_inputs.blob_commitment_limbs,
                            };
                            match settlement.submit_with_retry(submission, 5).await {
                                Ok(receipt) => tracing::info!(%process_id, block = receipt.block_number, "batch settled"),
                                Err(error) => tracing::warn!(%process_id, %error, "settlement failed"),
                            }
                        }
                        Ok(None) => {}
                        Err(error) => tracing::warn!(%process_id, %error, "batch attempt failed"),
                    }
                }
            }
        }
    }
}

/// The payload `POST /votes` submits, already bearing the ballot proof
/// (the composer runs client-side; this crate validates, it doesn't
/// compose).
pub struct VoteSubmission {
    pub process_id: ProcessId,
    pub address: Address,
    pub weight: u64,
    pub ballot_mode: BallotMode,
    pub encryption_key_te: EdwardsAffine,
    pub ballot_te: Ballot<Te>,
    pub ballot_rte: Ballot<Rte>,
    pub vote_id: VoteId,
    pub census_witness: CensusWitness,
    pub proof: zkseq_prover::Proof,
}

fn encryption_key_affine(processes: &ProcessRegistry, process_id: ProcessId) -> EdwardsAffine {
    use ark_ff::Zero;
    processes
        .get(process_id)
        .map(|h| h.process.encryption_key.0)
        .unwrap_or_else(EdwardsAffine::zero)
}

/// A running sequencer: the worker/jobs tickers plus one background
/// batching-and-settlement loop per registered process.
pub struct SequencerHandle {
    pub sequencer: Arc<Sequencer>,
    workers: WorkerManagerHandle,
    jobs: JobsManagerHandle,
    cancel: CancellationToken,
    _tasks: Vec<AbortOnDropHandle<()>>,
}

impl SequencerHandle {
    pub fn workers(&self) -> &WorkerManager {
        self.workers.manager()
    }

    /// `Stop()`: cancel every background loop and clear the worker and
    /// jobs maps, so a stopped sequencer is observably empty.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.workers.stop();
        self.jobs.stop();
    }
}

/// `Start(ctx)`: spin up the worker-ban ticker, the job-expiry ticker,
/// and one batching/settlement loop per process already registered at
/// call time.
pub fn start(sequencer: Arc<Sequencer>) -> SequencerHandle {
    let cancel = CancellationToken::new();
    let tick_interval = sequencer.config.tick_interval;

    let workers = zkseq_workers::manager::start(sequencer.workers.clone(), &cancel, tick_interval);
    let jobs = zkseq_workers::jobs::start(sequencer.jobs.clone(), &cancel, tick_interval);

    let mut tasks = Vec::new();
    if let Some(failed_rx) = sequencer.failed_rx.lock().take() {
        let retry_cancel = cancel.child_token();
        let retry_sequencer = sequencer.clone();
        tasks.push(AbortOnDropHandle::new(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = retry_cancel.cancelled() => return,
                    job = failed_rx.recv() => {
                        match job {
                            Ok(failed) => tracing::info!(vote_id = %failed.vote_id, worker = %failed.worker, "job failed, awaiting re-request"),
                            Err(_) => return,
                        }
                    }
                }
            }
        })));
    }

    for process_id in sequencer.process_ids() {
        let child_cancel = cancel.child_token();
        let loop_sequencer = sequencer.clone();
        tasks.push(AbortOnDropHandle::new(tokio::spawn(async move {
            loop_sequencer.drive_process(process_id, child_cancel).await;
        })));
    }

    SequencerHandle { sequencer, workers, jobs, cancel, _tasks: tasks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address as EthAddress;
    use ark_ec::{AffineRepr, CurveGroup};
    use zkseq_census::merkle::MerkleCensus;
    use zkseq_prover::Prover;
    use zkseq_types::process::EdwardsAffinePoint;

    fn test_config() -> SequencerConfig {
        SequencerConfig {
            rpc_endpoints: vec![],
            contract_addresses: vec![],
            private_key: "0x0000000000000000000000000000000000000000000000000000000000000001".to_string(),
            network_name: "test".to_string(),
            batch_time_window: Duration::from_millis(50),
            worker_timeout: Duration::from_secs(5),
            failures_to_get_banned: 3,
            ban_timeout_secs: 60,
            tick_interval: Duration::from_millis(20),
            artifact_dir: "./artifacts".to_string(),
            http_bind: "127.0.0.1:0".parse().unwrap(),
            database_url: None,
        }
    }

    fn test_key(rng: &mut StdRng) -> EdwardsAffine {
        (EdwardsAffine::generator() * EdFr::rand(rng)).into_affine()
    }

    #[test]
    fn registering_a_process_makes_its_status_visible() {
        let sequencer = Sequencer::new(test_config()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let key = test_key(&mut rng);
        let process_id = ProcessId::derive(EthAddress::repeat_byte(1), 1, 1);
        let process = Process {
            id: process_id,
            organization: EthAddress::repeat_byte(1),
            census_root: [0u8; 32],
            ballot_mode: BallotMode {
                num_fields: 1,
                unique_values: false,
                min_value: 0,
                max_value: 100,
                min_value_sum: 0,
                max_value_sum: 100,
                cost_exponent: 1,
                cost_from_weight: false,
            },
            encryption_key: EdwardsAffinePoint(key),
            state_root: [0u8; 32],
            start_time_unix: 0,
            duration_secs: 3600,
            max_voters: 10,
            status: ProcessStatus::Accepting,
        };
        let mut tree = MerkleCensus::new();
        tree.add_bulk([(EthAddress::repeat_byte(2), 1u64)]);
        sequencer
            .register_process(ProcessSetup { process, census: Census::MerkleDynamic(tree) })
            .unwrap();

        assert_eq!(sequencer.process_status(process_id), Some(ProcessStatus::Accepting));
    }

    #[test]
    fn unknown_process_job_request_is_rejected_cleanly() {
        let sequencer = Sequencer::new(test_config()).unwrap();
        assert_eq!(sequencer.vote_status(ProcessId::derive(EthAddress::ZERO, 1, 1), VoteId(Fr::from(1u64))), VoteStatus::Unknown);
    }

    #[tokio::test]
    async fn a_well_formed_vote_is_accepted_and_becomes_visible() {
        let sequencer = Sequencer::new(test_config()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let encryption_key = test_key(&mut rng);
        let process_id = ProcessId::derive(EthAddress::repeat_byte(1), 1, 1);
        let voter = EthAddress::repeat_byte(9);

        let mut tree = MerkleCensus::new();
        tree.add_bulk([(voter, 1u64)]);
        let witness = zkseq_census::CensusWitness::Merkle(tree.generate_proof(voter).unwrap());

        let process = Process {
            id: process_id,
            organization: EthAddress::repeat_byte(1),
            census_root: [0u8; 32],
            ballot_mode: BallotMode {
                num_fields: 1,
                unique_values: false,
                min_value: 0,
                max_value: 100,
                min_value_sum: 0,
                max_value_sum: 100,
                cost_exponent: 1,
                cost_from_weight: false,
            },
            encryption_key: EdwardsAffinePoint(encryption_key),
            state_root: [0u8; 32],
            start_time_unix: 0,
            duration_secs: 3600,
            max_voters: 10,
            status: ProcessStatus::Accepting,
        };
        sequencer
            .register_process(ProcessSetup { process, census: Census::MerkleDynamic(tree) })
            .unwrap();
        assert_eq!(sequencer.process_status(process_id), Some(ProcessStatus::Accepting));

        let k = EdFr::from(42u64);
        let composed = zkseq_ballot::compose(process_id, voter, encryption_key, k, &[EdFr::from(5u64)], 1).unwrap();
        let vote_id = composed.vote_id;
        let ballot_te = composed.ballot.clone().into_te(|pair| pair);
        let weight = 1u64;
        let ballot_mode = BallotMode {
            num_fields: 1,
            unique_values: false,
            min_value: 0,
            max_value: 100,
            min_value_sum: 0,
            max_value_sum: 100,
            cost_exponent: 1,
            cost_from_weight: false,
        };

        let sub_hash = ballot_inputs_hash(process_id, &ballot_mode, encryption_key, voter, vote_id, &ballot_te, weight).unwrap();
        let proof = MockProver.prove(&vec![sub_hash]).await.unwrap();

        let submission = VoteSubmission {
            process_id,
            address: voter,
            weight,
            ballot_mode,
            encryption_key_te: encryption_key,
            ballot_te,
            ballot_rte: composed.ballot,
            vote_id,
            census_witness: witness,
            proof,
        };

        let accepted = sequencer.submit_vote(submission).await.unwrap();
        assert_eq!(accepted, vote_id);
        assert_eq!(sequencer.vote_status(process_id, vote_id), VoteStatus::Pending);
    }
}
