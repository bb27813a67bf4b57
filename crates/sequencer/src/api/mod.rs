//! The HTTP surface: vote submission and status, and the worker
//! job-dispatch and auth endpoints. Every handler is a thin wrapper
//! around a [`Sequencer`] method; this module's only job is wire format
//! and status-code mapping.
//!
//! Wired from a toml route spec loaded with `include_str!`, handlers
//! registered by name against a plain `ServerError`, no API versioning
//! (this surface has none to carry).

use std::sync::Arc;

use alloy::primitives::Address;
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_serialize::CanonicalDeserialize;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tide_disco::error::ServerError;
use tide_disco::{Api, App, StatusCode};
use vbs::version::{StaticVersion, StaticVersionType};

use zkseq_census::{CensusWitness, MerkleProof};
use zkseq_prover::Proof;
use zkseq_types::process::EdwardsAffinePoint;
use zkseq_types::vote::VoteStatus;
use zkseq_types::{Ballot, BallotMode, ProcessId, Rte, Te, VoteError, VoteId};
use zkseq_workers::{JobsError, WorkerError};

use crate::dispatch::JobPayload;
use crate::{Sequencer, SequencerError, VoteSubmission};

/// This surface carries no version negotiation; pinned at `0.1`.
pub type ApiVer = StaticVersion<0, 1>;

fn server_error(status: StatusCode, message: impl std::fmt::Display) -> ServerError {
    ServerError::catch_all(status, message.to_string())
}

fn bad_request(message: impl std::fmt::Display) -> ServerError {
    server_error(StatusCode::BAD_REQUEST, message)
}

fn vote_error_response(error: VoteError) -> ServerError {
    let status = match error {
        VoteError::UnknownProcess(_) => StatusCode::NOT_FOUND,
        VoteError::ProcessNotAccepting(_) | VoteError::MaxVotersReached(_) => StatusCode::FORBIDDEN,
        VoteError::InvalidInput(_) | VoteError::InvalidCensusProof | VoteError::ProofVerificationFailed => {
            StatusCode::BAD_REQUEST
        },
        VoteError::DuplicateVote { .. } | VoteError::BallotAlreadyProcessing(..) => StatusCode::CONFLICT,
    };
    server_error(status, error)
}

fn sequencer_error_response(error: SequencerError) -> ServerError {
    match error {
        SequencerError::Vote(e) => vote_error_response(e),
        SequencerError::UnknownProcess(_) => server_error(StatusCode::NOT_FOUND, error),
        SequencerError::Worker(WorkerError::WorkerNotFound(_)) => server_error(StatusCode::NOT_FOUND, error),
        SequencerError::Worker(WorkerError::WorkerBanned(_)) => server_error(StatusCode::FORBIDDEN, error),
        SequencerError::Worker(WorkerError::WorkerBusy(_)) => server_error(StatusCode::CONFLICT, error),
        SequencerError::Worker(WorkerError::NoSuchJob(_)) => server_error(StatusCode::NOT_FOUND, error),
        SequencerError::Worker(WorkerError::InvalidToken) => server_error(StatusCode::UNAUTHORIZED, error),
        SequencerError::Jobs(JobsError::Worker(inner)) => {
            sequencer_error_response(SequencerError::Worker(inner))
        },
        SequencerError::Token(_) => server_error(StatusCode::UNAUTHORIZED, error),
        SequencerError::Settlement(_) | SequencerError::InvalidKey(_) => {
            server_error(StatusCode::INTERNAL_SERVER_ERROR, error)
        },
    }
}

fn fr_to_hex(value: &Fr) -> String {
    hex::encode(value.into_bigint().to_bytes_be())
}

fn fr_from_hex(s: &str) -> Result<Fr, String> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    Ok(Fr::from_be_bytes_mod_order(&bytes))
}

fn ballot_from_hex<Coord: Send + Sync>(s: &str) -> Result<Ballot<Coord>, String> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| e.to_string())?;
    Ballot::<Coord>::deserialize_compressed(&bytes[..]).map_err(|e| e.to_string())
}

/// Wire form of [`CensusWitness`]: arkworks scalars in the Merkle
/// siblings bridge through hex the same way every other field element
/// does at this boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CensusWitnessDto {
    Merkle { siblings: Vec<String>, path_bits: Vec<bool> },
    Csp { ver_key: String, signature: String },
}

impl CensusWitnessDto {
    fn into_witness(self) -> Result<CensusWitness, String> {
        match self {
            CensusWitnessDto::Merkle { siblings, path_bits } => {
                let siblings = siblings
                    .iter()
                    .map(|s| fr_from_hex(s))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CensusWitness::Merkle(MerkleProof { siblings, path_bits }))
            },
            CensusWitnessDto::Csp { ver_key, signature } => Ok(CensusWitness::Csp {
                ver_key_bytes: hex::decode(ver_key.trim_start_matches("0x")).map_err(|e| e.to_string())?,
                signature_bytes: hex::decode(signature.trim_start_matches("0x")).map_err(|e| e.to_string())?,
            }),
        }
    }
}

/// `POST /votes` request body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitVoteRequest {
    pub process_id: ProcessId,
    pub address: Address,
    pub weight: u64,
    pub ballot_mode: BallotMode,
    pub encryption_key: EdwardsAffinePoint,
    /// Hex-encoded, compressed `ark-serialize` bytes of a `Ballot<Te>`.
    pub ballot_te: String,
    /// Hex-encoded, compressed `ark-serialize` bytes of a `Ballot<Rte>`.
    pub ballot_rte: String,
    pub vote_id: VoteId,
    pub census_witness: CensusWitnessDto,
    /// Hex-encoded scalar: the ballot proof's single field element.
    pub proof: String,
}

impl SubmitVoteRequest {
    fn into_submission(self) -> Result<VoteSubmission, String> {
        Ok(VoteSubmission {
            process_id: self.process_id,
            address: self.address,
            weight: self.weight,
            ballot_mode: self.ballot_mode,
            encryption_key_te: self.encryption_key.0,
            ballot_te: ballot_from_hex::<Te>(&self.ballot_te)?,
            ballot_rte: ballot_from_hex::<Rte>(&self.ballot_rte)?,
            vote_id: self.vote_id,
            census_witness: self.census_witness.into_witness()?,
            proof: Proof(fr_from_hex(&self.proof)?),
        })
    }
}

#[derive(Serialize)]
pub struct SubmitVoteResponse {
    pub vote_id: VoteId,
}

#[derive(Serialize)]
pub struct VoteStatusResponse {
    pub status: VoteStatus,
}

#[derive(Serialize)]
pub struct JobPayloadResponse {
    pub vote_id: VoteId,
    pub public_inputs: Vec<String>,
}

impl From<JobPayload> for JobPayloadResponse {
    fn from(job: JobPayload) -> Self {
        Self {
            vote_id: job.vote_id,
            public_inputs: job.public_inputs.iter().map(fr_to_hex).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteJobRequest {
    pub success: bool,
    /// The aggregation proof's commitment, present iff `success`.
    pub commitment: Option<String>,
}

#[derive(Serialize)]
pub struct AuthChallengeResponse {
    pub message: String,
    pub timestamp: String,
}

fn vote_id_from_path(raw: &str) -> Result<VoteId, ServerError> {
    let u = alloy::primitives::U256::from_str_radix(raw.trim_start_matches("0x"), 16)
        .or_else(|_| alloy::primitives::U256::from_str_radix(raw, 10))
        .map_err(|e| bad_request(format!("invalid vote id: {e}")))?;
    Ok(VoteId(Fr::from_be_bytes_mod_order(&u.to_be_bytes::<32>())))
}

/// Build the registered API module; `app.register_module("api", api)`
/// mounts it at the root the way `hotshot-state-prover`'s own HTTP
/// bring-up does.
pub fn define_api(sequencer: Arc<Sequencer>) -> Result<Api<(), ServerError, ApiVer>, ServerError> {
    let toml = toml::from_str::<toml::Value>(include_str!("../../api/sequencer.toml"))
        .map_err(|e| server_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    let mut api = Api::<(), ServerError, ApiVer>::new(toml)
        .map_err(|e| server_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    api.post("submit_vote", {
        let sequencer = sequencer.clone();
        move |req, _state| {
            let sequencer = sequencer.clone();
            async move {
                let request = req
                    .body_auto::<SubmitVoteRequest, ApiVer>(ApiVer::instance())
                    .map_err(|e| bad_request(e.to_string()))?;
                let submission = request.into_submission().map_err(bad_request)?;
                let vote_id = sequencer
                    .submit_vote(submission)
                    .await
                    .map_err(vote_error_response)?;
                Ok(SubmitVoteResponse { vote_id })
            }
            .boxed()
        }
    })?;

    api.get("vote_status", {
        let sequencer = sequencer.clone();
        move |req, _state| {
            let sequencer = sequencer.clone();
            async move {
                let process_id = req
                    .string_param("process_id")
                    .map_err(|e| bad_request(e.to_string()))?;
                let process_id = ProcessId(
                    process_id
                        .parse()
                        .map_err(|_| bad_request("invalid process id"))?,
                );
                let vote_id_raw = req.string_param("vote_id").map_err(|e| bad_request(e.to_string()))?;
                let vote_id = vote_id_from_path(vote_id_raw)?;
                if sequencer.process_status(process_id).is_none() {
                    return Err(server_error(StatusCode::NOT_FOUND, format!("unknown process {process_id}")));
                }
                Ok(VoteStatusResponse {
                    status: sequencer.vote_status(process_id, vote_id),
                })
            }
            .boxed()
        }
    })?;

    api.get("worker_job", {
        let sequencer = sequencer.clone();
        move |req, _state| {
            let sequencer = sequencer.clone();
            async move {
                let addr = req.string_param("addr").map_err(|e| bad_request(e.to_string()))?;
                let token = req.string_param("token").map_err(|e| bad_request(e.to_string()))?;
                let name = req.string_param("name").map_err(|e| bad_request(e.to_string()))?;
                let address: Address = addr.parse().map_err(|_| bad_request("invalid worker address"))?;
                let token_bytes = hex::decode(token.trim_start_matches("0x")).map_err(|e| bad_request(e.to_string()))?;
                let job = sequencer
                    .request_job(address, &token_bytes, name)
                    .map_err(sequencer_error_response)?;
                Ok(job.map(JobPayloadResponse::from))
            }
            .boxed()
        }
    })?;

    api.post("worker_job_complete", {
        let sequencer = sequencer.clone();
        move |req, _state| {
            let sequencer = sequencer.clone();
            async move {
                let vote_id_raw = req.string_param("vote_id").map_err(|e| bad_request(e.to_string()))?;
                let vote_id = vote_id_from_path(vote_id_raw)?;
                let body = req
                    .body_auto::<CompleteJobRequest, ApiVer>(ApiVer::instance())
                    .map_err(|e| bad_request(e.to_string()))?;
                let commitment = body
                    .commitment
                    .as_deref()
                    .map(fr_from_hex)
                    .transpose()
                    .map_err(bad_request)?;
                sequencer
                    .complete_job(vote_id, body.success, commitment)
                    .await
                    .map_err(sequencer_error_response)?;
                Ok(())
            }
            .boxed()
        }
    })?;

    api.get("worker_auth", move |_req, _state| {
        let sequencer = sequencer.clone();
        async move {
            let (message, timestamp) = sequencer.auth_challenge();
            Ok(AuthChallengeResponse {
                message,
                timestamp: zkseq_types::auth::format_timestamp(timestamp),
            })
        }
        .boxed()
    })?;

    Ok(api)
}

/// Build the full `tide_disco` app: the HTTP front door onto the
/// sequencer. State-free by design: every handler captures its own
/// `Arc<Sequencer>` clone rather than threading it through
/// `tide_disco`'s `ReadState`.
pub fn build_app(sequencer: Arc<Sequencer>) -> Result<App<(), ServerError>, ServerError> {
    let api = define_api(sequencer)?;
    let mut app = App::<(), ServerError>::with_state(());
    app.register_module("api", api)
        .map_err(|e| server_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(app)
}
