//! The configuration record: `{rpcEndpoints, contractAddresses,
//! privateKey, networkName, batchTimeWindow, workerTimeout, banRules,
//! artifactDir}`, plus the HTTP bind address and the ban/job ticker
//! intervals, which are configurable (default 10s, test overrides in the
//! sub-second range).
//!
//! Loaded via `clap::Parser` with `env` so every field can come from
//! either a flag or an environment variable, plus `dotenvy` to pick up a
//! local `.env` file before parsing.

use std::net::SocketAddr;
use std::time::Duration;

use alloy::primitives::Address;
use clap::Parser;
use zkseq_types::worker::BanRules;

fn parse_duration_secs(s: &str) -> Result<Duration, std::num::ParseFloatError> {
    Ok(Duration::from_secs_f64(s.parse::<f64>()?))
}

#[derive(Clone, Debug, Parser)]
#[command(name = "zkseq-sequencer", about = "Privacy-preserving voting sequencer")]
pub struct SequencerConfig {
    /// JSON-RPC endpoints for the ledger capability, most-preferred first.
    #[arg(long, env = "ZKSEQ_RPC_ENDPOINTS", value_delimiter = ',')]
    pub rpc_endpoints: Vec<String>,

    /// Deployed contract addresses this sequencer submits state
    /// transitions to, by name (`process-registry`, `results`, ...).
    #[arg(long, env = "ZKSEQ_CONTRACT_ADDRESSES", value_delimiter = ',')]
    pub contract_addresses: Vec<Address>,

    /// The sequencer's own signing key, used both to authenticate to the
    /// ledger and as the `seqAddr` in every worker auth token's message.
    #[arg(long, env = "ZKSEQ_PRIVATE_KEY")]
    pub private_key: String,

    #[arg(long, env = "ZKSEQ_NETWORK_NAME", default_value = "zkseq-devnet")]
    pub network_name: String,

    /// How long the aggregation driver waits for a batch to fill
    /// before forming a short one anyway.
    #[arg(long, env = "ZKSEQ_BATCH_TIME_WINDOW", value_parser = parse_duration_secs, default_value = "30")]
    pub batch_time_window: Duration,

    /// Per-job proving deadline before a job is treated as failed.
    #[arg(long, env = "ZKSEQ_WORKER_TIMEOUT", value_parser = parse_duration_secs, default_value = "60")]
    pub worker_timeout: Duration,

    #[arg(long, env = "ZKSEQ_FAILURES_TO_GET_BANNED", default_value = "3")]
    pub failures_to_get_banned: u32,

    #[arg(long, env = "ZKSEQ_BAN_TIMEOUT_SECS", default_value = "300")]
    pub ban_timeout_secs: u64,

    /// The ban/expiry maintenance tickers' period. Defaults to 10s;
    /// tests override this into the sub-second range.
    #[arg(long, env = "ZKSEQ_TICK_INTERVAL", value_parser = parse_duration_secs, default_value = "10")]
    pub tick_interval: Duration,

    /// Directory holding the ballot-proof and aggregator verifying keys,
    /// the circuit artifacts consumed but not produced here.
    #[arg(long, env = "ZKSEQ_ARTIFACT_DIR", default_value = "./artifacts")]
    pub artifact_dir: String,

    #[arg(long, env = "ZKSEQ_HTTP_BIND", default_value = "0.0.0.0:10000")]
    pub http_bind: SocketAddr,

    /// Postgres connection string for the `zkseq-storage` backend. Unset
    /// means the daemon runs against an in-memory store that does not
    /// survive a restart; requires the `postgres` build feature.
    #[arg(long, env = "ZKSEQ_DATABASE_URL")]
    pub database_url: Option<String>,
}

impl SequencerConfig {
    pub fn ban_rules(&self) -> BanRules {
        BanRules {
            failures_to_get_banned: self.failures_to_get_banned,
            ban_timeout_secs: self.ban_timeout_secs,
        }
    }
}
