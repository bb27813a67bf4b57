//! Utility program to generate worker signing keys.
//!
//! A worker only ever needs one secp256k1 key: it signs
//! `GET /workers/auth` challenges with it to mint its bearer token.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use anyhow::anyhow;
use clap::Parser;
use rand::{RngCore, SeedableRng};

/// Generate one or more worker keypairs.
///
/// With no options, this prints a single keypair to stdout. Keys are
/// written in .env format so they can be sourced directly as
/// `ZKSEQ_WORKER_PRIVATE_KEY` by a worker process.
#[derive(Clone, Debug, Parser)]
struct Options {
    /// Seed for generating keys, as 32 bytes of hex.
    ///
    /// If not provided, a random seed is drawn from system entropy.
    #[clap(long, short = 's', value_parser = parse_seed)]
    seed: Option<[u8; 32]>,

    /// Number of keypairs to generate.
    #[clap(long, short = 'n', name = "N", default_value = "1")]
    num: usize,

    /// Write each keypair to DIR/<index>.env instead of stdout.
    #[clap(short, long, name = "OUT")]
    out: Option<PathBuf>,
}

fn parse_seed(s: &str) -> Result<[u8; 32], anyhow::Error> {
    let bytes = hex::decode(s.trim_start_matches("0x"))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow!("invalid seed length: {} (expected 32)", bytes.len()))
}

fn gen_default_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    let mut rng = rand_chacha::ChaChaRng::from_entropy();
    rng.fill_bytes(&mut seed);
    seed
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opts = Options::parse();

    if let Some(ref out_dir) = opts.out {
        fs::create_dir_all(out_dir)?;
    }

    for index in 0..opts.num {
        let seed = opts
            .seed
            .map(|base| derive_seed(base, index as u64))
            .unwrap_or_else(gen_default_seed);
        let private_key = format!("0x{}", hex::encode(seed));
        let signer: PrivateKeySigner = private_key.parse()?;
        let address = signer.address();

        let mut output = if let Some(ref out_dir) = opts.out {
            let path = out_dir.join(format!("{index}.env"));
            Box::new(File::options().write(true).create(true).truncate(true).open(&path)?) as Box<dyn Write>
        } else {
            Box::new(std::io::stdout())
        };

        writeln!(output, "# Worker address: {address}")?;
        writeln!(output, "ZKSEQ_WORKER_PRIVATE_KEY={private_key}")?;
        tracing::info!(%address, "generated worker key");
    }

    Ok(())
}

/// Mix a base seed with an index so `--num` draws distinct keys from a
/// single `--seed` deterministically.
fn derive_seed(base: [u8; 32], index: u64) -> [u8; 32] {
    let mut rng = rand_chacha::ChaChaRng::from_seed(base);
    for _ in 0..index {
        let mut discard = [0u8; 32];
        rng.fill_bytes(&mut discard);
    }
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    seed
}
