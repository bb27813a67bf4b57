//! The sequencer daemon: loads configuration, wires up a [`Sequencer`],
//! starts its background tickers and serves its HTTP surface until
//! asked to shut down.

use std::sync::Arc;

use clap::Parser;
use vbs::version::StaticVersionType;
use zkseq_sequencer::api::{self, ApiVer};
use zkseq_sequencer::{Sequencer, SequencerConfig};
use zkseq_storage::{MemoryStorage, Storage};

#[cfg(feature = "postgres")]
async fn open_storage(database_url: &str) -> anyhow::Result<Arc<dyn Storage>> {
    let storage = zkseq_storage::postgres::PostgresStorage::connect(database_url).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "postgres"))]
async fn open_storage(_database_url: &str) -> anyhow::Result<Arc<dyn Storage>> {
    anyhow::bail!("ZKSEQ_DATABASE_URL was set but this binary was built without the `postgres` feature")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = SequencerConfig::parse();
    let bind = config.http_bind;

    let storage: Arc<dyn Storage> = match &config.database_url {
        Some(database_url) => open_storage(database_url).await?,
        None => Arc::new(MemoryStorage::new()),
    };

    let sequencer = Arc::new(Sequencer::new_with_storage(config, storage)?);
    sequencer.hydrate().await?;
    let handle = zkseq_sequencer::start(sequencer.clone());

    let app = api::build_app(sequencer.clone()).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let serving = tokio::spawn(app.serve(bind.to_string(), ApiVer::instance()));

    tracing::info!(%bind, "sequencer listening");

    tokio::select! {
        result = serving => {
            if let Ok(Err(error)) = result {
                tracing::error!(%error, "http server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
        }
    }

    handle.stop();
    Ok(())
}
