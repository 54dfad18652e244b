//! cairnd: the record store daemon.
//!
//! Loads configuration, initializes the signing identity, replays the
//! inventory, starts the anchor engine, and runs until interrupted. The
//! transport layer is a separate concern; this binary hosts the core
//! service and its background work.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cairn::anchor::engine::AnchorEngine;
use cairn::anchor::oracle::InProcessOracle;
use cairn::config::CairnConfig;
use cairn::identity::Identity;
use cairn::service::RecordService;
use cairn::time::SystemClock;

/// Command-line options. Everything here can also be set through the
/// environment; flags win.
#[derive(Parser)]
#[command(name = "cairnd", about = "censorship-resistant record store daemon")]
struct Args {
    /// Data directory for the commit log store.
    #[arg(long, env = "CAIRN_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log filter, e.g. "info" or "cairn=debug".
    #[arg(long, env = "CAIRN_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let mut config = CairnConfig::load().context("could not load configuration")?;
    if let Some(data_dir) = args.data_dir {
        config.storage.identity_path = data_dir.join("identity.json");
        config.storage.data_dir = data_dir;
    }

    info!(data_dir = %config.storage.data_dir.display(), "starting cairnd");

    let identity = Arc::new(
        Identity::load_or_generate(&config.storage.identity_path)
            .context("could not load signing identity")?,
    );
    info!(public_key = %identity.public_key_hex(), "signing identity loaded");

    let service = Arc::new(
        RecordService::open(
            &config.storage.data_dir,
            config.policy.clone(),
            Arc::clone(&identity),
            Arc::new(SystemClock),
        )
        .context("could not open record store")?,
    );

    // The oracle transport is out of scope here; the in-process oracle
    // stands in for it and is wired the same way a remote client would be.
    let oracle = Arc::new(InProcessOracle::new());

    let cancel = CancellationToken::new();
    let engine = Arc::new(AnchorEngine::new(
        service.shared_state(),
        oracle,
        config.anchor.clone(),
        Arc::new(SystemClock),
    ));
    let engine_handle = Arc::clone(&engine).spawn(cancel.clone());

    info!("start of day");

    tokio::signal::ctrl_c()
        .await
        .context("could not listen for shutdown signal")?;
    info!("interrupt received, shutting down");

    // Cooperative shutdown: stop accepting mutations, let the engine drain
    // its pending submissions, then exit.
    service.shutdown();
    cancel.cancel();
    engine_handle.await.ok();

    let stats = engine.stats();
    info!(
        dropped = stats.dropped,
        submitted = stats.submitted,
        confirmed = stats.confirmed,
        "exiting"
    );
    Ok(())
}
