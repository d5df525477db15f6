use std::sync::{Arc, Mutex};
use tipjar_indexer::{aggregator, api, config, db, indexer};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // RUST_LOG wins; info otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("TipJar Indexer starting...");

    // Load configuration
    let cfg = config::load()?;
    info!("  Chain ID: {}", cfg.chain_id);
    info!("  RPC URL: {}", cfg.rpc_http_url);
    info!("  TipJar: {:#x}", cfg.tip_jar);
    info!("  DB Path: {}", cfg.db_path);
    info!("  Port: {}", cfg.port);
    info!("  Confirmations: {}", cfg.confirmations);

    // Run DB migrations once at startup, then sanity-check what is already indexed
    {
        let conn = db::connect(&cfg.db_path)?;
        db::run_migrations(&conn)?;
        let report = aggregator::check_consistency(&conn)?;
        if !report.is_consistent() {
            warn!(
                "{} aggregate drifts found; see /stats/consistency",
                report.drifts.len()
            );
        }
    }

    // Shared DB connection
    let shared_conn = Arc::new(Mutex::new(db::connect(&cfg.db_path)?));

    // Spawn API task
    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        let conn = Arc::clone(&shared_conn);
        async move { api::serve(cfg, conn).await }
    });

    // Spawn Indexer task
    let indexer_handle = tokio::spawn({
        let cfg = cfg.clone();
        let conn = Arc::clone(&shared_conn);
        async move { indexer::run(cfg, conn).await }
    });

    // Graceful shutdown
    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        res = indexer_handle => match res {
            Ok(Ok(_)) => info!("Indexer exited cleanly"),
            Ok(Err(e)) => error!("Indexer error: {:?}", e),
            Err(e) => error!("Indexer task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("TipJar Indexer stopped.");
    Ok(())
}
