use std::time::Duration;

use anyhow::Error;
use api::AppState;
use attempt_guard::AttemptGuard;
use batch_pipeline_common::DataBase;
use collector::{BaseCollector, BatchProverTask, ChunkProverTask};
use config::Config;
use proof_receiver::ProofReceiver;
use task_sweeper::TimeoutSweeper;
use tokio::{net::TcpListener, sync::watch};

mod api;
mod attempt_guard;
mod collector;
mod config;
mod context;
mod proof_receiver;
mod task_sweeper;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // reads RUST_LOG
        .init();

    tracing::info!("App started");

    let config = Config::new()?;
    let db = DataBase::new(&config.db_filename, config.db_max_connections).await?;

    let base = BaseCollector::new(
        db.clone(),
        config.chain_id,
        AttemptGuard::new(config.max_attempts),
    );
    let state = AppState::new(
        ChunkProverTask::new(base.clone()),
        BatchProverTask::new(base),
        ProofReceiver::new(db.clone()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(
        TimeoutSweeper::new(db, Duration::from_secs(config.prover_task_timeout_sec)).run(
            Duration::from_secs(config.timeout_check_interval_sec),
            shutdown_rx,
        ),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Coordinator API started at {}", addr);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    sweeper.await?;

    Ok(())
}
