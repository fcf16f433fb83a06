use std::{str::FromStr, sync::Arc};

use alloy::primitives::Address;
use anyhow::Error;
use batch_pipeline_common::DataBase;
use config::Config;
use layer2_relayer::Layer2Relayer;
use sender::ProviderSender;
use tokio::{sync::watch, time::Duration};

mod commit;
mod config;
mod layer2_relayer;
mod sender;
mod zk_rollup_binding;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // reads RUST_LOG
        .init();

    tracing::info!("App started");

    let config = Config::new()?;
    let db = DataBase::new(&config.db_filename, config.db_max_connections).await?;
    let rollup_contract = Address::from_str(&config.rollup_contract_address)?;

    let (sender, confirmations) = ProviderSender::new(
        &config.l1_rpc_url,
        &config.relayer_private_keys,
        config.confirmations,
    )?;
    let relayer = Layer2Relayer::new(
        db,
        Arc::new(sender),
        rollup_contract,
        config.recovery_page_size,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(relayer.run(
        Duration::from_secs(config.commit_interval_sec),
        Duration::from_secs(config.recovery_interval_sec),
        confirmations,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    shutdown_tx.send(true)?;
    handle.await?;

    Ok(())
}
