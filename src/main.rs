// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use multisig_coordinator::blockchain::RestBroadcaster;
use multisig_coordinator::broadcast_poller::BroadcastPoller;
use multisig_coordinator::config::{CoordinatorConfig, LogFormat};
use multisig_coordinator::signing::SigningCoordinator;
use multisig_coordinator::storage::TransactionStore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CoordinatorConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let db_path = config.database_path();
    let store = Arc::new(TransactionStore::open(&db_path)?);
    info!(path = %db_path.display(), "Transaction database opened");

    let broadcaster = RestBroadcaster::new(
        &config.chain_rest_url,
        config.broadcast_mode,
        config.broadcast_timeout,
    )?;
    info!(
        endpoint = %broadcaster.endpoint(),
        chain_id = %config.chain_id,
        "Chain broadcaster configured"
    );

    let coordinator = Arc::new(SigningCoordinator::new(
        store,
        broadcaster,
        config.coordinator_settings(),
    ));

    let shutdown = CancellationToken::new();
    let poller_handle = if config.broadcast_max_retries > 0 {
        let poller = BroadcastPoller::new(Arc::clone(&coordinator), config.broadcast_max_retries)
            .with_interval(config.broadcast_retry_interval);
        Some(tokio::spawn(poller.run(shutdown.clone())))
    } else {
        info!("Automatic broadcast retry disabled; failed broadcasts wait for a manual retry");
        None
    };

    info!("Multi-sig coordinator running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested");
    shutdown.cancel();
    if let Some(handle) = poller_handle {
        handle.await?;
    }
    Ok(())
}
