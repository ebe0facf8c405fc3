// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use ledger_vault::access::{AccessCache, AccessResolver};
use ledger_vault::blockchain::{Connector, EvmConnector, LedgerClient};
use ledger_vault::config::{VaultConfig, LOG_FORMAT_ENV};
use ledger_vault::indexer::AccessWatcher;
use ledger_vault::rpc::RpcPool;
use ledger_vault::storage::MetadataStore;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = VaultConfig::from_env()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoints = config.rpc_endpoints.len(),
        registry = %config.registry_address,
        consistency = ?config.resolver.consistency,
        "Ledger vault starting"
    );

    let registry = config.registry_address.to_string();
    let connector = match &config.signer_private_key {
        Some(key) => EvmConnector::with_signer(&registry, key)?,
        None => {
            tracing::warn!("No signer configured, running read-only");
            EvmConnector::read_only(&registry)?
        }
    };
    if let Some(signer) = connector.signer() {
        tracing::info!(signer = %signer, "Signing ledger calls");
    }
    let connector: Arc<dyn Connector> = Arc::new(connector);

    let pool = RpcPool::new(config.rpc_endpoints.clone(), connector, config.retry.clone())?;
    let ledger = LedgerClient::new(Arc::new(pool));

    let metadata = Arc::new(MetadataStore::open(&config.metadata_path())?);
    let resolver = Arc::new(AccessResolver::new(
        ledger,
        AccessCache::new(config.cache_capacity, config.cache_ttl),
        config.resolver.clone(),
    ));

    let shutdown = CancellationToken::new();
    let watcher = AccessWatcher::new(Arc::clone(&resolver), Arc::clone(&metadata))
        .with_poll_interval(config.watcher_poll_interval)
        .with_chunk_size(config.resolver.chunk_size);
    let watcher_handle = tokio::spawn(watcher.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
    watcher_handle.await?;

    tracing::info!("Ledger vault stopped");
    Ok(())
}
