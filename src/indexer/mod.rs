// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Watcher
//!
//! Background task that follows registry events and invalidates the cached
//! access sets of every principal they name.
//!
//! Without it, a revoke is only visible once the affected principal's cached
//! set expires. With it, the delay is bounded by one poll interval.
//!
//! ## Checkpointing
//!
//! The watcher persists the last processed block in redb (`watcher_state`
//! table). On restart it resumes from the checkpoint. A first start begins
//! at the current tip: sets cached before the process started do not exist.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::access::resolver::DEFAULT_CHUNK_SIZE;
use crate::access::{plan_chunks, AccessResolver};
use crate::blockchain::{EventFilter, EventKind, LedgerError, Principal};
use crate::storage::{MetadataError, MetadataStore};

/// Checkpoint key in the `watcher_state` table.
pub const CHECKPOINT_KEY: &str = "access_watcher";

/// Default poll interval when caught up to chain head.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Registry event follower that runs as a background tokio task.
pub struct AccessWatcher {
    resolver: Arc<AccessResolver>,
    store: Arc<MetadataStore>,
    poll_interval: Duration,
    chunk_size: u64,
}

impl AccessWatcher {
    pub fn new(resolver: Arc<AccessResolver>, store: Arc<MetadataStore>) -> Self {
        Self {
            resolver,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// This should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            poll_secs = self.poll_interval.as_secs(),
            chunk_size = self.chunk_size,
            "Access watcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Access watcher shutting down");
                return;
            }

            if let Err(e) = self.step().await {
                tracing::warn!(error = %e, "Watcher step failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Access watcher shutting down");
                    return;
                }
            }
        }
    }

    /// Process events from the checkpoint to the current tip.
    ///
    /// Returns the number of distinct principals invalidated.
    pub async fn step(&self) -> Result<usize, WatcherError> {
        let ledger = self.resolver.ledger();
        let head = ledger.block_number().await?;

        let Some(checkpoint) = self.store.checkpoint(CHECKPOINT_KEY)? else {
            self.store.set_checkpoint(CHECKPOINT_KEY, head)?;
            tracing::info!(block = head, "Access watcher initialized at tip");
            return Ok(0);
        };

        let start = checkpoint.saturating_add(1);
        if start > head {
            // Already caught up
            return Ok(0);
        }

        let filter = EventFilter::default();
        let mut invalidated = BTreeSet::new();
        for (from, to) in plan_chunks(start, head, self.chunk_size) {
            let (registered, granted, revoked) = tokio::try_join!(
                ledger.query_events(EventKind::FileRegistered, filter, from, to),
                ledger.query_events(EventKind::AccessGranted, filter, from, to),
                ledger.query_events(EventKind::AccessRevoked, filter, from, to),
            )?;

            let principals: BTreeSet<Principal> = registered
                .iter()
                .chain(&granted)
                .chain(&revoked)
                .map(|e| e.principal)
                .collect();
            for principal in &principals {
                self.resolver.invalidate(principal);
            }

            if !principals.is_empty() {
                tracing::debug!(
                    from_block = from,
                    to_block = to,
                    principals = principals.len(),
                    "Invalidated cached access sets"
                );
            }

            // Checkpoint only after the chunk's invalidations are done.
            self.store.set_checkpoint(CHECKPOINT_KEY, to)?;
            invalidated.extend(principals);
        }

        Ok(invalidated.len())
    }
}

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Db(#[from] MetadataError),
}
