// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access resolution engine: cache, windowed chunk scan, projection.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::cache::AccessCache;
use super::projection::project_access;
use super::{Consistency, ResolvedAccessSet};
use crate::blockchain::{EventFilter, EventKind, FileHash, LedgerClient, LedgerError, LedgerEvent, LedgerResult, Principal};

/// Default number of blocks behind the tip that are scanned.
pub const DEFAULT_WINDOW_BLOCKS: u64 = 50_000;

/// Default block chunk size per `eth_getLogs` query.
pub const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Default number of chunk scans in flight.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No usable answer could be obtained. Callers must treat this as
    /// "unknown", never as "no access".
    #[error("Access resolution unavailable: {0}")]
    Unavailable(#[source] LedgerError),

    #[error("Access resolution timed out after {0:?}")]
    TimedOut(Duration),
}

/// Tuning for [`AccessResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub window_blocks: u64,
    pub chunk_size: u64,
    pub max_in_flight: usize,
    /// Registry deployment block; nothing below it is scanned.
    pub floor_block: u64,
    pub consistency: Consistency,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            window_blocks: DEFAULT_WINDOW_BLOCKS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            floor_block: 0,
            consistency: Consistency::Eventual,
        }
    }
}

/// Split `[from, to]` into inclusive ranges of at most `chunk_size` blocks.
pub fn plan_chunks(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(chunk_size - 1).min(to);
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

/// Resolves principals to the files they can read.
///
/// Owns its cache; several resolvers (e.g. in tests) never share state.
pub struct AccessResolver {
    ledger: LedgerClient,
    cache: AccessCache,
    config: ResolverConfig,
}

impl AccessResolver {
    pub fn new(ledger: LedgerClient, cache: AccessCache, config: ResolverConfig) -> Self {
        Self {
            ledger,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &AccessCache {
        &self.cache
    }

    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    /// Drop the cached set for `principal`.
    pub fn invalidate(&self, principal: &Principal) {
        self.cache.invalidate(principal);
    }

    /// Cached set if fresh, otherwise a new resolution.
    pub async fn resolve(&self, principal: Principal) -> Result<ResolvedAccessSet, ResolveError> {
        if let Some(set) = self.cache.get(&principal) {
            debug!(principal = %principal, files = set.file_hashes.len(), "Access cache hit");
            return Ok(set);
        }
        self.resolve_fresh(principal).await
    }

    /// Resolve from the ledger, bypassing (and then refreshing) the cache.
    pub async fn resolve_fresh(&self, principal: Principal) -> Result<ResolvedAccessSet, ResolveError> {
        // Taken before any ledger read; an invalidation after this point
        // means the history below may already be stale.
        let generation = self.cache.generation(&principal);
        let tip = self
            .ledger
            .block_number()
            .await
            .map_err(ResolveError::Unavailable)?;
        let from = tip
            .saturating_sub(self.config.window_blocks)
            .max(self.config.floor_block);
        let chunks = plan_chunks(from, tip, self.config.chunk_size);

        let scans: Vec<_> = stream::iter(chunks.iter().copied())
            .map(|(start, end)| async move { ((start, end), self.scan_chunk(principal, start, end).await) })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        let mut events = Vec::new();
        let mut skipped_chunks = 0;
        let mut last_error = None;
        for ((start, end), result) in scans {
            match result {
                Ok(mut found) => events.append(&mut found),
                Err(e) => {
                    warn!(
                        principal = %principal,
                        from_block = start,
                        to_block = end,
                        error = %e,
                        "Skipping chunk after exhausting retries"
                    );
                    skipped_chunks += 1;
                    last_error = Some(e);
                }
            }
        }

        if skipped_chunks == chunks.len() {
            if let Some(e) = last_error {
                return Err(ResolveError::Unavailable(e));
            }
        }

        let candidates = project_access(&principal, &events);
        let (file_hashes, unverified) = match self.config.consistency {
            Consistency::Eventual => (candidates, 0),
            Consistency::Strict => self.verify(principal, candidates).await?,
        };

        let set = ResolvedAccessSet {
            principal,
            file_hashes,
            computed_at: chrono::Utc::now(),
            scanned_from: from,
            scanned_to: tip,
            skipped_chunks,
            unverified,
            consistency: self.config.consistency,
        };

        info!(
            principal = %principal,
            files = set.file_hashes.len(),
            from_block = from,
            to_block = tip,
            chunks = chunks.len(),
            skipped_chunks,
            unverified,
            "Resolved access set"
        );

        // Partial answers are served but not cached, so the next caller retries.
        if set.is_complete() && !self.cache.put_if_current(set.clone(), generation) {
            debug!(principal = %principal, "Principal invalidated during resolution, result not cached");
        }
        Ok(set)
    }

    /// Run the resolution as a detached task bounded by `timeout`.
    ///
    /// On expiry the caller gets `TimedOut`; the task keeps running and a
    /// late result still lands in the cache for the next caller.
    pub async fn resolve_within(
        self: &Arc<Self>,
        principal: Principal,
        timeout: Duration,
    ) -> Result<ResolvedAccessSet, ResolveError> {
        if let Some(set) = self.cache.get(&principal) {
            return Ok(set);
        }

        let resolver = Arc::clone(self);
        let task = tokio::spawn(async move { resolver.resolve_fresh(principal).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ResolveError::Unavailable(LedgerError::Rpc(format!(
                "resolution task failed: {join_error}"
            )))),
            Err(_) => {
                warn!(principal = %principal, timeout_ms = timeout.as_millis() as u64, "Access resolution timed out");
                Err(ResolveError::TimedOut(timeout))
            }
        }
    }

    /// Registrations, grants and revokes naming `principal` in one chunk.
    async fn scan_chunk(&self, principal: Principal, from: u64, to: u64) -> LedgerResult<Vec<LedgerEvent>> {
        let filter = EventFilter::for_principal(principal);
        let (mut registered, mut granted, mut revoked) = tokio::try_join!(
            self.ledger.query_events(EventKind::FileRegistered, filter, from, to),
            self.ledger.query_events(EventKind::AccessGranted, filter, from, to),
            self.ledger.query_events(EventKind::AccessRevoked, filter, from, to),
        )?;

        registered.append(&mut granted);
        registered.append(&mut revoked);
        Ok(registered)
    }

    /// Keep only candidates the registry still confirms.
    ///
    /// Fails only if every check failed; otherwise unverifiable candidates
    /// are dropped and counted.
    async fn verify(
        &self,
        principal: Principal,
        candidates: BTreeSet<FileHash>,
    ) -> Result<(BTreeSet<FileHash>, usize), ResolveError> {
        let total = candidates.len();
        let checks: Vec<_> = stream::iter(candidates)
            .map(|file_hash| async move { (file_hash, self.ledger.has_access(file_hash, principal).await) })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        let mut confirmed = BTreeSet::new();
        let mut unverified = 0;
        let mut last_error = None;
        for (file_hash, result) in checks {
            match result {
                Ok(true) => {
                    confirmed.insert(file_hash);
                }
                Ok(false) => {
                    debug!(principal = %principal, file_hash = %file_hash, "Dropping revoked candidate");
                }
                Err(e) => {
                    warn!(principal = %principal, file_hash = %file_hash, error = %e, "Could not verify candidate");
                    unverified += 1;
                    last_error = Some(e);
                }
            }
        }

        if unverified == total {
            if let Some(e) = last_error {
                return Err(ResolveError::Unavailable(e));
            }
        }
        Ok((confirmed, unverified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::memory::{MemoryConnector, MemoryLedger};
    use crate::blockchain::{Connector, LedgerReceipt, LedgerTransport};
    use crate::rpc::{RetryPolicy, RpcPool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    const OWNER: Principal = Principal::new([0x11; 20]);
    const ALICE: Principal = Principal::new([0xaa; 20]);

    fn h(n: u8) -> FileHash {
        FileHash::new([n; 32])
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        }
    }

    fn resolver(ledger: &MemoryLedger, config: ResolverConfig) -> AccessResolver {
        let pool = RpcPool::new(
            vec!["rpc-a".to_string(), "rpc-b".to_string()],
            Arc::new(ledger.connector(OWNER)),
            fast_policy(),
        )
        .unwrap();
        AccessResolver::new(
            LedgerClient::new(Arc::new(pool)),
            AccessCache::default(),
            config,
        )
    }

    /// Owner registers h1..h3, grants all to Alice, then revokes h2.
    fn seed(ledger: &MemoryLedger) {
        ledger.with_registry(|r| {
            for n in 1..=3 {
                r.register_file(OWNER, h(n), &format!("mem://vault/{n}")).unwrap();
                r.grant(OWNER, h(n), ALICE).unwrap();
            }
            r.revoke(OWNER, h(2), ALICE).unwrap();
        });
    }

    /// Transport whose event queries read the ledger, then wait for a permit
    /// before returning what they read.
    struct HeldScan {
        inner: Arc<dyn LedgerTransport>,
        reads: Arc<AtomicUsize>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl LedgerTransport for HeldScan {
        fn endpoint(&self) -> &str {
            self.inner.endpoint()
        }

        async fn block_number(&self) -> LedgerResult<u64> {
            self.inner.block_number().await
        }

        async fn register_file(&self, file_hash: FileHash, pointer: &str) -> LedgerResult<LedgerReceipt> {
            self.inner.register_file(file_hash, pointer).await
        }

        async fn grant(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt> {
            self.inner.grant(file_hash, principal).await
        }

        async fn revoke(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt> {
            self.inner.revoke(file_hash, principal).await
        }

        async fn has_access(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<bool> {
            self.inner.has_access(file_hash, principal).await
        }

        async fn get_pointer(&self, file_hash: FileHash) -> LedgerResult<String> {
            self.inner.get_pointer(file_hash).await
        }

        async fn get_owner(&self, file_hash: FileHash) -> LedgerResult<Principal> {
            self.inner.get_owner(file_hash).await
        }

        async fn query_events(
            &self,
            kind: EventKind,
            filter: EventFilter,
            from_block: u64,
            to_block: u64,
        ) -> LedgerResult<Vec<LedgerEvent>> {
            let events = self.inner.query_events(kind, filter, from_block, to_block).await?;
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.release
                .acquire()
                .await
                .map_err(|e| LedgerError::Rpc(e.to_string()))?
                .forget();
            Ok(events)
        }
    }

    struct HeldConnector {
        inner: MemoryConnector,
        reads: Arc<AtomicUsize>,
        release: Arc<Semaphore>,
    }

    impl Connector for HeldConnector {
        fn connect(&self, endpoint: &str) -> LedgerResult<Arc<dyn LedgerTransport>> {
            Ok(Arc::new(HeldScan {
                inner: self.inner.connect(endpoint)?,
                reads: Arc::clone(&self.reads),
                release: Arc::clone(&self.release),
            }))
        }
    }

    #[test]
    fn chunk_plan_covers_range() {
        assert_eq!(plan_chunks(0, 9, 4), vec![(0, 3), (4, 7), (8, 9)]);
        assert_eq!(plan_chunks(5, 5, 100), vec![(5, 5)]);
        assert!(plan_chunks(6, 5, 100).is_empty());
        assert_eq!(plan_chunks(0, 2, 0), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(plan_chunks(u64::MAX - 1, u64::MAX, 10), vec![(u64::MAX - 1, u64::MAX)]);
    }

    #[tokio::test]
    async fn strict_mode_excludes_revoked_files() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let resolver = resolver(
            &ledger,
            ResolverConfig {
                consistency: Consistency::Strict,
                ..ResolverConfig::default()
            },
        );

        let set = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(1), h(3)]));
        assert!(set.is_complete());
    }

    #[tokio::test]
    async fn owner_sees_registered_files() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let resolver = resolver(&ledger, ResolverConfig::default());

        let set = resolver.resolve(OWNER).await.unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(1), h(2), h(3)]));
    }

    #[tokio::test]
    async fn second_resolve_within_ttl_issues_no_ledger_calls() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let resolver = resolver(&ledger, ResolverConfig::default());

        let first = resolver.resolve(ALICE).await.unwrap();
        let calls_after_first = ledger.calls();
        let second = resolver.resolve(ALICE).await.unwrap();

        assert_eq!(ledger.calls(), calls_after_first);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn resolve_fresh_bypasses_cache() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let resolver = resolver(&ledger, ResolverConfig::default());

        resolver.resolve(ALICE).await.unwrap();
        ledger.with_registry(|r| r.revoke(OWNER, h(3), ALICE).unwrap());

        assert!(resolver.resolve(ALICE).await.unwrap().contains(&h(3)));
        let fresh = resolver.resolve_fresh(ALICE).await.unwrap();
        assert_eq!(fresh.file_hashes, BTreeSet::from([h(1)]));
        // The fresh result replaced the cached one
        assert!(!resolver.resolve(ALICE).await.unwrap().contains(&h(3)));
    }

    #[tokio::test]
    async fn chunks_respect_range_ceiling() {
        let ledger = MemoryLedger::new().with_max_block_range(10);
        ledger.with_registry(|r| {
            r.register_file(OWNER, h(1), "mem://vault/1").unwrap();
            r.mine(35);
            r.grant(OWNER, h(1), ALICE).unwrap();
        });
        let resolver = resolver(
            &ledger,
            ResolverConfig {
                chunk_size: 10,
                ..ResolverConfig::default()
            },
        );

        let set = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(1)]));
        assert_eq!(set.skipped_chunks, 0);
    }

    #[tokio::test]
    async fn grants_outside_window_are_not_found() {
        let ledger = MemoryLedger::new();
        ledger.with_registry(|r| {
            r.register_file(OWNER, h(1), "mem://vault/1").unwrap();
            r.grant(OWNER, h(1), ALICE).unwrap(); // block 2
            r.mine(100);
            r.register_file(OWNER, h(2), "mem://vault/2").unwrap();
            r.grant(OWNER, h(2), ALICE).unwrap(); // block 104
        });
        let resolver = resolver(
            &ledger,
            ResolverConfig {
                window_blocks: 50,
                ..ResolverConfig::default()
            },
        );

        let set = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(2)]));
        assert_eq!(set.scanned_from, 54);
        assert_eq!(set.scanned_to, 104);
    }

    #[tokio::test]
    async fn floor_block_bounds_the_window() {
        let ledger = MemoryLedger::new();
        ledger.mine(10);
        let resolver = resolver(
            &ledger,
            ResolverConfig {
                floor_block: 8,
                ..ResolverConfig::default()
            },
        );
        let set = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(set.scanned_from, 8);
    }

    #[tokio::test]
    async fn failed_chunk_is_skipped_and_not_cached() {
        let ledger = MemoryLedger::new();
        seed(&ledger); // events at blocks 1..=7
        ledger.mine(20);
        ledger.fail_blocks(10, 19, LedgerError::Timeout("stuck".into()));
        let resolver = resolver(
            &ledger,
            ResolverConfig {
                chunk_size: 10,
                ..ResolverConfig::default()
            },
        );

        let set = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(1), h(3)]));
        assert_eq!(set.skipped_chunks, 1);
        assert!(!set.is_complete());
        assert!(resolver.cache().get(&ALICE).is_none());
    }

    #[tokio::test]
    async fn total_outage_is_unavailable() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        ledger.fail_endpoint("rpc-a", LedgerError::RateLimited("429".into()));
        ledger.fail_endpoint("rpc-b", LedgerError::RateLimited("429".into()));
        let resolver = resolver(&ledger, ResolverConfig::default());

        let result = resolver.resolve(ALICE).await;
        assert!(matches!(result, Err(ResolveError::Unavailable(LedgerError::RateLimited(_)))));
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn invalidation_during_scan_is_not_undone() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let reads = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Semaphore::new(0));
        let connector = HeldConnector {
            inner: ledger.connector(OWNER),
            reads: Arc::clone(&reads),
            release: Arc::clone(&release),
        };
        let pool = RpcPool::new(vec!["rpc-a".to_string()], Arc::new(connector), fast_policy()).unwrap();
        let resolver = Arc::new(AccessResolver::new(
            LedgerClient::new(Arc::new(pool)),
            AccessCache::default(),
            ResolverConfig::default(),
        ));

        let scan = tokio::spawn({
            let resolver = Arc::clone(&resolver);
            async move { resolver.resolve_fresh(ALICE).await }
        });
        // One chunk, three event kinds
        while reads.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }

        ledger.with_registry(|r| r.revoke(OWNER, h(1), ALICE).unwrap());
        resolver.invalidate(&ALICE);
        release.add_permits(64);

        let stale = scan.await.unwrap().unwrap();
        assert!(stale.contains(&h(1)));
        assert!(resolver.cache().get(&ALICE).is_none());

        let set = resolver.resolve(ALICE).await.unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(3)]));
        assert!(resolver.cache().get(&ALICE).is_some());
    }

    #[tokio::test]
    async fn resolve_within_returns_result_or_times_out() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let resolver = Arc::new(resolver(&ledger, ResolverConfig::default()));

        let set = resolver
            .resolve_within(ALICE, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(set.file_hashes, BTreeSet::from([h(1), h(3)]));
    }
}
