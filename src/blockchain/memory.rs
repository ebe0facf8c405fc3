// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory ledger backend (for testing and local runs).
//!
//! Every transport produced by a [`MemoryConnector`] shares one
//! [`AccessRegistry`], so rotating between "endpoints" sees the same chain.
//! Faults can be injected to exercise the retry/rotation paths without a
//! network:
//!
//! - [`MemoryLedger::fail_next`] queues errors returned by the next calls on any endpoint
//! - [`MemoryLedger::fail_endpoint`] makes one endpoint fail until healed
//! - [`MemoryLedger::fail_after_next_writes`] applies writes, then reports them as failed
//! - [`MemoryLedger::fail_blocks`] makes event queries touching a block range fail
//! - [`MemoryLedger::with_max_block_range`] enforces a per-call range ceiling
//!
//! [`MemoryLedger::calls`] counts every call that reached the ledger.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::error::{LedgerError, LedgerResult};
use super::registry::AccessRegistry;
use super::transport::{Connector, LedgerTransport};
use super::types::{EventFilter, EventKind, FileHash, LedgerEvent, LedgerReceipt, Principal};

#[derive(Default)]
struct Shared {
    registry: Mutex<AccessRegistry>,
    queued_faults: Mutex<VecDeque<LedgerError>>,
    endpoint_faults: Mutex<HashMap<String, LedgerError>>,
    range_faults: Mutex<Vec<(u64, u64, LedgerError)>>,
    write_faults: Mutex<VecDeque<LedgerError>>,
    calls: AtomicUsize,
    /// 0 means unlimited
    max_block_range: AtomicU64,
}

/// Handle to a shared in-memory chain.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    shared: Arc<Shared>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject event queries spanning more than `blocks` blocks.
    pub fn with_max_block_range(self, blocks: u64) -> Self {
        self.shared.max_block_range.store(blocks, Ordering::SeqCst);
        self
    }

    /// Connector whose transports sign as `caller`.
    pub fn connector(&self, caller: Principal) -> MemoryConnector {
        MemoryConnector {
            ledger: self.clone(),
            caller,
        }
    }

    /// Queue errors to be returned, in order, by the next calls.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = LedgerError>) {
        lock(&self.shared.queued_faults).extend(errors);
    }

    /// Make every call through `endpoint` fail with `error`.
    pub fn fail_endpoint(&self, endpoint: &str, error: LedgerError) {
        lock(&self.shared.endpoint_faults).insert(endpoint.to_string(), error);
    }

    pub fn heal_endpoint(&self, endpoint: &str) {
        lock(&self.shared.endpoint_faults).remove(endpoint);
    }

    /// Apply the next writes, then fail them with `errors` in order, as if
    /// the receipt was lost after the transaction landed.
    pub fn fail_after_next_writes(&self, errors: impl IntoIterator<Item = LedgerError>) {
        lock(&self.shared.write_faults).extend(errors);
    }

    fn after_write(&self) -> LedgerResult<()> {
        match lock(&self.shared.write_faults).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Make every event query overlapping `[from_block, to_block]` fail with `error`.
    pub fn fail_blocks(&self, from_block: u64, to_block: u64, error: LedgerError) {
        lock(&self.shared.range_faults).push((from_block, to_block, error));
    }

    fn range_fault(&self, from_block: u64, to_block: u64) -> Option<LedgerError> {
        lock(&self.shared.range_faults)
            .iter()
            .find(|(start, end, _)| from_block <= *end && *start <= to_block)
            .map(|(_, _, error)| error.clone())
    }

    /// Number of calls that reached the ledger (including injected failures).
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// Advance the tip by `blocks` empty blocks.
    pub fn mine(&self, blocks: u64) {
        lock(&self.shared.registry).mine(blocks);
    }

    /// Direct access to registry state, bypassing fault injection and counting.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut AccessRegistry) -> R) -> R {
        f(&mut lock(&self.shared.registry))
    }

    fn enter(&self, endpoint: &str) -> LedgerResult<MutexGuard<'_, AccessRegistry>> {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.shared.endpoint_faults).get(endpoint) {
            return Err(error.clone());
        }
        if let Some(error) = lock(&self.shared.queued_faults).pop_front() {
            return Err(error);
        }
        Ok(lock(&self.shared.registry))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector for [`MemoryTransport`]s.
#[derive(Clone)]
pub struct MemoryConnector {
    ledger: MemoryLedger,
    caller: Principal,
}

impl Connector for MemoryConnector {
    fn connect(&self, endpoint: &str) -> LedgerResult<Arc<dyn LedgerTransport>> {
        Ok(Arc::new(MemoryTransport {
            endpoint: endpoint.to_string(),
            caller: self.caller,
            ledger: self.ledger.clone(),
        }))
    }

    fn signer(&self) -> Option<Principal> {
        Some(self.caller)
    }
}

/// Transport bound to a named endpoint of a [`MemoryLedger`].
pub struct MemoryTransport {
    endpoint: String,
    caller: Principal,
    ledger: MemoryLedger,
}

impl MemoryTransport {
    fn receipt(event: Option<LedgerEvent>, registry: &AccessRegistry) -> LedgerReceipt {
        let block_number = event
            .as_ref()
            .map(|e| e.block_number)
            .unwrap_or_else(|| registry.block_number());
        LedgerReceipt {
            tx_hash: format!("0x{block_number:064x}"),
            block_number: Some(block_number),
        }
    }
}

#[async_trait]
impl LedgerTransport for MemoryTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        Ok(self.ledger.enter(&self.endpoint)?.block_number())
    }

    async fn register_file(&self, file_hash: FileHash, pointer: &str) -> LedgerResult<LedgerReceipt> {
        let mut registry = self.ledger.enter(&self.endpoint)?;
        let event = registry.register_file(self.caller, file_hash, pointer)?;
        let receipt = Self::receipt(Some(event), &registry);
        drop(registry);
        self.ledger.after_write()?;
        Ok(receipt)
    }

    async fn grant(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt> {
        let mut registry = self.ledger.enter(&self.endpoint)?;
        let event = registry.grant(self.caller, file_hash, principal)?;
        let receipt = Self::receipt(event, &registry);
        drop(registry);
        self.ledger.after_write()?;
        Ok(receipt)
    }

    async fn revoke(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt> {
        let mut registry = self.ledger.enter(&self.endpoint)?;
        let event = registry.revoke(self.caller, file_hash, principal)?;
        let receipt = Self::receipt(event, &registry);
        drop(registry);
        self.ledger.after_write()?;
        Ok(receipt)
    }

    async fn has_access(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<bool> {
        Ok(self.ledger.enter(&self.endpoint)?.has_access(file_hash, principal))
    }

    async fn get_pointer(&self, file_hash: FileHash) -> LedgerResult<String> {
        self.ledger.enter(&self.endpoint)?.pointer(file_hash)
    }

    async fn get_owner(&self, file_hash: FileHash) -> LedgerResult<Principal> {
        self.ledger.enter(&self.endpoint)?.owner(file_hash)
    }

    async fn query_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let registry = self.ledger.enter(&self.endpoint)?;
        if let Some(error) = self.ledger.range_fault(from_block, to_block) {
            return Err(error);
        }
        let ceiling = self.ledger.shared.max_block_range.load(Ordering::SeqCst);
        let span = to_block.saturating_sub(from_block).saturating_add(1);
        if ceiling > 0 && span > ceiling {
            return Err(LedgerError::RangeTooLarge(format!(
                "requested {span} blocks, maximum is {ceiling}"
            )));
        }
        Ok(registry.events(kind, &filter, from_block, to_block))
    }
}
