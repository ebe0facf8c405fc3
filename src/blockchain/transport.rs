// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transport seam between the ledger client and a concrete RPC endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::LedgerResult;
use super::types::{EventFilter, EventKind, FileHash, LedgerEvent, LedgerReceipt, Principal};

/// Raw registry calls bound to a single RPC endpoint.
///
/// Implementations do no retrying of their own; the RPC pool wraps every
/// call and decides whether a failure is worth another endpoint.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Endpoint this transport is bound to.
    fn endpoint(&self) -> &str;

    /// Current tip height.
    async fn block_number(&self) -> LedgerResult<u64>;

    async fn register_file(&self, file_hash: FileHash, pointer: &str) -> LedgerResult<LedgerReceipt>;

    async fn grant(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt>;

    async fn revoke(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt>;

    async fn has_access(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<bool>;

    async fn get_pointer(&self, file_hash: FileHash) -> LedgerResult<String>;

    async fn get_owner(&self, file_hash: FileHash) -> LedgerResult<Principal>;

    /// Historical events in `[from_block, to_block]`. Endpoints may reject
    /// ranges above their per-call ceiling with `RangeTooLarge`.
    async fn query_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<LedgerEvent>>;
}

/// Builds a transport bound to an endpoint. Called on every rotation, so
/// it must not perform network I/O.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str) -> LedgerResult<Arc<dyn LedgerTransport>>;

    /// Identity that signs state-changing calls, if any.
    fn signer(&self) -> Option<Principal> {
        None
    }
}
