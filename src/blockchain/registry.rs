// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access registry contract logic.
//!
//! This is the in-process equivalent of the deployed `IAccessRegistry`
//! contract: one record per file hash, an implicit owner membership, and
//! owner-only grant/revoke. Every state-changing call is mined into its own
//! block and appends an event to the log, so history queries behave like
//! `eth_getLogs` against the real registry.
//!
//! ## State machine (per file hash)
//!
//! `Unregistered -> Registered` (terminal). Membership mutates within
//! `Registered`; the record itself never changes.

use std::collections::{HashMap, HashSet};

use super::error::{LedgerError, LedgerResult};
use super::types::{EventAction, EventFilter, EventKind, FileHash, FileRecord, LedgerEvent, Principal};

/// Registry state plus its append-only event log.
#[derive(Debug, Default)]
pub struct AccessRegistry {
    files: HashMap<FileHash, FileRecord>,
    grants: HashMap<FileHash, HashSet<Principal>>,
    events: Vec<LedgerEvent>,
    block_number: u64,
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tip height.
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Advance the tip by `blocks` empty blocks.
    pub fn mine(&mut self, blocks: u64) {
        self.block_number = self.block_number.saturating_add(blocks);
    }

    /// Register `file_hash` with `caller` as its immutable owner.
    pub fn register_file(
        &mut self,
        caller: Principal,
        file_hash: FileHash,
        pointer: &str,
    ) -> LedgerResult<LedgerEvent> {
        if pointer.trim().is_empty() {
            return Err(LedgerError::InvalidPointer);
        }
        if self.files.contains_key(&file_hash) {
            return Err(LedgerError::DuplicateFile(file_hash));
        }

        self.files.insert(
            file_hash,
            FileRecord {
                file_hash,
                owner: caller,
                pointer: pointer.to_string(),
            },
        );
        self.grants.insert(file_hash, HashSet::new());

        Ok(self.emit(
            file_hash,
            caller,
            EventAction::Registered {
                pointer: pointer.to_string(),
            },
        ))
    }

    /// Grant `principal` read access. Returns `None` when nothing changed.
    pub fn grant(
        &mut self,
        caller: Principal,
        file_hash: FileHash,
        principal: Principal,
    ) -> LedgerResult<Option<LedgerEvent>> {
        let owner = self.owner_checked(caller, file_hash)?;
        if principal.is_zero() {
            return Err(LedgerError::InvalidPrincipal(principal.to_string()));
        }
        if principal == owner {
            return Ok(None);
        }

        let inserted = self
            .grants
            .entry(file_hash)
            .or_default()
            .insert(principal);
        if !inserted {
            return Ok(None);
        }
        Ok(Some(self.emit(file_hash, principal, EventAction::Granted)))
    }

    /// Revoke `principal`'s access. Revoking a non-member is a no-op.
    pub fn revoke(
        &mut self,
        caller: Principal,
        file_hash: FileHash,
        principal: Principal,
    ) -> LedgerResult<Option<LedgerEvent>> {
        let owner = self.owner_checked(caller, file_hash)?;
        if principal == owner {
            return Err(LedgerError::CannotRevokeOwner(file_hash));
        }

        let removed = self
            .grants
            .get_mut(&file_hash)
            .is_some_and(|members| members.remove(&principal));
        if !removed {
            return Ok(None);
        }
        Ok(Some(self.emit(file_hash, principal, EventAction::Revoked)))
    }

    /// True iff `principal` is the owner or holds an unrevoked grant.
    /// Unknown hashes are simply `false`.
    pub fn has_access(&self, file_hash: FileHash, principal: Principal) -> bool {
        match self.files.get(&file_hash) {
            Some(record) if record.owner == principal => true,
            Some(_) => self
                .grants
                .get(&file_hash)
                .is_some_and(|members| members.contains(&principal)),
            None => false,
        }
    }

    pub fn pointer(&self, file_hash: FileHash) -> LedgerResult<String> {
        self.record(file_hash).map(|r| r.pointer.clone())
    }

    pub fn owner(&self, file_hash: FileHash) -> LedgerResult<Principal> {
        self.record(file_hash).map(|r| r.owner)
    }

    pub fn record(&self, file_hash: FileHash) -> LedgerResult<&FileRecord> {
        self.files
            .get(&file_hash)
            .ok_or(LedgerError::NotFound(file_hash))
    }

    /// Historical events of `kind` matching `filter` in `[from_block, to_block]`.
    pub fn events(
        &self,
        kind: EventKind,
        filter: &EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> Vec<LedgerEvent> {
        self.events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .filter(|e| e.kind() == kind && filter.matches(e))
            .cloned()
            .collect()
    }

    fn owner_checked(&self, caller: Principal, file_hash: FileHash) -> LedgerResult<Principal> {
        let owner = self.owner(file_hash)?;
        if owner != caller {
            return Err(LedgerError::NotOwner(file_hash));
        }
        Ok(owner)
    }

    fn emit(&mut self, file_hash: FileHash, principal: Principal, action: EventAction) -> LedgerEvent {
        self.block_number += 1;
        let event = LedgerEvent {
            block_number: self.block_number,
            log_index: 0,
            file_hash,
            principal,
            action,
        };
        self.events.push(event.clone());
        event
    }
}
