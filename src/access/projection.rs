// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Event-sourced membership projection.
//!
//! Folds registry events, in ledger order, into per-file membership. Pure:
//! no I/O, no clocks. The resolver feeds it the events found in its scan
//! window, so files whose history starts before the window may be seen
//! without their registration.

use std::collections::{BTreeMap, BTreeSet};

use crate::blockchain::{EventAction, FileHash, LedgerEvent, Principal};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Membership {
    /// Unknown when the registration fell outside the scanned history.
    owner: Option<Principal>,
    members: BTreeSet<Principal>,
}

/// Membership state per file, rebuilt from events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessProjection {
    files: BTreeMap<FileHash, Membership>,
}

impl AccessProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from events in any order; they are replayed by `(block, log_index)`.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Self {
        let mut ordered: Vec<&LedgerEvent> = events.into_iter().collect();
        ordered.sort_by_key(|e| e.position());

        let mut projection = Self::new();
        for event in ordered {
            projection.apply(event);
        }
        projection
    }

    /// Apply one event. Events must be applied in ledger order.
    pub fn apply(&mut self, event: &LedgerEvent) {
        let entry = self.files.entry(event.file_hash).or_default();
        match &event.action {
            EventAction::Registered { .. } => {
                entry.owner = Some(event.principal);
                entry.members.insert(event.principal);
            }
            EventAction::Granted => {
                entry.members.insert(event.principal);
            }
            EventAction::Revoked => {
                // The registry never revokes an owner; ignore if history says otherwise.
                if entry.owner != Some(event.principal) {
                    entry.members.remove(&event.principal);
                }
            }
        }
    }

    pub fn has_access(&self, file_hash: &FileHash, principal: &Principal) -> bool {
        self.files
            .get(file_hash)
            .is_some_and(|m| m.members.contains(principal))
    }

    /// Known owner of `file_hash`, if its registration was replayed.
    pub fn owner(&self, file_hash: &FileHash) -> Option<Principal> {
        self.files.get(file_hash).and_then(|m| m.owner)
    }

    /// Every file `principal` can currently read according to the replayed events.
    pub fn accessible_by(&self, principal: &Principal) -> BTreeSet<FileHash> {
        self.files
            .iter()
            .filter(|(_, m)| m.members.contains(principal))
            .map(|(hash, _)| *hash)
            .collect()
    }
}

/// Files `principal` can read after replaying `events`.
pub fn project_access<'a>(
    principal: &Principal,
    events: impl IntoIterator<Item = &'a LedgerEvent>,
) -> BTreeSet<FileHash> {
    AccessProjection::from_events(events).accessible_by(principal)
}
