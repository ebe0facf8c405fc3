// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Resolution
//!
//! Answers "which files can this principal read?" from registry event
//! history, and authorizes single-file operations at the gate.
//!
//! ## Strategy
//!
//! 1. **Cache**: a resolved set younger than the TTL is returned without ledger I/O.
//! 2. **Window**: on a miss, only `[tip - window, tip]` is scanned (never below
//!    the registry deployment block).
//! 3. **Chunks**: the window is split into ranges under the endpoints'
//!    `eth_getLogs` ceiling and scanned with bounded fan-out. A chunk that
//!    exhausts its retries is skipped.
//! 4. **Projection**: registrations, grants and revokes for the principal are
//!    replayed in ledger order into a candidate set.
//! 5. **Verification** (strict mode only): each candidate is re-checked with
//!    `hasAccess`.
//!
//! ## Staleness
//!
//! Grants older than the window are not found. Revokes that land after a set
//! was cached are visible once the entry expires or the access watcher
//! invalidates it. Eventual mode trusts the replayed events; strict mode pays
//! one `hasAccess` call per candidate to remove any over-report.

pub mod cache;
pub mod gate;
pub mod projection;
pub mod resolver;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blockchain::{FileHash, Principal};

pub use cache::AccessCache;
pub use gate::{AccessGate, Decision, DenyReason, GateError};
pub use projection::{project_access, AccessProjection};
pub use resolver::{plan_chunks, AccessResolver, ResolveError, ResolverConfig};

/// How much the resolver trusts event history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Trust the replayed events.
    #[default]
    Eventual,
    /// Re-verify every candidate with `hasAccess`.
    Strict,
}

impl std::str::FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eventual" => Ok(Consistency::Eventual),
            "strict" => Ok(Consistency::Strict),
            other => Err(format!("unknown consistency mode `{other}` (expected `strict` or `eventual`)")),
        }
    }
}

/// Files a principal may read, as derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAccessSet {
    pub principal: Principal,
    pub file_hashes: BTreeSet<FileHash>,
    pub computed_at: DateTime<Utc>,
    /// First block of the scan window.
    pub scanned_from: u64,
    /// Tip height at resolution time.
    pub scanned_to: u64,
    /// Chunks dropped after exhausting retries.
    pub skipped_chunks: usize,
    /// Strict-mode candidates whose `hasAccess` check failed.
    pub unverified: usize,
    pub consistency: Consistency,
}

impl ResolvedAccessSet {
    pub fn contains(&self, file_hash: &FileHash) -> bool {
        self.file_hashes.contains(file_hash)
    }

    /// Whether every chunk and candidate was processed.
    pub fn is_complete(&self) -> bool {
        self.skipped_chunks == 0 && self.unverified == 0
    }
}
