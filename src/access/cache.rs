// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for resolved access sets.
//!
//! Caches the resolved set per principal so repeated lookups inside the
//! TTL never touch the ledger.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

use super::ResolvedAccessSet;
use crate::blockchain::Principal;

/// Default time-to-live of a resolved set.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of principals kept.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Cached entry: resolved set + insertion timestamp.
struct CacheEntry {
    set: ResolvedAccessSet,
    inserted_at: Instant,
}

struct CacheState {
    entries: LruCache<Principal, CacheEntry>,
    /// Bumped by every invalidation of the principal.
    generations: LruCache<Principal, u64>,
    /// Generation of principals with no tracked entry. Raised past any
    /// evicted or cleared generation so snapshots never repeat.
    floor: u64,
    counter: u64,
}

impl CacheState {
    fn generation(&self, principal: &Principal) -> u64 {
        self.generations.peek(principal).copied().unwrap_or(self.floor)
    }
}

/// In-process LRU cache keyed by principal.
///
/// A resolution that started before an invalidation must not repopulate
/// the entry: take a [`AccessCache::generation`] snapshot before reading the
/// ledger and store through [`AccessCache::put_if_current`].
pub struct AccessCache {
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl AccessCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                generations: LruCache::new(capacity),
                floor: 0,
                counter: 0,
            }),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the cached set for a principal.
    ///
    /// Returns `None` if not cached or expired.
    pub fn get(&self, principal: &Principal) -> Option<ResolvedAccessSet> {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get(principal) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.set.clone());
            }
            // Expired, remove it
            state.entries.pop(principal);
        }
        None
    }

    /// Current invalidation generation of `principal`.
    pub fn generation(&self, principal: &Principal) -> u64 {
        self.lock().generation(principal)
    }

    /// Store a resolved set under its principal.
    pub fn put(&self, set: ResolvedAccessSet) {
        let mut state = self.lock();
        Self::insert(&mut state, set);
    }

    /// Store `set` only if its principal has not been invalidated since
    /// `generation` was taken. Returns whether it was stored.
    pub fn put_if_current(&self, set: ResolvedAccessSet, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation(&set.principal) != generation {
            return false;
        }
        Self::insert(&mut state, set);
        true
    }

    fn insert(state: &mut CacheState, set: ResolvedAccessSet) {
        state.entries.put(
            set.principal,
            CacheEntry {
                set,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Invalidate the cache for a specific principal.
    pub fn invalidate(&self, principal: &Principal) {
        let mut state = self.lock();
        state.entries.pop(principal);
        state.counter += 1;
        let generation = state.counter;
        if let Some((evicted, old)) = state.generations.push(*principal, generation) {
            if evicted != *principal {
                state.floor = state.floor.max(old);
            }
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.generations.clear();
        state.counter += 1;
        state.floor = state.counter;
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AccessCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
