// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded file metadata database backed by redb (pure Rust, ACID).
//!
//! The ledger only knows `hash → (owner, pointer)`. Everything else needed
//! to serve a file (nonce, tag, display name, size) lives here.
//!
//! ## Table Layout
//!
//! - `files`: file hash (32 bytes) → serialized FileMetadata
//! - `owner_index`: composite key (owner|!created_at|file_hash) → created_at
//! - `watcher_state`: key → value (checkpoint state)

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::blockchain::{FileHash, Principal};
use crate::cipher::{NONCE_LEN, TAG_LEN};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: file hash → serialized FileMetadata (JSON bytes).
const FILES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("files");

/// Index: `owner | !created_at_be | file_hash` → created_at (unix seconds).
/// The inverted timestamp gives newest-first range scans.
const OWNER_INDEX: TableDefinition<&[u8], i64> = TableDefinition::new("owner_index");

/// Watcher state: key → value bytes (e.g. "access_watcher" → u64 big-endian).
const WATCHER_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("watcher_state");

const OWNER_LEN: usize = 20;
const HASH_LEN: usize = 32;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("metadata already exists for {0}")]
    Duplicate(FileHash),

    #[error("no metadata for {0}")]
    NotFound(FileHash),

    #[error("{requester} does not own {file_hash}")]
    NotOwner {
        file_hash: FileHash,
        requester: Principal,
    },
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Off-ledger record of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_hash: FileHash,
    pub owner: Principal,
    /// Locator registered on the ledger.
    pub pointer: String,
    /// Key inside the object store.
    pub object_key: String,
    pub iv: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub name: String,
    pub content_type: String,
    /// Ciphertext size in bytes.
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Set by logical deletion. The ledger record is never removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// =============================================================================
// Index Key Helpers
// =============================================================================

fn make_index_key(owner: &Principal, created_at: i64, file_hash: &FileHash) -> Vec<u8> {
    let mut key = Vec::with_capacity(OWNER_LEN + 8 + HASH_LEN);
    key.extend_from_slice(owner.as_address().as_slice());
    // Invert timestamp for descending order (newest first)
    key.extend_from_slice(&(!created_at as u64).to_be_bytes());
    key.extend_from_slice(file_hash.as_bytes());
    key
}

fn make_prefix(owner: &Principal) -> Vec<u8> {
    owner.as_address().as_slice().to_vec()
}

/// Upper bound for a range scan over one owner's entries.
fn make_prefix_end(owner: &Principal) -> Vec<u8> {
    let mut end = make_prefix(owner);
    end.extend_from_slice(&[0xFF; 8 + HASH_LEN + 1]);
    end
}

fn hash_from_key(key: &[u8]) -> Option<FileHash> {
    let tail: [u8; HASH_LEN] = key.get(key.len().checked_sub(HASH_LEN)?..)?.try_into().ok()?;
    Some(FileHash::new(tail))
}

// =============================================================================
// MetadataStore
// =============================================================================

/// Embedded ACID metadata database.
pub struct MetadataStore {
    db: Database,
}

impl MetadataStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> MetadataResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(OWNER_INDEX)?;
            let _ = write_txn.open_table(WATCHER_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // File records
    // =========================================================================

    /// Insert a new record and its owner index entry. Existing hashes are rejected.
    pub fn insert(&self, metadata: &FileMetadata) -> MetadataResult<()> {
        let json = serde_json::to_vec(metadata)?;
        let created_at = metadata.created_at.timestamp();

        let write_txn = self.db.begin_write()?;
        {
            let mut files = write_txn.open_table(FILES)?;
            if files.get(metadata.file_hash.as_bytes().as_slice())?.is_some() {
                return Err(MetadataError::Duplicate(metadata.file_hash));
            }
            files.insert(metadata.file_hash.as_bytes().as_slice(), json.as_slice())?;

            let mut index = write_txn.open_table(OWNER_INDEX)?;
            let key = make_index_key(&metadata.owner, created_at, &metadata.file_hash);
            index.insert(key.as_slice(), created_at)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a single record, including logically deleted ones.
    pub fn get(&self, file_hash: &FileHash) -> MetadataResult<Option<FileMetadata>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        match table.get(file_hash.as_bytes().as_slice())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, file_hash: &FileHash) -> MetadataResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        Ok(table.get(file_hash.as_bytes().as_slice())?.is_some())
    }

    /// Files uploaded by `owner`, newest first.
    pub fn list_by_owner(&self, owner: &Principal, include_deleted: bool) -> MetadataResult<Vec<FileMetadata>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OWNER_INDEX)?;
        let files = read_txn.open_table(FILES)?;

        let prefix = make_prefix(owner);
        let prefix_end = make_prefix_end(owner);

        let mut results = Vec::new();
        for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let (key, _) = entry?;
            let Some(file_hash) = hash_from_key(key.value()) else {
                continue;
            };
            if let Some(value) = files.get(file_hash.as_bytes().as_slice())? {
                let metadata: FileMetadata = serde_json::from_slice(value.value())?;
                if include_deleted || !metadata.is_deleted() {
                    results.push(metadata);
                }
            }
        }
        Ok(results)
    }

    /// Mark a file deleted on behalf of `requester`, who must be its owner.
    ///
    /// Deleting twice keeps the first deletion time.
    pub fn mark_deleted(&self, file_hash: &FileHash, requester: &Principal) -> MetadataResult<FileMetadata> {
        let write_txn = self.db.begin_write()?;
        let metadata = {
            let mut table = write_txn.open_table(FILES)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table
                    .get(file_hash.as_bytes().as_slice())?
                    .ok_or(MetadataError::NotFound(*file_hash))?;
                existing.value().to_vec()
            };

            let mut metadata: FileMetadata = serde_json::from_slice(&existing_bytes)?;
            if metadata.owner != *requester {
                return Err(MetadataError::NotOwner {
                    file_hash: *file_hash,
                    requester: *requester,
                });
            }
            if metadata.deleted_at.is_none() {
                metadata.deleted_at = Some(Utc::now());
                let json = serde_json::to_vec(&metadata)?;
                table.insert(file_hash.as_bytes().as_slice(), json.as_slice())?;
            }
            metadata
        };
        write_txn.commit()?;
        Ok(metadata)
    }

    // =========================================================================
    // Watcher checkpoint
    // =========================================================================

    /// Last block processed by the named watcher, if any.
    pub fn checkpoint(&self, name: &str) -> MetadataResult<Option<u64>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WATCHER_STATE)?;
        match table.get(name)? {
            Some(v) => Ok(v
                .value()
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .map(u64::from_be_bytes)),
            None => Ok(None),
        }
    }

    pub fn set_checkpoint(&self, name: &str, block: u64) -> MetadataResult<()> {
        let bytes = block.to_be_bytes();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WATCHER_STATE)?;
            table.insert(name, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
