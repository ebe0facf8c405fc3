// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Two stores sit beside the ledger:
//!
//! - an **object store** holding ciphertext, keyed by content hash
//! - a **metadata store** (redb) holding what the ledger does not: nonce,
//!   tag, display name, size, logical deletion, and the access watcher's
//!   checkpoint
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   vault.redb        # files, owner_index, watcher_state tables
//! ```
//!
//! Neither store ever sees a plaintext byte or a symmetric key.

pub mod metadata;
pub mod object_store;

pub use metadata::{FileMetadata, MetadataError, MetadataResult, MetadataStore};
pub use object_store::{InMemoryObjectStore, ObjectStore, PresignedUrl, StorageError, StorageResult};
