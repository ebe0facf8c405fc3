// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger Vault - Ledger-Backed File Access Control
//!
//! Encrypts files before they reach an object store, registers each
//! ciphertext's hash on an EVM access registry, and answers "who can read
//! what" from the registry's event history.
//!
//! ## Modules
//!
//! - `cipher` - AES-256-GCM encryption and SHA-256 content hashing
//! - `blockchain` - Registry types, contract bindings and ledger transports
//! - `rpc` - Endpoint rotation and retry-with-backoff
//! - `access` - Access resolution engine, cache and gate
//! - `storage` - Object store boundary and redb metadata store
//! - `indexer` - Access watcher invalidating cached sets on new events
//! - `service` - Upstream API surface

pub mod access;
pub mod blockchain;
pub mod cipher;
pub mod config;
pub mod error;
pub mod indexer;
pub mod rpc;
pub mod service;
pub mod storage;

pub use error::{ErrorKind, VaultError, VaultResult};
pub use service::{UploadReceipt, VaultService};
