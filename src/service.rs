// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Vault Service
//!
//! The operations an outer layer (HTTP, CLI) calls. Every string input is
//! parsed before any I/O; every read of file content goes through the
//! [`AccessGate`].
//!
//! State-changing ledger calls are signed by the service's own key, so the
//! service's principal owns everything it uploads.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::access::{AccessGate, AccessResolver, Decision, DenyReason, GateError};
use crate::blockchain::{FileHash, LedgerClient, LedgerReceipt, Principal};
use crate::cipher::{self, SymmetricKey};
use crate::config::DEFAULT_PRESIGN_TTL;
use crate::error::{VaultError, VaultResult};
use crate::storage::{FileMetadata, MetadataError, MetadataStore, ObjectStore, PresignedUrl};

/// Result of a successful upload.
///
/// `key` is the only copy of the file key. The service keeps nothing that
/// could decrypt the file.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub file_hash: FileHash,
    pub pointer: String,
    #[serde(skip)]
    pub key: SymmetricKey,
    pub receipt: LedgerReceipt,
}

pub struct VaultService {
    ledger: LedgerClient,
    resolver: Arc<AccessResolver>,
    gate: AccessGate,
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<MetadataStore>,
    presign_ttl: Duration,
}

impl VaultService {
    pub fn new(resolver: Arc<AccessResolver>, objects: Arc<dyn ObjectStore>, metadata: Arc<MetadataStore>) -> Self {
        let ledger = resolver.ledger().clone();
        Self {
            gate: AccessGate::new(ledger.clone(), Arc::clone(&resolver)),
            ledger,
            resolver,
            objects,
            metadata,
            presign_ttl: DEFAULT_PRESIGN_TTL,
        }
    }

    pub fn with_presign_ttl(mut self, ttl: Duration) -> Self {
        self.presign_ttl = ttl;
        self
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn resolver(&self) -> &Arc<AccessResolver> {
        &self.resolver
    }

    /// Encrypt, store, register and record a new file.
    pub async fn upload(&self, name: &str, content_type: &str, plaintext: &[u8]) -> VaultResult<UploadReceipt> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("file name must not be empty".to_string()));
        }

        let key = cipher::generate_key();
        let object = cipher::encrypt(plaintext, &key)?;
        let file_hash = object.content_hash;
        if self.metadata.contains(&file_hash)? {
            return Err(MetadataError::Duplicate(file_hash).into());
        }

        let object_key = file_hash.to_hex();
        let size = object.ciphertext.len() as u64;
        let pointer = self.objects.put(&object_key, object.ciphertext, content_type).await?;
        let receipt = self.ledger.register_file(file_hash, &pointer).await?;
        let owner = self.ledger.get_owner(file_hash).await?;

        self.metadata.insert(&FileMetadata {
            file_hash,
            owner,
            pointer: pointer.clone(),
            object_key,
            iv: object.iv,
            tag: object.auth_tag,
            name: name.to_string(),
            content_type: content_type.to_string(),
            size,
            created_at: chrono::Utc::now(),
            deleted_at: None,
        })?;
        self.resolver.invalidate(&owner);

        info!(file_hash = %file_hash, owner = %owner, size, tx_hash = %receipt.tx_hash, "File uploaded");
        Ok(UploadReceipt {
            file_hash,
            pointer,
            key,
            receipt,
        })
    }

    /// Register an object stored out of band.
    pub async fn register_upload(&self, file_hash: &str, pointer: &str) -> VaultResult<LedgerReceipt> {
        let file_hash: FileHash = file_hash.parse()?;
        let receipt = self.ledger.register_file(file_hash, pointer).await?;

        match self.ledger.get_owner(file_hash).await {
            Ok(owner) => self.resolver.invalidate(&owner),
            // The entry expires on its own; the registration already succeeded.
            Err(e) => warn!(file_hash = %file_hash, error = %e, "Owner lookup after registration failed"),
        }
        info!(file_hash = %file_hash, tx_hash = %receipt.tx_hash, "File registered");
        Ok(receipt)
    }

    pub async fn grant_access(&self, file_hash: &str, principal: &str) -> VaultResult<LedgerReceipt> {
        let (file_hash, principal) = parse_pair(file_hash, principal)?;
        let receipt = self.ledger.grant(file_hash, principal).await?;
        self.resolver.invalidate(&principal);
        info!(target: "audit", file_hash = %file_hash, principal = %principal, tx_hash = %receipt.tx_hash, "Access granted");
        Ok(receipt)
    }

    pub async fn revoke_access(&self, file_hash: &str, principal: &str) -> VaultResult<LedgerReceipt> {
        let (file_hash, principal) = parse_pair(file_hash, principal)?;
        let receipt = self.ledger.revoke(file_hash, principal).await?;
        self.resolver.invalidate(&principal);
        info!(target: "audit", file_hash = %file_hash, principal = %principal, tx_hash = %receipt.tx_hash, "Access revoked");
        Ok(receipt)
    }

    /// Whether `principal` can read `file_hash`. Unknown files are `false`.
    ///
    /// When access cannot be determined this is an error, never `false`.
    pub async fn check_access(&self, file_hash: &str, principal: &str) -> VaultResult<bool> {
        let (file_hash, principal) = parse_pair(file_hash, principal)?;
        match self.gate.authorize(file_hash, principal).await {
            Decision::Allow => Ok(true),
            Decision::Deny(DenyReason::NoAccess | DenyReason::NotFound) => Ok(false),
            Decision::Deny(DenyReason::Unavailable) => Err(GateError::Unavailable(file_hash).into()),
        }
    }

    /// Every file `principal` can read, in ascending hash order.
    pub async fn list_accessible(&self, principal: &str) -> VaultResult<Vec<FileHash>> {
        let principal: Principal = principal.parse()?;
        let set = self.resolver.resolve(principal).await?;
        Ok(set.file_hashes.into_iter().collect())
    }

    /// Time-limited download URL, issued only after the gate allows it.
    pub async fn download_url(&self, file_hash: &str, principal: &str) -> VaultResult<PresignedUrl> {
        let (file_hash, principal) = parse_pair(file_hash, principal)?;
        self.gate
            .guard(file_hash, principal, move || async move {
                let metadata = self.live_metadata(&file_hash)?;
                Ok(self.objects.presign(&metadata.object_key, self.presign_ttl).await?)
            })
            .await
    }

    /// Fetch, verify and decrypt a file with the caller's key.
    pub async fn download(&self, file_hash: &str, principal: &str, key: &SymmetricKey) -> VaultResult<Vec<u8>> {
        let (file_hash, principal) = parse_pair(file_hash, principal)?;
        self.gate
            .guard(file_hash, principal, move || async move {
                let metadata = self.live_metadata(&file_hash)?;
                let ciphertext = self.objects.get(&metadata.object_key).await?;

                let actual = cipher::hash(&ciphertext);
                if actual != file_hash {
                    warn!(target: "audit", file_hash = %file_hash, actual = %actual, "Stored object failed integrity check");
                    return Err(VaultError::Integrity {
                        expected: file_hash,
                        actual,
                    });
                }
                Ok(cipher::decrypt(&ciphertext, key, &metadata.iv, &metadata.tag)?)
            })
            .await
    }

    /// Hide a file from listings and downloads. The ledger record stays.
    pub async fn delete_file(&self, file_hash: &str, requester: &str) -> VaultResult<FileMetadata> {
        let (file_hash, requester) = parse_pair(file_hash, requester)?;
        let metadata = self.metadata.mark_deleted(&file_hash, &requester)?;
        info!(target: "audit", file_hash = %file_hash, requester = %requester, "File deleted");
        Ok(metadata)
    }

    /// Files uploaded by `owner`, newest first.
    pub fn list_owned(&self, owner: &str, include_deleted: bool) -> VaultResult<Vec<FileMetadata>> {
        let owner: Principal = owner.parse()?;
        Ok(self.metadata.list_by_owner(&owner, include_deleted)?)
    }

    fn live_metadata(&self, file_hash: &FileHash) -> VaultResult<FileMetadata> {
        match self.metadata.get(file_hash)? {
            Some(metadata) if !metadata.is_deleted() => Ok(metadata),
            _ => Err(MetadataError::NotFound(*file_hash).into()),
        }
    }
}

fn parse_pair(file_hash: &str, principal: &str) -> VaultResult<(FileHash, Principal)> {
    Ok((file_hash.parse()?, principal.parse()?))
}
