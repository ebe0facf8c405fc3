// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Object-store boundary.
//!
//! Only ciphertext crosses this boundary. Objects are keyed by the
//! lowercase hex of their content hash.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object store failure: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Time-limited download locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return the locator to register on the ledger.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Time-limited URL for fetching `key` directly.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<PresignedUrl>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains('/') || key.chars().any(char::is_whitespace) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// Process-local object store (for testing and local runs).
pub struct InMemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn locator(&self, key: &str) -> String {
        format!("mem://{}/{key}", self.bucket)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|o| o.content_type.clone())
    }

    /// Overwrite stored bytes in place (simulates tampering at rest).
    pub fn corrupt(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) {
        if let Some(object) = self.lock().get_mut(key) {
            f(&mut object.bytes);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("vault")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.lock().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(self.locator(key))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<PresignedUrl> {
        validate_key(key)?;
        if !self.lock().contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::Backend(e.to_string()))?;
        let expires_at = Utc::now() + ttl;
        Ok(PresignedUrl {
            url: format!("{}?expires={}", self.locator(key), expires_at.timestamp()),
            expires_at,
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        self.lock()
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_presign() {
        let store = InMemoryObjectStore::new("files");
        let locator = store.put("abcd", vec![1, 2, 3], "application/pdf").await.unwrap();

        assert_eq!(locator, "mem://files/abcd");
        assert_eq!(store.get("abcd").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.content_type("abcd").as_deref(), Some("application/pdf"));

        let url = store.presign("abcd", Duration::from_secs(900)).await.unwrap();
        assert!(url.url.starts_with("mem://files/abcd?expires="));
        assert!(url.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn missing_object_not_found() {
        let store = InMemoryObjectStore::default();
        assert!(matches!(store.get("nope").await, Err(StorageError::NotFound(_))));
        assert!(matches!(
            store.presign("nope", Duration::from_secs(1)).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_keys_rejected() {
        let store = InMemoryObjectStore::default();
        for key in ["", "a/b", "has space"] {
            assert!(matches!(store.put(key, vec![], "x").await, Err(StorageError::InvalidKey(_))));
        }
        assert!(store.is_empty());
    }
}
