// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM file encryption and content hashing.
//!
//! Encryption: AES-256-GCM, random 96-bit nonce per call, detached 128-bit tag.
//! Content hash: SHA-256 over the **ciphertext**, so the ledger identifier
//! reveals nothing about the plaintext.
//!
//! The symmetric key is handed back to the caller and never persisted here.

use std::fmt;

use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::blockchain::FileHash;

/// Key length in bytes (256-bit).
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes (96-bit).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128-bit).
pub const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Cryptographic primitive failed: {0}")]
    Crypto(String),

    /// Tag mismatch: tampered ciphertext, wrong key or wrong nonce.
    #[error("Authentication failed: ciphertext or tag does not verify")]
    Authentication,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// A 256-bit symmetric file key. `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Parse a hex-encoded key (optional `0x` prefix).
    pub fn from_hex(raw: &str) -> Result<Self, CipherError> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = alloy::hex::decode(digits).map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CipherError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", b.len())))?;
        Ok(Self(bytes))
    }

    /// Hex encoding for handing the key back to its owner.
    pub fn to_hex(&self) -> String {
        alloy::hex::encode(self.0)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Ciphertext plus the parameters needed to decrypt it. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedObject {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
    /// SHA-256 of `ciphertext`
    pub content_hash: FileHash,
}

impl EncryptedObject {
    pub fn decrypt(&self, key: &SymmetricKey) -> Result<Vec<u8>, CipherError> {
        decrypt(&self.ciphertext, key, &self.iv, &self.auth_tag)
    }
}

/// Generate a fresh key from the OS CSPRNG.
pub fn generate_key() -> SymmetricKey {
    let key = Aes256Gcm::generate_key(OsRng);
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(key.as_slice());
    SymmetricKey(bytes)
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<EncryptedObject, CipherError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|e| CipherError::Crypto(e.to_string()))?;

    let mut iv = [0u8; NONCE_LEN];
    iv.copy_from_slice(nonce.as_slice());
    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(tag.as_slice());

    let content_hash = hash(&buffer);
    Ok(EncryptedObject {
        ciphertext: buffer,
        iv,
        auth_tag,
        content_hash,
    })
}

/// Decrypt and verify. No plaintext is returned unless the tag verifies.
pub fn decrypt(
    ciphertext: &[u8],
    key: &SymmetricKey,
    iv: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
) -> Result<Vec<u8>, CipherError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));

    let mut buffer = ciphertext.to_vec();
    match cipher.decrypt_in_place_detached(
        Nonce::from_slice(iv),
        b"",
        &mut buffer,
        Tag::from_slice(tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.fill(0);
            Err(CipherError::Authentication)
        }
    }
}

/// SHA-256 content hash.
pub fn hash(bytes: &[u8]) -> FileHash {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    FileHash::new(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_encrypt_decrypt() {
        let key = generate_key();
        let data = b"quarterly report, do not forward";

        let object = encrypt(data, &key).unwrap();
        assert_eq!(object.ciphertext.len(), data.len());
        assert_ne!(object.ciphertext.as_slice(), data.as_slice());

        assert_eq!(object.decrypt(&key).unwrap(), data);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = generate_key();
        let object = encrypt(b"", &key).unwrap();
        assert!(object.decrypt(&key).unwrap().is_empty());
    }

    #[test]
    fn flipped_tag_bit_fails_authentication() {
        let key = generate_key();
        let object = encrypt(b"payload", &key).unwrap();

        for bit in 0..TAG_LEN * 8 {
            let mut tag = object.auth_tag;
            tag[bit / 8] ^= 1 << (bit % 8);
            let result = decrypt(&object.ciphertext, &key, &object.iv, &tag);
            assert!(matches!(result, Err(CipherError::Authentication)));
        }
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = generate_key();
        let mut object = encrypt(b"payload", &key).unwrap();
        object.ciphertext[0] ^= 0x01;
        assert!(matches!(object.decrypt(&key), Err(CipherError::Authentication)));
    }

    #[test]
    fn wrong_key_or_nonce_fails() {
        let key = generate_key();
        let object = encrypt(b"payload", &key).unwrap();

        assert!(matches!(object.decrypt(&generate_key()), Err(CipherError::Authentication)));

        let mut iv = object.iv;
        iv[0] ^= 0xff;
        let result = decrypt(&object.ciphertext, &key, &iv, &object.auth_tag);
        assert!(matches!(result, Err(CipherError::Authentication)));
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = generate_key();
        let a = encrypt(b"same bytes", &key).unwrap();
        let b = encrypt(b"same bytes", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn content_hash_covers_ciphertext() {
        let key = generate_key();
        let object = encrypt(b"secret", &key).unwrap();
        assert_eq!(object.content_hash, hash(&object.ciphertext));
        assert_ne!(object.content_hash, hash(b"secret"));
    }

    #[test]
    fn hash_is_deterministic_sha256() {
        // SHA-256("abc")
        assert_eq!(
            hash(b"abc").to_string(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash(b"abc"), hash(b"abc"));
    }

    #[test]
    fn key_hex_roundtrip_and_redaction() {
        let key = generate_key();
        let parsed = SymmetricKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(format!("{key:?}"), "SymmetricKey(<redacted>)");
        assert!(matches!(SymmetricKey::from_hex("abcd"), Err(CipherError::InvalidKey(_))));
    }

    proptest! {
        #[test]
        fn any_plaintext_roundtrips_under_any_key(
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
            key in any::<[u8; KEY_LEN]>(),
        ) {
            let key = SymmetricKey::from_bytes(key);
            let object = encrypt(&plaintext, &key).unwrap();
            prop_assert_eq!(object.content_hash, hash(&object.ciphertext));
            prop_assert_eq!(object.decrypt(&key).unwrap(), plaintext);
        }

        #[test]
        fn any_flipped_tag_bit_is_rejected(
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
            bit in 0..TAG_LEN * 8,
        ) {
            let key = generate_key();
            let object = encrypt(&plaintext, &key).unwrap();
            let mut tag = object.auth_tag;
            tag[bit / 8] ^= 1 << (bit % 8);

            let result = decrypt(&object.ciphertext, &key, &object.iv, &tag);
            prop_assert!(matches!(result, Err(CipherError::Authentication)));
        }
    }
}
