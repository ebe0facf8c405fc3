// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service-level error type and its classification.

use serde::Serialize;

use crate::access::{GateError, ResolveError};
use crate::blockchain::{FileHash, LedgerError};
use crate::cipher::CipherError;
use crate::config::ConfigError;
use crate::storage::{MetadataError, StorageError};

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before any I/O.
    Validation,
    NotFound,
    /// Caller is not allowed to perform the operation.
    Authorization,
    /// Retries were exhausted.
    TransientInfrastructure,
    PermanentInfrastructure,
    /// Ciphertext failed authentication or hash verification.
    CryptoIntegrity,
    /// Access could not be determined. Never to be read as "denied".
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Stored ciphertext no longer hashes to its registered identifier.
    #[error("Integrity check failed for {expected}: stored object hashes to {actual}")]
    Integrity { expected: FileHash, actual: FileHash },
}

pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_) | VaultError::Config(_) => ErrorKind::Validation,
            VaultError::Ledger(e) => ledger_kind(e),
            VaultError::Cipher(CipherError::Authentication) => ErrorKind::CryptoIntegrity,
            VaultError::Cipher(CipherError::InvalidKey(_)) => ErrorKind::Validation,
            VaultError::Cipher(CipherError::Crypto(_)) => ErrorKind::PermanentInfrastructure,
            VaultError::Resolve(_) => ErrorKind::Unavailable,
            VaultError::Gate(GateError::NotFound(_)) => ErrorKind::NotFound,
            VaultError::Gate(GateError::Forbidden { .. }) => ErrorKind::Authorization,
            VaultError::Gate(GateError::Unavailable(_)) => ErrorKind::Unavailable,
            VaultError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            VaultError::Storage(StorageError::InvalidKey(_)) => ErrorKind::Validation,
            VaultError::Storage(StorageError::Backend(_)) => ErrorKind::PermanentInfrastructure,
            VaultError::Metadata(MetadataError::Duplicate(_)) => ErrorKind::Validation,
            VaultError::Metadata(MetadataError::NotFound(_)) => ErrorKind::NotFound,
            VaultError::Metadata(MetadataError::NotOwner { .. }) => ErrorKind::Authorization,
            VaultError::Metadata(_) => ErrorKind::PermanentInfrastructure,
            VaultError::Integrity { .. } => ErrorKind::CryptoIntegrity,
        }
    }
}

fn ledger_kind(error: &LedgerError) -> ErrorKind {
    match error {
        e if e.is_validation() => ErrorKind::Validation,
        LedgerError::DuplicateFile(_) => ErrorKind::Validation,
        LedgerError::NotFound(_) => ErrorKind::NotFound,
        LedgerError::NotOwner(_) | LedgerError::CannotRevokeOwner(_) | LedgerError::NoSigner => {
            ErrorKind::Authorization
        }
        e if e.is_transient() => ErrorKind::TransientInfrastructure,
        _ => ErrorKind::PermanentInfrastructure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Principal;

    #[test]
    fn ledger_errors_follow_taxonomy() {
        let h = FileHash::new([1; 32]);
        let cases = [
            (LedgerError::InvalidPrincipal("0x12".into()), ErrorKind::Validation),
            (LedgerError::InvalidPointer, ErrorKind::Validation),
            (LedgerError::NotFound(h), ErrorKind::NotFound),
            (LedgerError::NotOwner(h), ErrorKind::Authorization),
            (LedgerError::CannotRevokeOwner(h), ErrorKind::Authorization),
            (LedgerError::RateLimited("429".into()), ErrorKind::TransientInfrastructure),
            (LedgerError::Timeout("slow".into()), ErrorKind::TransientInfrastructure),
            (LedgerError::Decode("abi".into()), ErrorKind::PermanentInfrastructure),
            (LedgerError::Rpc("bad key".into()), ErrorKind::PermanentInfrastructure),
        ];
        for (error, kind) in cases {
            assert_eq!(VaultError::from(error.clone()).kind(), kind, "{error}");
        }
    }

    #[test]
    fn crypto_and_gate_errors() {
        let h = FileHash::new([1; 32]);
        assert_eq!(
            VaultError::from(CipherError::Authentication).kind(),
            ErrorKind::CryptoIntegrity
        );
        assert_eq!(
            VaultError::Integrity {
                expected: h,
                actual: FileHash::new([2; 32])
            }
            .kind(),
            ErrorKind::CryptoIntegrity
        );
        assert_eq!(
            VaultError::from(GateError::Forbidden {
                file_hash: h,
                principal: Principal::new([3; 20])
            })
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(VaultError::from(GateError::Unavailable(h)).kind(), ErrorKind::Unavailable);
        assert_eq!(
            VaultError::from(ResolveError::Unavailable(LedgerError::Timeout("t".into()))).kind(),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn transparent_messages() {
        let error = VaultError::from(LedgerError::NotOwner(FileHash::new([0; 32])));
        assert!(error.to_string().starts_with("Caller is not the owner of 0x"));
    }
}
