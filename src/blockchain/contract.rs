// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access registry contract interface.

use alloy::sol;

use super::error::LedgerError;
use super::types::{FileHash, Principal};

// Define the registry interface using alloy's sol! macro
sol! {
    #[sol(rpc)]
    interface IAccessRegistry {
        event FileRegistered(bytes32 indexed fileHash, address indexed owner, string pointer);
        event AccessGranted(bytes32 indexed fileHash, address indexed user);
        event AccessRevoked(bytes32 indexed fileHash, address indexed user);

        error DuplicateFile(bytes32 fileHash);
        error InvalidPointer();
        error FileNotFound(bytes32 fileHash);
        error NotOwner(bytes32 fileHash, address caller);
        error InvalidPrincipal(address user);
        error CannotRevokeOwner(bytes32 fileHash);

        function registerFile(bytes32 fileHash, string calldata pointer) external;
        function grantAccess(bytes32 fileHash, address user) external;
        function revokeAccess(bytes32 fileHash, address user) external;
        function hasAccess(bytes32 fileHash, address user) external view returns (bool);
        function getPointer(bytes32 fileHash) external view returns (string memory);
        function getOwner(bytes32 fileHash) external view returns (address);
    }
}

/// Map a decoded registry revert onto the ledger error taxonomy.
pub fn revert_to_error(err: IAccessRegistry::IAccessRegistryErrors) -> LedgerError {
    use IAccessRegistry::IAccessRegistryErrors as E;

    match err {
        E::DuplicateFile(e) => LedgerError::DuplicateFile(FileHash::from(e.fileHash)),
        E::InvalidPointer(_) => LedgerError::InvalidPointer,
        E::FileNotFound(e) => LedgerError::NotFound(FileHash::from(e.fileHash)),
        E::NotOwner(e) => LedgerError::NotOwner(FileHash::from(e.fileHash)),
        E::InvalidPrincipal(e) => {
            LedgerError::InvalidPrincipal(Principal::from(e.user).to_string())
        }
        E::CannotRevokeOwner(e) => LedgerError::CannotRevokeOwner(FileHash::from(e.fileHash)),
    }
}
