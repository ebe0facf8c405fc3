// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger identifiers, events and filters.
//!
//! Identities and file hashes cross the ledger boundary as hex strings.
//! Both are normalized to lowercase on parse so that comparisons and cache
//! keys never depend on the caller's casing.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// 256-bit content hash of an encrypted object. Primary identifier on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FileHash(B256);

impl FileHash {
    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    pub fn as_b256(&self) -> B256 {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    /// Lowercase hex without the `0x` prefix (object-store key form).
    pub fn to_hex(&self) -> String {
        alloy::hex::encode(self.0.as_slice())
    }
}

impl From<B256> for FileHash {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl FromStr for FileHash {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_fixed_hex::<32>(s)
            .ok_or_else(|| LedgerError::InvalidFileHash(s.to_string()))?;
        Ok(Self::new(bytes))
    }
}

impl TryFrom<String> for FileHash {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileHash> for String {
    fn from(value: FileHash) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// A ledger identity: 20-byte address, always rendered lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Principal(Address);

impl Principal {
    pub const ZERO: Principal = Principal(Address::ZERO);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(Address::new(bytes))
    }

    pub fn as_address(&self) -> Address {
        self.0
    }

    /// The null identity cannot be granted access.
    pub fn is_zero(&self) -> bool {
        self.0 == Address::ZERO
    }
}

impl From<Address> for Principal {
    fn from(value: Address) -> Self {
        Self(value)
    }
}

impl FromStr for Principal {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_fixed_hex::<20>(s)
            .ok_or_else(|| LedgerError::InvalidPrincipal(s.to_string()))?;
        Ok(Self::new(bytes))
    }
}

impl TryFrom<String> for Principal {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Address's own Display is EIP-55 checksummed; we always want lowercase.
        write!(f, "0x{}", alloy::hex::encode(self.0.as_slice()))
    }
}

/// Decode an optionally `0x`-prefixed hex string of exactly `N` bytes.
fn decode_fixed_hex<const N: usize>(raw: &str) -> Option<[u8; N]> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != N * 2 {
        return None;
    }
    let decoded = alloy::hex::decode(digits.to_ascii_lowercase()).ok()?;
    decoded.try_into().ok()
}

/// Registry event kinds that can be queried from history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileRegistered,
    AccessGranted,
    AccessRevoked,
}

/// What a registry event did to the access entry of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum EventAction {
    /// File registered; `principal` is the owner.
    Registered { pointer: String },
    Granted,
    Revoked,
}

/// A decoded registry event with its position in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub block_number: u64,
    pub log_index: u64,
    pub file_hash: FileHash,
    /// Owner for registrations, grantee/revokee otherwise.
    pub principal: Principal,
    pub action: EventAction,
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self.action {
            EventAction::Registered { .. } => EventKind::FileRegistered,
            EventAction::Granted => EventKind::AccessGranted,
            EventAction::Revoked => EventKind::AccessRevoked,
        }
    }

    /// Ledger ordering key.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Indexed-topic filter for event queries. `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub file_hash: Option<FileHash>,
    pub principal: Option<Principal>,
}

impl EventFilter {
    pub fn for_principal(principal: Principal) -> Self {
        Self {
            file_hash: None,
            principal: Some(principal),
        }
    }

    pub fn for_file(file_hash: FileHash) -> Self {
        Self {
            file_hash: Some(file_hash),
            principal: None,
        }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        self.file_hash.is_none_or(|h| h == event.file_hash)
            && self.principal.is_none_or(|p| p == event.principal)
    }
}

/// Result of a state-changing ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block number where the call was included
    pub block_number: Option<u64>,
}

/// On-ledger file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_hash: FileHash,
    pub owner: Principal,
    pub pointer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01";

    #[test]
    fn principal_normalizes_to_lowercase() {
        let p: Principal = MIXED.parse().unwrap();
        assert_eq!(p.to_string(), MIXED.to_lowercase());

        let without_prefix: Principal = MIXED.trim_start_matches("0x").parse().unwrap();
        assert_eq!(p, without_prefix);
    }

    #[test]
    fn principal_rejects_bad_length_and_digits() {
        assert!(matches!(
            "0x1234".parse::<Principal>(),
            Err(LedgerError::InvalidPrincipal(_))
        ));
        assert!(matches!(
            "0xzz23456789abcdef0123456789abcdef01234567".parse::<Principal>(),
            Err(LedgerError::InvalidPrincipal(_))
        ));
    }

    #[test]
    fn zero_principal_detected() {
        let zero: Principal = "0x0000000000000000000000000000000000000000".parse().unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero, Principal::ZERO);
    }

    #[test]
    fn file_hash_parses_and_displays() {
        let raw = format!("0x{}", "AB".repeat(32));
        let h: FileHash = raw.parse().unwrap();
        assert_eq!(h.to_string(), raw.to_lowercase());
        assert_eq!(h.to_hex().len(), 64);
        assert!("0xabcd".parse::<FileHash>().is_err());
    }

    #[test]
    fn serde_uses_normalized_strings() {
        let p: Principal = MIXED.parse().unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, format!("\"{}\"", MIXED.to_lowercase()));
        let back: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn filter_matches_on_present_fields_only() {
        let owner = Principal::new([1; 20]);
        let other = Principal::new([2; 20]);
        let event = LedgerEvent {
            block_number: 1,
            log_index: 0,
            file_hash: FileHash::new([9; 32]),
            principal: owner,
            action: EventAction::Granted,
        };
        assert!(EventFilter::default().matches(&event));
        assert!(EventFilter::for_principal(owner).matches(&event));
        assert!(!EventFilter::for_principal(other).matches(&event));
        assert!(EventFilter::for_file(FileHash::new([9; 32])).matches(&event));
        assert!(!EventFilter::for_file(FileHash::new([8; 32])).matches(&event));
        assert_eq!(event.kind(), EventKind::AccessGranted);
    }
}
