// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger error type and RPC failure classification.

use super::types::FileHash;

/// Errors produced by ledger calls.
///
/// Variants fall into three groups: input validation (raised before any
/// I/O), registry-level rejections (decoded from the contract), and
/// infrastructure failures. Only the infrastructure group carries a
/// transient subset that the RPC pool retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid file hash: {0}")]
    InvalidFileHash(String),

    #[error("Invalid principal: {0}")]
    InvalidPrincipal(String),

    #[error("Invalid pointer: pointer must not be empty")]
    InvalidPointer,

    #[error("File already registered: {0}")]
    DuplicateFile(FileHash),

    #[error("File not found: {0}")]
    NotFound(FileHash),

    #[error("Caller is not the owner of {0}")]
    NotOwner(FileHash),

    #[error("The owner of {0} cannot be revoked")]
    CannotRevokeOwner(FileHash),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Block range too large: {0}")]
    RangeTooLarge(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Undecodable registry data: {0}")]
    Decode(String),

    #[error("Invalid RPC endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("No signer configured for state-changing calls")]
    NoSigner,

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Whether retrying against another endpoint can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::RateLimited(_)
                | LedgerError::RangeTooLarge(_)
                | LedgerError::Timeout(_)
                | LedgerError::MalformedResponse(_)
        )
    }

    /// Malformed identity, hash or pointer.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidFileHash(_)
                | LedgerError::InvalidPrincipal(_)
                | LedgerError::InvalidPointer
        )
    }

    /// Classify a transport-level error message.
    ///
    /// Providers don't agree on error codes for rate limits or range
    /// ceilings, so this matches on the phrases the common public
    /// endpoints return.
    pub fn from_rpc_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if is_status_429(&lower)
            || lower.contains("rate limit")
            || lower.contains("rate-limit")
            || lower.contains("too many requests")
            || lower.contains("request limit")
        {
            LedgerError::RateLimited(message)
        } else if lower.contains("block range")
            || lower.contains("range too large")
            || lower.contains("range is too large")
            || lower.contains("query returned more than")
            || lower.contains("too many blocks")
            || lower.contains("response size exceeded")
        {
            LedgerError::RangeTooLarge(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            LedgerError::Timeout(message)
        } else if lower.contains("deserializ")
            || lower.contains("invalid response")
            || lower.contains("unexpected end")
            || lower.contains("expected value")
            || lower.contains("bad gateway")
            || lower.contains("service unavailable")
        {
            LedgerError::MalformedResponse(message)
        } else {
            LedgerError::Rpc(message)
        }
    }
}

/// HTTP 429 as transports report it. A bare "429" is not enough: revert
/// data and hashes quoted in node errors contain it too.
fn is_status_429(lower: &str) -> bool {
    const FORMS: [&str; 5] = ["http error 429", "status code 429", "status: 429", "status 429", "429 too many"];
    FORMS.iter().any(|form| lower.contains(form)) || lower.trim() == "429"
}
