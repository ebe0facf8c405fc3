// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-file authorization at the object-store boundary.
//!
//! The gate fails closed: a principal is only allowed through when the
//! ledger positively says so. Anything it cannot establish is a deny.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::resolver::AccessResolver;
use crate::blockchain::{FileHash, LedgerClient, LedgerError, Principal};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The file hash is not registered.
    NotFound,
    /// The principal is neither owner nor grantee.
    NoAccess,
    /// Access could not be determined.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Denial surfaced by [`AccessGate::guard`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("File not found: {0}")]
    NotFound(FileHash),

    #[error("Principal {principal} has no access to {file_hash}")]
    Forbidden {
        file_hash: FileHash,
        principal: Principal,
    },

    #[error("Access to {0} could not be determined")]
    Unavailable(FileHash),
}

impl GateError {
    fn from_denial(reason: DenyReason, file_hash: FileHash, principal: Principal) -> Self {
        match reason {
            DenyReason::NotFound => GateError::NotFound(file_hash),
            DenyReason::NoAccess => GateError::Forbidden {
                file_hash,
                principal,
            },
            DenyReason::Unavailable => GateError::Unavailable(file_hash),
        }
    }
}

/// Allow/deny decisions for single files.
#[derive(Clone)]
pub struct AccessGate {
    ledger: LedgerClient,
    resolver: Arc<AccessResolver>,
}

impl AccessGate {
    pub fn new(ledger: LedgerClient, resolver: Arc<AccessResolver>) -> Self {
        Self { ledger, resolver }
    }

    /// Decide whether `principal` may read `file_hash`.
    ///
    /// Ownership is checked against the registry directly; grants come
    /// from the principal's resolved access set.
    pub async fn authorize(&self, file_hash: FileHash, principal: Principal) -> Decision {
        let decision = self.decide(file_hash, principal).await;
        match decision {
            Decision::Allow => {
                info!(target: "audit", file_hash = %file_hash, principal = %principal, "Access allowed");
            }
            Decision::Deny(reason) => {
                info!(target: "audit", file_hash = %file_hash, principal = %principal, ?reason, "Access denied");
            }
        }
        decision
    }

    async fn decide(&self, file_hash: FileHash, principal: Principal) -> Decision {
        match self.ledger.get_owner(file_hash).await {
            Ok(owner) if owner == principal => return Decision::Allow,
            Ok(_) => {}
            Err(LedgerError::NotFound(_)) => return Decision::Deny(DenyReason::NotFound),
            Err(e) => {
                // The resolved set can still prove a grant.
                warn!(file_hash = %file_hash, error = %e, "Owner lookup failed, falling back to resolved set");
            }
        }

        match self.resolver.resolve(principal).await {
            Ok(set) if set.contains(&file_hash) => Decision::Allow,
            Ok(_) => Decision::Deny(DenyReason::NoAccess),
            Err(e) => {
                warn!(file_hash = %file_hash, principal = %principal, error = %e, "Access resolution failed");
                Decision::Deny(DenyReason::Unavailable)
            }
        }
    }

    /// Run `on_allow` only once `principal` is allowed to read `file_hash`.
    ///
    /// Nothing in `on_allow` is evaluated on deny, so keys and pointers it
    /// releases never leave the gate for an unauthorized caller.
    pub async fn guard<T, E, F, Fut>(&self, file_hash: FileHash, principal: Principal, on_allow: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<GateError>,
    {
        match self.authorize(file_hash, principal).await {
            Decision::Allow => on_allow().await,
            Decision::Deny(reason) => Err(GateError::from_denial(reason, file_hash, principal).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessCache, ResolverConfig};
    use crate::blockchain::memory::MemoryLedger;
    use crate::rpc::{RetryPolicy, RpcPool};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const OWNER: Principal = Principal::new([0x11; 20]);
    const ALICE: Principal = Principal::new([0xaa; 20]);
    const BOB: Principal = Principal::new([0xbb; 20]);

    fn h(n: u8) -> FileHash {
        FileHash::new([n; 32])
    }

    fn gate(ledger: &MemoryLedger) -> AccessGate {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let pool = RpcPool::new(
            vec!["rpc-a".to_string(), "rpc-b".to_string()],
            Arc::new(ledger.connector(OWNER)),
            policy,
        )
        .unwrap();
        let client = LedgerClient::new(Arc::new(pool));
        let resolver = AccessResolver::new(client.clone(), AccessCache::default(), ResolverConfig::default());
        AccessGate::new(client, Arc::new(resolver))
    }

    fn seed(ledger: &MemoryLedger) {
        ledger.with_registry(|r| {
            r.register_file(OWNER, h(1), "mem://vault/1").unwrap();
            r.grant(OWNER, h(1), ALICE).unwrap();
        });
    }

    #[tokio::test]
    async fn owner_and_grantee_allowed() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let gate = gate(&ledger);

        assert_eq!(gate.authorize(h(1), OWNER).await, Decision::Allow);
        assert_eq!(gate.authorize(h(1), ALICE).await, Decision::Allow);
    }

    #[tokio::test]
    async fn stranger_denied() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let gate = gate(&ledger);

        assert_eq!(gate.authorize(h(1), BOB).await, Decision::Deny(DenyReason::NoAccess));
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let gate = gate(&ledger);

        assert_eq!(gate.authorize(h(9), ALICE).await, Decision::Deny(DenyReason::NotFound));
    }

    #[tokio::test]
    async fn outage_fails_closed() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let gate = gate(&ledger);
        ledger.fail_endpoint("rpc-a", LedgerError::Timeout("down".into()));
        ledger.fail_endpoint("rpc-b", LedgerError::Timeout("down".into()));

        assert_eq!(gate.authorize(h(1), OWNER).await, Decision::Deny(DenyReason::Unavailable));
        assert_eq!(gate.authorize(h(1), ALICE).await, Decision::Deny(DenyReason::Unavailable));
    }

    #[tokio::test]
    async fn guard_skips_release_on_deny() {
        let ledger = MemoryLedger::new();
        seed(&ledger);
        let gate = gate(&ledger);
        let released = AtomicBool::new(false);

        let result: Result<&str, GateError> = gate
            .guard(h(1), BOB, || async {
                released.store(true, Ordering::SeqCst);
                Ok("mem://vault/1")
            })
            .await;

        assert_eq!(
            result,
            Err(GateError::Forbidden {
                file_hash: h(1),
                principal: BOB
            })
        );
        assert!(!released.load(Ordering::SeqCst));

        let pointer: Result<&str, GateError> = gate.guard(h(1), ALICE, || async { Ok("mem://vault/1") }).await;
        assert_eq!(pointer, Ok("mem://vault/1"));
    }
}
