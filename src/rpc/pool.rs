// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Endpoint pool with rotation and retry-with-backoff.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use super::{classify, ErrorClass, RetryPolicy};
use crate::blockchain::{Connector, LedgerError, LedgerResult, LedgerTransport, Principal};

struct PoolState {
    index: usize,
    transport: Arc<dyn LedgerTransport>,
}

/// Ordered candidate endpoints plus the one currently in use.
///
/// The rotation pointer is the only mutable state and sits behind a mutex
/// that is never held across an await.
pub struct RpcPool {
    endpoints: Vec<String>,
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    state: Mutex<PoolState>,
    rotations: AtomicU64,
}

impl RpcPool {
    /// Create a pool bound to the first endpoint.
    pub fn new(
        endpoints: Vec<String>,
        connector: Arc<dyn Connector>,
        policy: RetryPolicy,
    ) -> LedgerResult<Self> {
        let first = endpoints
            .first()
            .ok_or_else(|| LedgerError::InvalidEndpoint("no RPC endpoints configured".to_string()))?;
        let transport = connector.connect(first)?;

        Ok(Self {
            endpoints,
            connector,
            policy,
            state: Mutex::new(PoolState {
                index: 0,
                transport,
            }),
            rotations: AtomicU64::new(0),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Identity the pool's transports sign as.
    pub fn signer(&self) -> Option<Principal> {
        self.connector.signer()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Index of the current endpoint.
    pub fn current_index(&self) -> usize {
        self.lock().index
    }

    /// Current endpoint index and its transport.
    pub fn current(&self) -> (usize, Arc<dyn LedgerTransport>) {
        let state = self.lock();
        (state.index, Arc::clone(&state.transport))
    }

    /// Total rotations since creation.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::SeqCst)
    }

    /// Advance to the next endpoint (modulo the list) and rebind the transport.
    pub fn rotate(&self) -> usize {
        let mut state = self.lock();
        self.advance(&mut state)
    }

    /// Rotate only if the pool still points at `observed`. Concurrent
    /// callers failing on the same endpoint then cause a single rotation.
    fn rotate_from(&self, observed: usize) -> usize {
        let mut state = self.lock();
        if state.index != observed {
            return state.index;
        }
        self.advance(&mut state)
    }

    fn advance(&self, state: &mut PoolState) -> usize {
        let next = (state.index + 1) % self.endpoints.len();
        match self.connector.connect(&self.endpoints[next]) {
            Ok(transport) => {
                state.transport = transport;
            }
            Err(e) => {
                // Keep the old transport; the endpoint pointer still moves so
                // the next rotation tries the one after.
                warn!(endpoint = %self.endpoints[next], error = %e, "Failed to bind RPC endpoint");
            }
        }
        state.index = next;
        self.rotations.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %self.endpoints[next], "Rotated RPC endpoint");
        next
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `call` against the current endpoint with the read timeout,
    /// retrying transient failures on the next endpoint.
    pub async fn with_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> LedgerResult<T>
    where
        F: FnMut(Arc<dyn LedgerTransport>) -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        self.with_retry_timeout(operation, self.policy.call_timeout, call)
            .await
    }

    /// Same as [`RpcPool::with_retry`] with an explicit per-attempt timeout.
    pub async fn with_retry_timeout<T, F, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        mut call: F,
    ) -> LedgerResult<T>
    where
        F: FnMut(Arc<dyn LedgerTransport>) -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let (index, transport) = self.current();
            let endpoint = transport.endpoint().to_string();

            let outcome = match tokio::time::timeout(timeout, call(transport)).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout(format!(
                    "{operation} exceeded {}ms on {endpoint}",
                    timeout.as_millis()
                ))),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if classify(&error) == ErrorClass::Permanent {
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(
                    operation,
                    endpoint = %endpoint,
                    attempts = attempt,
                    error = %error,
                    "RPC retries exhausted"
                );
                return Err(error);
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                operation,
                endpoint = %endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient RPC failure, rotating endpoint"
            );
            self.rotate_from(index);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
