// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # RPC Resilience Layer
//!
//! Public RPC endpoints rate-limit per IP and cap the block range of a
//! single `eth_getLogs` call, so every ledger call goes through an
//! [`RpcPool`] that retries transient failures on the next endpoint.
//!
//! ## Retry state machine
//!
//! ```text
//! attempt = 1
//! loop:
//!   call(current endpoint) under timeout
//!   Ok                              -> return
//!   Err, classify = Permanent       -> return Err unchanged
//!   Err, attempt == max_attempts    -> return Err unchanged
//!   Err, classify = Transient       -> rotate, sleep(backoff(attempt)), attempt += 1
//! ```

pub mod pool;

use std::time::Duration;

use crate::blockchain::LedgerError;

pub use pool::RpcPool;

/// Default number of attempts per call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on a single backoff sleep.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default timeout for a single read call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for a state-changing call (includes waiting for the receipt).
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(120);

/// Whether a failure is worth retrying on another endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Classify a ledger error for the retry loop.
pub fn classify(error: &LedgerError) -> ErrorClass {
    if error.is_transient() {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Retry and timeout parameters for an [`RpcPool`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub call_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
