// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`VaultConfig`] loaded from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RPC_ENDPOINTS` | Comma-separated ordered RPC URLs | Required |
//! | `REGISTRY_ADDRESS` | Access registry contract address | Required |
//! | `REGISTRY_DEPLOY_BLOCK` | Lowest block ever scanned | `0` |
//! | `SIGNER_PRIVATE_KEY` | Hex key for state-changing calls | Optional (read-only) |
//! | `DATA_DIR` | Directory of the metadata database | `/data` |
//! | `SCAN_WINDOW_BLOCKS` | Blocks behind the tip scanned on resolution | `50000` |
//! | `SCAN_CHUNK_BLOCKS` | Blocks per `eth_getLogs` call | `2000` |
//! | `SCAN_MAX_IN_FLIGHT` | Concurrent chunk scans | `4` |
//! | `ACCESS_CACHE_TTL_SECS` | Resolved set lifetime | `300` |
//! | `ACCESS_CACHE_CAPACITY` | Principals kept in the cache | `10000` |
//! | `RESOLVE_MODE` | `strict` or `eventual` | `eventual` |
//! | `RPC_MAX_ATTEMPTS` | Attempts per RPC call | `5` |
//! | `RPC_BASE_DELAY_MS` | First retry backoff | `1000` |
//! | `RPC_CALL_TIMEOUT_MS` | Per-attempt read timeout | `15000` |
//! | `PRESIGN_TTL_SECS` | Download URL lifetime | `900` |
//! | `WATCHER_POLL_SECS` | Access watcher interval | `15` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::access::{Consistency, ResolverConfig};
use crate::rpc::RetryPolicy;

pub const RPC_ENDPOINTS_ENV: &str = "RPC_ENDPOINTS";
pub const REGISTRY_ADDRESS_ENV: &str = "REGISTRY_ADDRESS";
pub const REGISTRY_DEPLOY_BLOCK_ENV: &str = "REGISTRY_DEPLOY_BLOCK";

/// Never logged. Without it the service can only read the ledger.
pub const SIGNER_PRIVATE_KEY_ENV: &str = "SIGNER_PRIVATE_KEY";

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const SCAN_WINDOW_BLOCKS_ENV: &str = "SCAN_WINDOW_BLOCKS";
pub const SCAN_CHUNK_BLOCKS_ENV: &str = "SCAN_CHUNK_BLOCKS";
pub const SCAN_MAX_IN_FLIGHT_ENV: &str = "SCAN_MAX_IN_FLIGHT";
pub const ACCESS_CACHE_TTL_SECS_ENV: &str = "ACCESS_CACHE_TTL_SECS";
pub const ACCESS_CACHE_CAPACITY_ENV: &str = "ACCESS_CACHE_CAPACITY";
pub const RESOLVE_MODE_ENV: &str = "RESOLVE_MODE";
pub const RPC_MAX_ATTEMPTS_ENV: &str = "RPC_MAX_ATTEMPTS";
pub const RPC_BASE_DELAY_MS_ENV: &str = "RPC_BASE_DELAY_MS";
pub const RPC_CALL_TIMEOUT_MS_ENV: &str = "RPC_CALL_TIMEOUT_MS";
pub const PRESIGN_TTL_SECS_ENV: &str = "PRESIGN_TTL_SECS";
pub const WATCHER_POLL_SECS_ENV: &str = "WATCHER_POLL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// # Default
/// `/data`
pub const DEFAULT_DATA_DIR: &str = "/data";

pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(15 * 60);

/// Name of the redb file inside `DATA_DIR`.
pub const METADATA_DB_FILE: &str = "vault.redb";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Everything the daemon needs to start.
#[derive(Clone)]
pub struct VaultConfig {
    pub rpc_endpoints: Vec<String>,
    pub registry_address: Address,
    pub signer_private_key: Option<String>,
    pub data_dir: PathBuf,
    pub resolver: ResolverConfig,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub retry: RetryPolicy,
    pub presign_ttl: Duration,
    pub watcher_poll_interval: Duration,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("rpc_endpoints", &self.rpc_endpoints)
            .field("registry_address", &self.registry_address)
            .field("signer", &self.signer_private_key.as_ref().map(|_| "<redacted>"))
            .field("data_dir", &self.data_dir)
            .field("resolver", &self.resolver)
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .field("retry", &self.retry)
            .field("presign_ttl", &self.presign_ttl)
            .field("watcher_poll_interval", &self.watcher_poll_interval)
            .finish()
    }
}

impl VaultConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_endpoints: Vec<String> = get(RPC_ENDPOINTS_ENV)
            .ok_or(ConfigError::Missing(RPC_ENDPOINTS_ENV))?
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if rpc_endpoints.is_empty() {
            return Err(ConfigError::Invalid {
                var: RPC_ENDPOINTS_ENV,
                reason: "no endpoints listed".to_string(),
            });
        }
        for endpoint in &rpc_endpoints {
            url::Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
                var: RPC_ENDPOINTS_ENV,
                reason: format!("`{endpoint}`: {e}"),
            })?;
        }

        let registry_address = get(REGISTRY_ADDRESS_ENV)
            .ok_or(ConfigError::Missing(REGISTRY_ADDRESS_ENV))?
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid {
                var: REGISTRY_ADDRESS_ENV,
                reason: e.to_string(),
            })?;

        let defaults = ResolverConfig::default();
        let resolver = ResolverConfig {
            window_blocks: parse_or(&get, SCAN_WINDOW_BLOCKS_ENV, defaults.window_blocks)?,
            chunk_size: positive(SCAN_CHUNK_BLOCKS_ENV, parse_or(&get, SCAN_CHUNK_BLOCKS_ENV, defaults.chunk_size)?)?,
            max_in_flight: positive(
                SCAN_MAX_IN_FLIGHT_ENV,
                parse_or(&get, SCAN_MAX_IN_FLIGHT_ENV, defaults.max_in_flight)?,
            )?,
            floor_block: parse_or(&get, REGISTRY_DEPLOY_BLOCK_ENV, 0)?,
            consistency: parse_or(&get, RESOLVE_MODE_ENV, Consistency::Eventual)?,
        };

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: positive(
                RPC_MAX_ATTEMPTS_ENV,
                parse_or(&get, RPC_MAX_ATTEMPTS_ENV, default_retry.max_attempts)?,
            )?,
            base_delay: Duration::from_millis(parse_or(
                &get,
                RPC_BASE_DELAY_MS_ENV,
                default_retry.base_delay.as_millis() as u64,
            )?),
            call_timeout: Duration::from_millis(positive(
                RPC_CALL_TIMEOUT_MS_ENV,
                parse_or(&get, RPC_CALL_TIMEOUT_MS_ENV, default_retry.call_timeout.as_millis() as u64)?,
            )?),
            ..default_retry
        };

        Ok(Self {
            rpc_endpoints,
            registry_address,
            signer_private_key: get(SIGNER_PRIVATE_KEY_ENV),
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            resolver,
            cache_ttl: Duration::from_secs(parse_or(
                &get,
                ACCESS_CACHE_TTL_SECS_ENV,
                crate::access::cache::DEFAULT_TTL.as_secs(),
            )?),
            cache_capacity: positive(
                ACCESS_CACHE_CAPACITY_ENV,
                parse_or(&get, ACCESS_CACHE_CAPACITY_ENV, crate::access::cache::DEFAULT_CAPACITY)?,
            )?,
            retry,
            presign_ttl: Duration::from_secs(parse_or(&get, PRESIGN_TTL_SECS_ENV, DEFAULT_PRESIGN_TTL.as_secs())?),
            watcher_poll_interval: Duration::from_secs(positive(
                WATCHER_POLL_SECS_ENV,
                parse_or(&get, WATCHER_POLL_SECS_ENV, crate::indexer::DEFAULT_POLL_INTERVAL.as_secs())?,
            )?),
        })
    }

    /// Path of the metadata database.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_DB_FILE)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn positive<T: PartialOrd + Default>(var: &'static str, value: T) -> Result<T, ConfigError> {
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
