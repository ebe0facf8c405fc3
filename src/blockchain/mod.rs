// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration for the on-chain access registry.
//!
//! This module provides functionality for:
//! - Registering file hashes and pointers
//! - Granting and revoking read access
//! - Querying membership and historical registry events

pub mod client;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod registry;
pub mod transport;
pub mod types;

pub use client::{EvmConnector, EvmTransport};
pub use error::{LedgerError, LedgerResult};
pub use ledger::LedgerClient;
pub use registry::AccessRegistry;
pub use transport::{Connector, LedgerTransport};
pub use types::*;
