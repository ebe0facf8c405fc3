// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM transport for the access registry, bound to one RPC endpoint.

use std::str::FromStr;
use std::sync::Arc;

use alloy::{
    network::{Ethereum, EthereumWallet},
    primitives::Address,
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::{Filter, Log},
    signers::local::PrivateKeySigner,
    sol_types::SolEvent,
};
use async_trait::async_trait;

use super::contract::{revert_to_error, IAccessRegistry};
use super::error::{LedgerError, LedgerResult};
use super::transport::{Connector, LedgerTransport};
use super::types::{EventAction, EventFilter, EventKind, FileHash, LedgerEvent, LedgerReceipt, Principal};

/// Registry client over an alloy HTTP provider.
pub struct EvmTransport {
    /// RPC endpoint URL
    endpoint: String,
    /// Registry contract address
    registry: Address,
    /// Type-erased provider, with a wallet filler when signing is enabled
    provider: DynProvider<Ethereum>,
    can_sign: bool,
}

impl EvmTransport {
    /// Create a transport for `endpoint`. No network I/O happens here.
    pub fn new(
        endpoint: &str,
        registry: Address,
        wallet: Option<EthereumWallet>,
    ) -> LedgerResult<Self> {
        let url: url::Url = endpoint
            .parse()
            .map_err(|e: url::ParseError| LedgerError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

        let can_sign = wallet.is_some();
        let provider = match wallet {
            Some(wallet) => ProviderBuilder::new().wallet(wallet).connect_http(url).erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        Ok(Self {
            endpoint: endpoint.to_string(),
            registry,
            provider,
            can_sign,
        })
    }

    fn contract(&self) -> IAccessRegistry::IAccessRegistryInstance<DynProvider<Ethereum>> {
        IAccessRegistry::new(self.registry, self.provider.clone())
    }

    fn ensure_signer(&self) -> LedgerResult<()> {
        if self.can_sign {
            Ok(())
        } else {
            Err(LedgerError::NoSigner)
        }
    }
}

#[async_trait]
impl LedgerTransport for EvmTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn block_number(&self) -> LedgerResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::from_rpc_message(e.to_string()))
    }

    async fn register_file(&self, file_hash: FileHash, pointer: &str) -> LedgerResult<LedgerReceipt> {
        self.ensure_signer()?;
        let pending = self
            .contract()
            .registerFile(file_hash.as_b256(), pointer.to_string())
            .send()
            .await
            .map_err(contract_error)?;
        confirm(pending).await
    }

    async fn grant(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt> {
        self.ensure_signer()?;
        let pending = self
            .contract()
            .grantAccess(file_hash.as_b256(), principal.as_address())
            .send()
            .await
            .map_err(contract_error)?;
        confirm(pending).await
    }

    async fn revoke(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<LedgerReceipt> {
        self.ensure_signer()?;
        let pending = self
            .contract()
            .revokeAccess(file_hash.as_b256(), principal.as_address())
            .send()
            .await
            .map_err(contract_error)?;
        confirm(pending).await
    }

    async fn has_access(&self, file_hash: FileHash, principal: Principal) -> LedgerResult<bool> {
        self.contract()
            .hasAccess(file_hash.as_b256(), principal.as_address())
            .call()
            .await
            .map_err(contract_error)
    }

    async fn get_pointer(&self, file_hash: FileHash) -> LedgerResult<String> {
        self.contract()
            .getPointer(file_hash.as_b256())
            .call()
            .await
            .map_err(contract_error)
    }

    async fn get_owner(&self, file_hash: FileHash) -> LedgerResult<Principal> {
        let owner: Address = self
            .contract()
            .getOwner(file_hash.as_b256())
            .call()
            .await
            .map_err(contract_error)?;
        Ok(Principal::from(owner))
    }

    async fn query_events(
        &self,
        kind: EventKind,
        filter: EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let signature = match kind {
            EventKind::FileRegistered => IAccessRegistry::FileRegistered::SIGNATURE_HASH,
            EventKind::AccessGranted => IAccessRegistry::AccessGranted::SIGNATURE_HASH,
            EventKind::AccessRevoked => IAccessRegistry::AccessRevoked::SIGNATURE_HASH,
        };

        // Both registry events index the file hash first and the principal second
        let mut query = Filter::new()
            .address(self.registry)
            .event_signature(signature)
            .from_block(from_block)
            .to_block(to_block);
        if let Some(file_hash) = filter.file_hash {
            query = query.topic1(file_hash.as_b256());
        }
        if let Some(principal) = filter.principal {
            query = query.topic2(principal.as_address().into_word());
        }

        let logs = self
            .provider
            .get_logs(&query)
            .await
            .map_err(|e| LedgerError::from_rpc_message(e.to_string()))?;

        logs.iter().map(|log| decode_log(kind, log)).collect()
    }
}

/// Decode a registry log into a ledger event.
fn decode_log(kind: EventKind, log: &Log) -> LedgerResult<LedgerEvent> {
    let block_number = log
        .block_number
        .ok_or_else(|| LedgerError::MalformedResponse("log without block number".to_string()))?;
    let log_index = log.log_index.unwrap_or_default();

    let (file_hash, principal, action) = match kind {
        EventKind::FileRegistered => {
            let decoded = log
                .log_decode::<IAccessRegistry::FileRegistered>()
                .map_err(|e| LedgerError::Decode(e.to_string()))?;
            let event = decoded.inner.data;
            (
                event.fileHash,
                event.owner,
                EventAction::Registered {
                    pointer: event.pointer,
                },
            )
        }
        EventKind::AccessGranted => {
            let decoded = log
                .log_decode::<IAccessRegistry::AccessGranted>()
                .map_err(|e| LedgerError::Decode(e.to_string()))?;
            (decoded.inner.data.fileHash, decoded.inner.data.user, EventAction::Granted)
        }
        EventKind::AccessRevoked => {
            let decoded = log
                .log_decode::<IAccessRegistry::AccessRevoked>()
                .map_err(|e| LedgerError::Decode(e.to_string()))?;
            (decoded.inner.data.fileHash, decoded.inner.data.user, EventAction::Revoked)
        }
    };

    Ok(LedgerEvent {
        block_number,
        log_index,
        file_hash: FileHash::from(file_hash),
        principal: Principal::from(principal),
        action,
    })
}

/// Wait for inclusion and convert the receipt.
async fn confirm(pending: PendingTransactionBuilder<Ethereum>) -> LedgerResult<LedgerReceipt> {
    let receipt = pending
        .get_receipt()
        .await
        .map_err(|e| LedgerError::from_rpc_message(e.to_string()))?;

    let tx_hash = format!("{:#x}", receipt.transaction_hash);
    if !receipt.status() {
        return Err(LedgerError::Reverted(tx_hash));
    }

    Ok(LedgerReceipt {
        tx_hash,
        block_number: receipt.block_number,
    })
}

/// Registry reverts become typed errors; everything else is classified
/// from the transport message.
fn contract_error(e: alloy::contract::Error) -> LedgerError {
    if let Some(revert) = e.as_decoded_interface_error::<IAccessRegistry::IAccessRegistryErrors>() {
        return revert_to_error(revert);
    }
    LedgerError::from_rpc_message(e.to_string())
}

/// Connector producing [`EvmTransport`]s for the configured registry.
#[derive(Clone)]
pub struct EvmConnector {
    registry: Address,
    wallet: Option<EthereumWallet>,
    signer: Option<Principal>,
}

impl EvmConnector {
    /// Read-only connector (no state-changing calls).
    pub fn read_only(registry: &str) -> LedgerResult<Self> {
        Ok(Self {
            registry: parse_registry(registry)?,
            wallet: None,
            signer: None,
        })
    }

    /// Connector that signs state-changing calls with `private_key_hex`.
    pub fn with_signer(registry: &str, private_key_hex: &str) -> LedgerResult<Self> {
        let signer = create_signer(private_key_hex)?;
        let address = signer.address();
        Ok(Self {
            registry: parse_registry(registry)?,
            wallet: Some(EthereumWallet::from(signer)),
            signer: Some(Principal::from(address)),
        })
    }

    /// Identity that owns files registered through this connector.
    pub fn signer(&self) -> Option<Principal> {
        self.signer
    }
}

impl Connector for EvmConnector {
    fn connect(&self, endpoint: &str) -> LedgerResult<Arc<dyn LedgerTransport>> {
        let transport = EvmTransport::new(endpoint, self.registry, self.wallet.clone())?;
        Ok(Arc::new(transport))
    }

    fn signer(&self) -> Option<Principal> {
        self.signer
    }
}

fn parse_registry(registry: &str) -> LedgerResult<Address> {
    Address::from_str(&registry.trim().to_lowercase())
        .map_err(|e| LedgerError::InvalidEndpoint(format!("registry address {registry}: {e}")))
}

/// Create a signer from a private key (hex string, optional 0x prefix).
fn create_signer(private_key_hex: &str) -> LedgerResult<PrivateKeySigner> {
    let trimmed = private_key_hex.trim();
    let key_bytes = alloy::hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| LedgerError::Rpc(format!("invalid signer key: {e}")))?;

    PrivateKeySigner::from_slice(&key_bytes)
        .map_err(|e| LedgerError::Rpc(format!("invalid signer key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = "0x76568BEd5Acf1A5Cd888773C8cAe9ea2a9131A63";
    // Well-known anvil development key #0
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn connector_rejects_bad_endpoint() {
        let connector = EvmConnector::read_only(REGISTRY).unwrap();
        let result = connector.connect("not a url");
        assert!(matches!(result, Err(LedgerError::InvalidEndpoint(_))));
    }

    #[test]
    fn connector_binds_endpoint() {
        let connector = EvmConnector::read_only(REGISTRY).unwrap();
        let transport = connector.connect("https://api.avax-test.network/ext/bc/C/rpc").unwrap();
        assert_eq!(transport.endpoint(), "https://api.avax-test.network/ext/bc/C/rpc");
    }

    #[test]
    fn signer_address_is_derived() {
        let connector = EvmConnector::with_signer(REGISTRY, DEV_KEY).unwrap();
        assert_eq!(
            connector.signer().unwrap().to_string(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[tokio::test]
    async fn read_only_transport_refuses_writes() {
        let connector = EvmConnector::read_only(REGISTRY).unwrap();
        let transport = connector.connect("http://127.0.0.1:1").unwrap();
        let result = transport.register_file(FileHash::new([1; 32]), "s3://bucket/key").await;
        assert_eq!(result, Err(LedgerError::NoSigner));
    }

    #[test]
    fn bad_registry_address_rejected() {
        assert!(EvmConnector::read_only("0x1234").is_err());
    }
}
