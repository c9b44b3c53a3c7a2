//! # Transport Configuration
//!
//! The `transport` config block and the builder that turns it into a
//! running stack: each configured transport is wrapped in a [`Recoverer`],
//! and several of them are combined with a [`ChainTransport`].

use crate::adapters::{
    http_client, new_address_book, ChainTransport, ContractAddressBook, Libp2pConfig, Libp2pMode,
    Libp2pTransport, Recoverer, RecoveryPolicy, RpcContractReader, StaticAddressBook,
    TransportFactory, WebApiConfig, WebApiOptions, WebApiTransport,
};
use crate::domain::AllowList;
use crate::errors::TransportError;
use crate::ports::{AddressBook, Transport};
use serde::{Deserialize, Serialize};
use shared_crypto::{KeyRegistry, Signer};
use shared_types::TopicSet;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The `transport` config block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub libp2p: Option<Libp2pConfig>,
    pub webapi: Option<WebApiConfig>,
}

/// A `client "name" { ... }` block of the `ethereum` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EthereumClientConfig {
    pub rpc_urls: Vec<String>,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for EthereumClientConfig {
    fn default() -> Self {
        Self {
            rpc_urls: Vec::new(),
            timeout: 10,
        }
    }
}

/// Shared inputs of [`TransportConfig::build`].
pub struct TransportDeps<'a> {
    pub keys: &'a KeyRegistry,
    pub clients: &'a BTreeMap<String, EthereumClientConfig>,
    pub topics: TopicSet,
    pub policy: RecoveryPolicy,
}

fn signer(keys: &KeyRegistry, name: Option<&String>) -> Result<Option<Arc<dyn Signer>>, TransportError> {
    Ok(name.map(|n| keys.get(n)).transpose()?)
}

impl TransportConfig {
    /// Build the configured transports. Nothing is started.
    pub fn build(&self, deps: &TransportDeps<'_>) -> Result<Arc<dyn Transport>, TransportError> {
        let mut transports: Vec<Arc<dyn Transport>> = Vec::new();

        if let Some(config) = &self.libp2p {
            let factory = libp2p_factory(config, deps)?;
            transports.push(Arc::new(Recoverer::new(factory, deps.topics.clone(), deps.policy)));
        }
        if let Some(config) = &self.webapi {
            let factory = webapi_factory(config, deps)?;
            transports.push(Arc::new(Recoverer::new(factory, deps.topics.clone(), deps.policy)));
        }

        info!(count = transports.len(), "Transports configured");
        match transports.len() {
            0 => Err(TransportError::Validation("no transport configured".to_string())),
            1 => Ok(transports.remove(0)),
            _ => Ok(Arc::new(ChainTransport::new(transports))),
        }
    }
}

fn libp2p_factory(config: &Libp2pConfig, deps: &TransportDeps<'_>) -> Result<TransportFactory, TransportError> {
    // Surface config errors at build time rather than on first start.
    config.validate()?;
    let signer = signer(deps.keys, config.ethereum_key.as_ref())?;
    let config = config.clone();
    let topics = deps.topics.clone();
    Ok(Arc::new(move || {
        let transport = Libp2pTransport::new(&config, Libp2pMode::Client, signer.clone(), topics.clone())?;
        Ok(Arc::new(transport) as Arc<dyn Transport>)
    }))
}

fn webapi_factory(config: &WebApiConfig, deps: &TransportDeps<'_>) -> Result<TransportFactory, TransportError> {
    let listen_addr: SocketAddr = config
        .listen_addr
        .parse()
        .map_err(|e| TransportError::Validation(format!("listen_addr {:?}: {e}", config.listen_addr)))?;
    if config.flush_interval == 0 {
        return Err(TransportError::Validation("flush_interval must be positive".to_string()));
    }
    let signer = signer(deps.keys, config.ethereum_key.as_ref())?;
    let socks5_proxy_addr = Some(config.socks5_proxy_addr.clone()).filter(|p| !p.is_empty());
    let address_book = address_book(config, deps.clients, socks5_proxy_addr.as_deref())?;
    let allow = AllowList::new(config.feeds.clone(), config.feeds_filter_disable);
    let timeout = Duration::from_secs(config.timeout);
    let flush_interval = Duration::from_secs(config.flush_interval);
    let topics = deps.topics.clone();

    Ok(Arc::new(move || {
        let transport = WebApiTransport::new(WebApiOptions {
            listen_addr,
            socks5_proxy_addr: socks5_proxy_addr.clone(),
            timeout,
            flush_interval,
            signer: signer.clone(),
            allow: allow.clone(),
            topics: topics.clone(),
            address_book: Arc::clone(&address_book),
        })?;
        Ok(Arc::new(transport) as Arc<dyn Transport>)
    }))
}

fn address_book(
    config: &WebApiConfig,
    clients: &BTreeMap<String, EthereumClientConfig>,
    socks5_proxy_addr: Option<&str>,
) -> Result<Arc<dyn AddressBook>, TransportError> {
    let mut books: Vec<Arc<dyn AddressBook>> = Vec::new();
    if let Some(book) = &config.static_address_book {
        books.push(Arc::new(StaticAddressBook::new(book.addresses.clone())));
    }
    if let Some(book) = &config.ethereum_address_book {
        let client = clients.get(&book.ethereum_client).ok_or_else(|| {
            TransportError::Validation(format!("unknown ethereum client {:?}", book.ethereum_client))
        })?;
        let http = http_client(Duration::from_secs(client.timeout), socks5_proxy_addr)?;
        let reader = Arc::new(RpcContractReader::new(http, client.rpc_urls.clone()));
        books.push(Arc::new(ContractAddressBook::new(reader, book.contract_addr)));
    }
    Ok(new_address_book(books))
}
