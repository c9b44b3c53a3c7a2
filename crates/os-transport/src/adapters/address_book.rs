//! # Address Books
//!
//! Sources of consumer URLs for the HTTP transport.
//!
//! | Book | Source |
//! |------|--------|
//! | [`StaticAddressBook`] | fixed list from config |
//! | [`ContractAddressBook`] | on-chain registry, cached for one hour |
//! | [`MultiAddressBook`] | union of several books |
//! | [`NullAddressBook`] | nothing |

use crate::errors::AddressBookError;
use crate::ports::{AddressBook, ContractReader};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_crypto::keccak256;
use shared_types::Address;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long on-chain consumer lists are reused before refreshing.
pub const DEFAULT_CONTRACT_TTL: Duration = Duration::from_secs(3600);

/// Pick the right book for a set of configured books.
#[must_use]
pub fn new_address_book(mut books: Vec<Arc<dyn AddressBook>>) -> Arc<dyn AddressBook> {
    match books.len() {
        0 => Arc::new(NullAddressBook),
        1 => books.remove(0),
        _ => Arc::new(MultiAddressBook::new(books)),
    }
}

// =============================================================================
// Static / Null / Multi
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct StaticAddressBook {
    addresses: Vec<String>,
}

impl StaticAddressBook {
    #[must_use]
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl AddressBook for StaticAddressBook {
    async fn consumers(&self) -> Result<Vec<String>, AddressBookError> {
        Ok(self.addresses.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullAddressBook;

#[async_trait]
impl AddressBook for NullAddressBook {
    async fn consumers(&self) -> Result<Vec<String>, AddressBookError> {
        Ok(Vec::new())
    }
}

/// Union of several books, de-duplicated in first-seen order.
///
/// Fails if any child fails.
pub struct MultiAddressBook {
    books: Vec<Arc<dyn AddressBook>>,
}

impl MultiAddressBook {
    #[must_use]
    pub fn new(books: Vec<Arc<dyn AddressBook>>) -> Self {
        Self { books }
    }
}

#[async_trait]
impl AddressBook for MultiAddressBook {
    async fn consumers(&self) -> Result<Vec<String>, AddressBookError> {
        let mut all: Vec<String> = Vec::new();
        for book in &self.books {
            for consumer in book.consumers().await? {
                if !all.contains(&consumer) {
                    all.push(consumer);
                }
            }
        }
        Ok(all)
    }
}

// =============================================================================
// Contract
// =============================================================================

struct Cached {
    fetched_at: Instant,
    consumers: Vec<String>,
}

/// Consumer list read from a registry contract.
///
/// One refresh runs at a time; callers arriving during a refresh get the
/// cached list when there is one. A failed refresh keeps serving the stale
/// list.
pub struct ContractAddressBook {
    reader: Arc<dyn ContractReader>,
    contract: Address,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
    refresh: tokio::sync::Mutex<()>,
}

impl ContractAddressBook {
    #[must_use]
    pub fn new(reader: Arc<dyn ContractReader>, contract: Address) -> Self {
        Self::with_ttl(reader, contract, DEFAULT_CONTRACT_TTL)
    }

    #[must_use]
    pub fn with_ttl(reader: Arc<dyn ContractReader>, contract: Address, ttl: Duration) -> Self {
        Self {
            reader,
            contract,
            ttl,
            cache: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<Vec<String>> {
        self.cache
            .read()
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.consumers.clone())
    }

    fn stale(&self) -> Option<Vec<String>> {
        self.cache.read().as_ref().map(|c| c.consumers.clone())
    }
}

#[async_trait]
impl AddressBook for ContractAddressBook {
    async fn consumers(&self) -> Result<Vec<String>, AddressBookError> {
        if let Some(consumers) = self.fresh() {
            return Ok(consumers);
        }

        let _guard = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(consumers) = self.stale() {
                    return Ok(consumers);
                }
                self.refresh.lock().await
            }
        };
        if let Some(consumers) = self.fresh() {
            return Ok(consumers);
        }

        match self.reader.consumers(self.contract).await {
            Ok(consumers) => {
                debug!(contract = %self.contract, consumers = consumers.len(), "Consumer list refreshed");
                *self.cache.write() = Some(Cached {
                    fetched_at: Instant::now(),
                    consumers: consumers.clone(),
                });
                Ok(consumers)
            }
            Err(err) => {
                warn!(
                    contract = %self.contract,
                    error = %err,
                    kind = "TransientFailure",
                    "Failed to refresh consumer list"
                );
                self.stale().ok_or(err)
            }
        }
    }
}

// =============================================================================
// JSON-RPC contract reader
// =============================================================================

/// Reads `getConsumers() returns (string[])` through `eth_call`.
///
/// Endpoints are tried in order until one answers.
pub struct RpcContractReader {
    client: reqwest::Client,
    rpc_urls: Vec<String>,
}

impl RpcContractReader {
    #[must_use]
    pub fn new(client: reqwest::Client, rpc_urls: Vec<String>) -> Self {
        Self { client, rpc_urls }
    }

    async fn call(&self, url: &str, contract: Address) -> Result<Vec<String>, AddressBookError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                { "to": contract.to_string(), "data": get_consumers_calldata() },
                "latest"
            ],
        });
        let response: Value = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AddressBookError::Rpc(e.to_string()))?
            .json()
            .await
            .map_err(|e| AddressBookError::Rpc(e.to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(AddressBookError::Rpc(error.to_string()));
        }
        let result = response
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| AddressBookError::Decode("missing result".into()))?;
        let bytes = hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| AddressBookError::Decode(e.to_string()))?;
        decode_string_array(&bytes)
    }
}

#[async_trait]
impl ContractReader for RpcContractReader {
    async fn consumers(&self, contract: Address) -> Result<Vec<String>, AddressBookError> {
        let mut last = AddressBookError::NoEndpoints;
        for url in &self.rpc_urls {
            match self.call(url, contract).await {
                Ok(consumers) => return Ok(consumers),
                Err(err) => {
                    debug!(url = %url, error = %err, "RPC endpoint failed");
                    last = err;
                }
            }
        }
        Err(last)
    }
}

/// `0x` + the 4-byte selector of `getConsumers()`.
#[must_use]
pub fn get_consumers_calldata() -> String {
    format!("0x{}", hex::encode(&keccak256(b"getConsumers()")[..4]))
}

fn offset_add(a: usize, b: usize) -> Result<usize, AddressBookError> {
    a.checked_add(b)
        .ok_or_else(|| AddressBookError::Decode(format!("offset {a} + {b} overflows")))
}

fn read_word(data: &[u8], offset: usize) -> Result<usize, AddressBookError> {
    let end = offset_add(offset, 32)?;
    let word = data
        .get(offset..end)
        .ok_or_else(|| AddressBookError::Decode(format!("word at {offset} out of bounds")))?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(AddressBookError::Decode(format!("word at {offset} too large")));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(raw))
        .map_err(|_| AddressBookError::Decode(format!("word at {offset} too large")))
}

/// Decode an ABI-encoded `string[]` return value.
///
/// Every offset comes from the RPC response, so all arithmetic is checked.
pub fn decode_string_array(data: &[u8]) -> Result<Vec<String>, AddressBookError> {
    let base = read_word(data, 0)?;
    let count = read_word(data, base)?;
    let items = offset_add(base, 32)?;
    let mut out = Vec::with_capacity(count.min(1024));
    for i in 0..count {
        let slot = i
            .checked_mul(32)
            .ok_or_else(|| AddressBookError::Decode(format!("item {i} offset overflows")))?;
        let start = offset_add(items, read_word(data, offset_add(items, slot)?)?)?;
        let len = read_word(data, start)?;
        let from = offset_add(start, 32)?;
        let bytes = data
            .get(from..offset_add(from, len)?)
            .ok_or_else(|| AddressBookError::Decode(format!("string {i} out of bounds")))?;
        let value = String::from_utf8(bytes.to_vec())
            .map_err(|e| AddressBookError::Decode(e.to_string()))?;
        out.push(value);
    }
    Ok(out)
}
