//! Address book contracts.

use crate::errors::AddressBookError;
use async_trait::async_trait;
use shared_types::Address;

/// Source of consumer endpoint URLs for the HTTP transport.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn consumers(&self) -> Result<Vec<String>, AddressBookError>;
}

/// Reads the consumer list stored in an on-chain registry contract.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn consumers(&self, contract: Address) -> Result<Vec<String>, AddressBookError>;
}
