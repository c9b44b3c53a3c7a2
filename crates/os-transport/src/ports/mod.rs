//! Ports: the contracts adapters implement.

pub mod address_book;
pub mod transport;

pub use address_book::{AddressBook, ContractReader};
pub use transport::{as_service, Subscription, Transport};
