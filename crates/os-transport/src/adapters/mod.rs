//! Transport and address book implementations.

pub mod address_book;
pub mod chain;
pub mod libp2p;
pub mod local;
pub mod recoverer;
pub mod webapi;

pub use address_book::{
    decode_string_array, get_consumers_calldata, new_address_book, ContractAddressBook,
    MultiAddressBook, NullAddressBook, RpcContractReader, StaticAddressBook, DEFAULT_CONTRACT_TTL,
};
pub use chain::ChainTransport;
pub use libp2p::{Libp2pConfig, Libp2pMode, Libp2pTransport};
pub use local::LocalTransport;
pub use recoverer::{Recoverer, RecoveryPolicy, TransportFactory};
pub use webapi::{
    http_client, EthereumAddressBookConfig, ReceiveResponse, StaticAddressBookConfig, WebApiConfig,
    WebApiOptions, WebApiTransport,
};
