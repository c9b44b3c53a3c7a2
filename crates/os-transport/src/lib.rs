//! # Oracle Transport
//!
//! Signed, topic-based messaging between oracle nodes.
//!
//! ## Architecture
//!
//! - `ports`: the [`Transport`] and [`AddressBook`] contracts
//! - `domain`: allow-lists, inbound filtering and per-topic fan-out
//! - `adapters`: libp2p gossip, HTTP batches, chain, recoverer, loopback
//!
//! Every transport is a [`Service`](shared_types::Service): started once
//! with a cancellation token, stopped by cancelling it. Broadcasts are
//! sealed with the configured signing key; received envelopes are verified
//! and, on gated topics, checked against the feed allow-list before
//! delivery.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let transport = config.transport.build(&deps)?;
//! transport.start(ctx.clone()).await?;
//! let mut prices = transport.messages(TOPIC_PRICE);
//! transport.broadcast(TOPIC_PRICE, Message::new(body)).await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;

pub use adapters::{
    ChainTransport, Libp2pConfig, Libp2pMode, Libp2pTransport, LocalTransport, Recoverer,
    RecoveryPolicy, WebApiConfig, WebApiTransport,
};
pub use config::{EthereumClientConfig, TransportConfig, TransportDeps};
pub use domain::AllowList;
pub use errors::{AddressBookError, TransportError};
pub use ports::{as_service, AddressBook, Subscription, Transport};
