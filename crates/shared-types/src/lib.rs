//! # Shared Types Crate
//!
//! Domain types shared across the oracle subsystems.
//!
//! ## Contents
//!
//! - [`Address`]: 20-byte author address derived from a secp256k1 key.
//! - [`Topic`] / [`TopicSet`]: the named channels a transport serves.
//! - [`Message`] / [`Envelope`]: an unsigned payload and its signed wire form.
//! - [`Service`] / [`Lifecycle`]: the start/wait contract every long-running
//!   component implements, driven by a `CancellationToken`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod address;
pub mod errors;
pub mod message;
pub mod service;
pub mod topic;

pub use address::Address;
pub use errors::*;
pub use message::{Envelope, Message, ReceivedMessage, Signature};
pub use service::{panic_message, Lifecycle, Service};
pub use topic::{default_topics, Topic, TopicSet, TOPIC_EVENT, TOPIC_GREET, TOPIC_PRICE};
