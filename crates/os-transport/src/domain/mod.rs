//! Transport-independent message handling.

pub mod allow_list;
pub mod hub;
pub mod policy;

pub use allow_list::AllowList;
pub use hub::{TopicHub, DEFAULT_TOPIC_CAPACITY};
pub use policy::{InboundFilter, Rejection, Sealer};
