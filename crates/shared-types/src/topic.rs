//! # Topics
//!
//! A topic is a named message channel. Gated topics only deliver messages
//! whose author is on the feed allow-list; open topics deliver from anyone.
//!
//! The set of topics a transport serves is fixed when it is constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price updates from feeds.
pub const TOPIC_PRICE: &str = "price/v1";
/// Event attestations from feeds.
pub const TOPIC_EVENT: &str = "event/v1";
/// Node greetings; open to every author.
pub const TOPIC_GREET: &str = "greet/v1";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    /// Whether delivery requires the author to be on the allow-list.
    pub gated: bool,
}

impl Topic {
    #[must_use]
    pub fn gated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gated: true,
        }
    }

    #[must_use]
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gated: false,
        }
    }
}

/// The topics served by default.
#[must_use]
pub fn default_topics() -> TopicSet {
    TopicSet::from_iter([
        Topic::gated(TOPIC_PRICE),
        Topic::gated(TOPIC_EVENT),
        Topic::open(TOPIC_GREET),
    ])
}

/// An immutable, name-indexed set of topics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet {
    topics: BTreeMap<String, Topic>,
}

impl TopicSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.topics.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl FromIterator<Topic> for TopicSet {
    fn from_iter<I: IntoIterator<Item = Topic>>(iter: I) -> Self {
        Self {
            topics: iter.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics() {
        let topics = default_topics();
        assert_eq!(topics.len(), 3);
        assert!(topics.get(TOPIC_PRICE).unwrap().gated);
        assert!(topics.get(TOPIC_EVENT).unwrap().gated);
        assert!(!topics.get(TOPIC_GREET).unwrap().gated);
        assert!(!topics.contains("unknown/v1"));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let topics = TopicSet::from_iter([Topic::gated("a"), Topic::open("a")]);
        assert_eq!(topics.len(), 1);
        assert!(!topics.get("a").unwrap().gated);
    }
}
