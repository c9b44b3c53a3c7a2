//! Feed allow-list.
//!
//! Only messages authored by a listed feed are delivered on gated topics.
//! The list keeps insertion order and drops duplicates.

use shared_types::Address;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    authors: Vec<Address>,
    disabled: bool,
}

impl AllowList {
    /// Build a list from configured feeds.
    ///
    /// With `filter_disable` every author is permitted and a non-empty feed
    /// list is discarded with a warning.
    pub fn new(feeds: impl IntoIterator<Item = Address>, filter_disable: bool) -> Self {
        let mut list = Self {
            authors: Vec::new(),
            disabled: filter_disable,
        };
        for feed in feeds {
            list.push(feed);
        }
        if filter_disable && !list.authors.is_empty() {
            warn!(
                feeds = list.authors.len(),
                "Feed filter is disabled, ignoring configured feeds"
            );
            list.authors.clear();
        }
        list
    }

    /// A list that permits every author.
    #[must_use]
    pub fn permissive() -> Self {
        Self::new([], true)
    }

    /// Add the local signer so the node accepts its own messages.
    #[must_use]
    pub fn with_signer(mut self, signer: Option<Address>) -> Self {
        if let Some(address) = signer {
            if !self.disabled {
                self.push(address);
            }
        }
        self
    }

    fn push(&mut self, address: Address) {
        if !self.authors.contains(&address) {
            self.authors.push(address);
        }
    }

    #[must_use]
    pub fn permits(&self, author: &Address) -> bool {
        self.disabled || self.authors.contains(author)
    }

    #[must_use]
    pub fn authors(&self) -> &[Address] {
        &self.authors
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    #[test]
    fn test_dedup_preserves_order() {
        let list = AllowList::new([addr(3), addr(1), addr(3), addr(2)], false);
        assert_eq!(list.authors(), &[addr(3), addr(1), addr(2)]);
    }

    #[test]
    fn test_permits_only_listed() {
        let list = AllowList::new([addr(1)], false);
        assert!(list.permits(&addr(1)));
        assert!(!list.permits(&addr(2)));
    }

    #[test]
    fn test_disabled_clears_list_and_permits_all() {
        let list = AllowList::new([addr(1)], true);
        assert!(list.authors().is_empty());
        assert!(list.permits(&addr(9)));
    }

    #[test]
    fn test_signer_appended_when_enabled() {
        let list = AllowList::new([addr(1)], false).with_signer(Some(addr(2)));
        assert_eq!(list.authors(), &[addr(1), addr(2)]);

        let list = AllowList::permissive().with_signer(Some(addr(2)));
        assert!(list.authors().is_empty());
    }
}
