//! Catalog of known activity signatures.
//!
//! Signatures are a string contract between activities and subscriptions;
//! the catalog only lists what subscribers can opt into.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signature of the comment-created activity.
pub const COMMENT_CREATED: &str = "comment-created";

/// Signature of the comment-deleted activity.
pub const COMMENT_DELETED: &str = "comment-deleted";

/// A kind of activity subscribers can opt into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Default)]
pub struct SignatureCatalog {
    entries: RwLock<BTreeMap<String, Signature>>,
}

impl SignatureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signature. An existing slug keeps its original title.
    pub fn register(&self, slug: impl Into<String>, title: impl Into<String>) -> Signature {
        let slug = slug.into();
        self.entries
            .write()
            .entry(slug.clone())
            .or_insert_with(|| Signature {
                slug,
                title: title.into(),
            })
            .clone()
    }

    pub fn get(&self, slug: &str) -> Option<Signature> {
        self.entries.read().get(slug).cloned()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.entries.read().contains_key(slug)
    }

    /// All signatures ordered by slug.
    pub fn all(&self) -> Vec<Signature> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_get_or_create() {
        let catalog = SignatureCatalog::new();
        catalog.register("ticket-created", "Ticket created");
        let again = catalog.register("ticket-created", "Something else");
        assert_eq!(again.title, "Ticket created");
        assert_eq!(catalog.len(), 1);
    }
}
