//! Stream records.

use crate::types::{ActivityId, StreamId, SubscriberId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A fan-out channel owned by one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,

    /// Globally unique key, `<kind>_<id>_stream`.
    pub slug: String,

    pub followers: BTreeSet<SubscriberId>,

    /// Directed links: activities attached here are forwarded one hop to these.
    pub linked: BTreeSet<StreamId>,
}

impl Stream {
    pub fn new(id: StreamId, slug: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            followers: BTreeSet::new(),
            linked: BTreeSet::new(),
        }
    }

    pub fn is_followed_by(&self, subscriber: SubscriberId) -> bool {
        self.followers.contains(&subscriber)
    }
}

/// Result of initializing an entity's stream.
#[derive(Clone, Debug)]
pub struct StreamInit {
    pub stream: Stream,

    /// True when this call created the stream.
    pub created: bool,

    /// Activities purged because the stream already existed (re-initialization).
    pub purged: Vec<ActivityId>,
}

/// Copies of streams taken before an entity is deleted.
///
/// Lets a deletion event reach the followers of streams that no longer exist.
#[derive(Clone, Debug, Default)]
pub struct StreamSnapshot {
    pub streams: Vec<Stream>,
}

impl StreamSnapshot {
    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.iter().map(|s| s.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
