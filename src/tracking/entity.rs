//! Capabilities a domain entity implements to take part in activity tracking.

use crate::types::{EntityRef, SubscriberId};

/// An entity whose lifecycle produces activities.
pub trait Trackable {
    /// Entity kind name, e.g. `"ticket"`. Matches the registered tracking profile.
    fn kind(&self) -> &str;

    /// Persisted identity, `None` until the entity has been saved once.
    fn entity_id(&self) -> Option<u64>;

    /// Human-readable name used in activity titles.
    fn display_name(&self) -> String;

    /// Link back to the entity, if it has one.
    fn backlink(&self) -> Option<String> {
        None
    }

    fn entity_ref(&self) -> Option<EntityRef> {
        self.entity_id().map(|id| EntityRef::new(self.kind(), id))
    }
}

/// An entity that owns a stream.
pub trait StreamOwner: Trackable {
    /// Principals registered as followers on every create and change.
    fn followers(&self) -> Vec<SubscriberId> {
        Vec::new()
    }

    /// Parent entities whose streams also receive this entity's activities.
    fn related(&self) -> Vec<EntityRef> {
        Vec::new()
    }
}
