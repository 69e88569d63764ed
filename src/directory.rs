//! Principal directory collaborator.

use crate::types::{Principal, SubscriberId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Resolves principals for context enrichment and mail addressing.
pub trait Directory: Send + Sync {
    /// The principal acting in the current unit of work, if any.
    /// System-initiated events have none.
    fn current_principal(&self) -> Option<Principal>;

    /// Look up a principal by id.
    fn principal(&self, id: SubscriberId) -> Option<Principal>;
}

/// Directory that knows nobody. Every event is anonymous.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDirectory;

impl Directory for NoDirectory {
    fn current_principal(&self) -> Option<Principal> {
        None
    }

    fn principal(&self, _id: SubscriberId) -> Option<Principal> {
        None
    }
}

/// In-memory directory with a settable acting principal.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    principals: RwLock<HashMap<SubscriberId, Principal>>,
    current: RwLock<Option<SubscriberId>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal: Principal) {
        self.principals.write().insert(principal.id, principal);
    }

    /// Set (or clear) the acting principal.
    pub fn act_as(&self, id: Option<SubscriberId>) {
        *self.current.write() = id;
    }
}

impl Directory for StaticDirectory {
    fn current_principal(&self) -> Option<Principal> {
        let current = *self.current.read();
        current.and_then(|id| self.principal(id))
    }

    fn principal(&self, id: SubscriberId) -> Option<Principal> {
        self.principals.read().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_directory_acting_principal() {
        let directory = StaticDirectory::new();
        directory.insert(Principal::new(SubscriberId(1), "alice"));
        assert!(directory.current_principal().is_none());

        directory.act_as(Some(SubscriberId(1)));
        assert_eq!(directory.current_principal().unwrap().name, "alice");

        directory.act_as(Some(SubscriberId(9)));
        assert!(directory.current_principal().is_none());
    }
}
