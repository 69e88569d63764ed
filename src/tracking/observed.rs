//! Change tracker wrapping a single entity.

use super::entity::Trackable;
use super::registry::TrackingProfile;
use crate::types::{EntityRef, SubscriberId};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Text form of a field value as recorded in a diff.
pub trait FieldText {
    fn field_text(&self) -> String;
}

macro_rules! field_text_via_display {
    ($($t:ty),*) => {
        $(impl FieldText for $t {
            fn field_text(&self) -> String {
                self.to_string()
            }
        })*
    };
}

field_text_via_display!(
    String, &str, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize,
    f32, f64, SubscriberId, EntityRef
);

impl<T: FieldText> FieldText for Option<T> {
    fn field_text(&self) -> String {
        match self {
            Some(v) => v.field_text(),
            None => String::new(),
        }
    }
}

/// Old and new text of one changed field, with its human label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub label: String,
    pub old: String,
    pub new: String,
}

/// Net changes of one save cycle, keyed by field name.
///
/// Labels are display text only; two fields sharing a label stay separate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet(BTreeMap<String, FieldChange>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change; entries whose old and new text match are dropped.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        label: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) {
        let (old, new) = (old.into(), new.into());
        if old != new {
            let label = label.into();
            self.0.insert(field.into(), FieldChange { label, old, new });
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, change) in self.0.values().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: '{}' -> '{}'", change.label, change.old, change.new)?;
        }
        Ok(())
    }
}

/// A tracked entity handle.
///
/// Writes made through [`Observed::set`] are diffed once the entity has a
/// persisted identity; repeated writes to one field coalesce to
/// `(value before first write, value after last write)`.
pub struct Observed<E> {
    entity: E,
    profile: Arc<TrackingProfile>,
    /// field name -> (old, new), coalesced.
    changes: BTreeMap<String, (String, String)>,
}

impl<E: Trackable> Observed<E> {
    pub(crate) fn new(entity: E, profile: Arc<TrackingProfile>) -> Self {
        Self {
            entity,
            profile,
            changes: BTreeMap::new(),
        }
    }

    /// Assign a field, recording the change.
    ///
    /// `slot` projects the field out of the entity, e.g. `|t| &mut t.status`.
    pub fn set<V, F>(&mut self, field: &str, slot: F, value: V)
    where
        V: FieldText,
        F: FnOnce(&mut E) -> &mut V,
    {
        let (before, after) = {
            let slot = slot(&mut self.entity);
            let before = slot.field_text();
            *slot = value;
            (before, slot.field_text())
        };

        if self.entity.entity_id().is_none() || self.profile.excludes(field) {
            return;
        }

        match self.changes.entry(field.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().1 = after;
                if entry.get().0 == entry.get().1 {
                    entry.remove();
                }
            }
            Entry::Vacant(entry) => {
                if before != after {
                    entry.insert((before, after));
                }
            }
        }
    }

    /// Mutable access that bypasses tracking, for bookkeeping such as
    /// assigning the persisted identity after the first save.
    pub fn untracked(&mut self) -> &mut E {
        &mut self.entity
    }

    /// Whether any net change is pending.
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Take the accumulated diff and reset the tracker.
    pub fn flush(&mut self) -> ChangeSet {
        let mut set = ChangeSet::new();
        for (field, (old, new)) in std::mem::take(&mut self.changes) {
            let label = self.profile.label_for(&field);
            set.insert(field, label, old, new);
        }
        set
    }

    pub fn profile(&self) -> &TrackingProfile {
        &self.profile
    }

    pub fn into_inner(self) -> E {
        self.entity
    }
}

impl<E> Deref for Observed<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

impl<E: fmt::Debug> fmt::Debug for Observed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("entity", &self.entity)
            .field("pending", &self.changes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ticket {
        id: Option<u64>,
        status: String,
        assignee_id: Option<u64>,
        stream: Option<u64>,
    }

    impl Trackable for Ticket {
        fn kind(&self) -> &str {
            "ticket"
        }

        fn entity_id(&self) -> Option<u64> {
            self.id
        }

        fn display_name(&self) -> String {
            format!("#{}", self.id.unwrap_or_default())
        }
    }

    fn observed(id: Option<u64>) -> Observed<Ticket> {
        let profile = TrackingProfile::new("ticket").label("assignee_id", "assignee");
        Observed::new(
            Ticket {
                id,
                status: "open".into(),
                assignee_id: None,
                stream: None,
            },
            Arc::new(profile),
        )
    }

    #[test]
    fn test_coalesces_repeated_writes() {
        let mut t = observed(Some(1));
        t.set("status", |t| &mut t.status, "triaged".to_string());
        t.set("status", |t| &mut t.status, "closed".to_string());

        let diff = t.flush();
        assert_eq!(diff.len(), 1);
        assert_eq!(
            diff.get("status"),
            Some(&FieldChange {
                label: "status".into(),
                old: "open".into(),
                new: "closed".into()
            })
        );
        assert_eq!(t.status, "closed");
    }

    #[test]
    fn test_write_back_to_original_is_no_change() {
        let mut t = observed(Some(1));
        t.set("status", |t| &mut t.status, "open".to_string());
        assert!(!t.is_dirty());

        t.set("status", |t| &mut t.status, "closed".to_string());
        t.set("status", |t| &mut t.status, "open".to_string());
        assert!(t.flush().is_empty());
    }

    #[test]
    fn test_unsaved_entity_is_not_diffed() {
        let mut t = observed(None);
        t.set("status", |t| &mut t.status, "closed".to_string());
        t.untracked().id = Some(7);
        assert!(t.flush().is_empty());
        assert_eq!(t.status, "closed");
    }

    #[test]
    fn test_excluded_fields_and_labels() {
        let mut t = observed(Some(1));
        t.set("stream", |t| &mut t.stream, Some(9));
        t.set("assignee_id", |t| &mut t.assignee_id, Some(3));

        let diff = t.flush();
        assert_eq!(diff.len(), 1);
        let change = diff.get("assignee_id").unwrap();
        assert_eq!(change.label, "assignee");
        assert_eq!(change.old, "");
        assert_eq!(change.new, "3");
    }

    #[test]
    fn test_flush_clears() {
        let mut t = observed(Some(1));
        t.set("status", |t| &mut t.status, "closed".to_string());
        assert_eq!(t.flush().len(), 1);
        assert!(t.flush().is_empty());
    }

    #[test]
    fn test_changeset_display() {
        let mut set = ChangeSet::new();
        set.insert("status", "status", "open", "closed");
        set.insert("title", "title", "a", "b");
        set.insert("same", "same", "x", "x");
        assert_eq!(set.to_string(), "status: 'open' -> 'closed'; title: 'a' -> 'b'");
    }

    #[test]
    fn test_shared_label_keeps_both_changes() {
        let profile = TrackingProfile::new("ticket")
            .label("status", "state")
            .label("assignee_id", "state");
        let mut t = Observed::new(
            Ticket {
                id: Some(1),
                status: "open".into(),
                assignee_id: None,
                stream: None,
            },
            Arc::new(profile),
        );
        t.set("status", |t| &mut t.status, "closed".to_string());
        t.set("assignee_id", |t| &mut t.assignee_id, Some(4));

        let diff = t.flush();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.to_string(), "state: '' -> '4'; state: 'open' -> 'closed'");
    }
}
