//! Orphan collection.
//!
//! An activity lives while it is attached to at least one stream. The
//! moment its last attachment goes, it is deleted; nothing re-attaches a
//! deleted activity.

use crate::error::Result;
use crate::repo::RepoTx;
use crate::types::{ActivityId, StreamId};

/// Outcome of detaching one activity from one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detached {
    /// The activity was not attached to the stream (or does not exist).
    NotAttached,
    /// Still attached to this many streams.
    Remaining(usize),
    /// That was the last stream; the activity was deleted.
    Collected,
}

/// Activities affected by releasing a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    /// Deleted because the stream was their only attachment.
    pub deleted: Vec<ActivityId>,
    /// Detached but still attached elsewhere.
    pub detached: Vec<ActivityId>,
}

impl CollectOutcome {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.detached.is_empty()
    }
}

/// Detach an activity from a stream, deleting it if it becomes orphaned.
pub fn detach<T: RepoTx + ?Sized>(tx: &mut T, activity: ActivityId, stream: StreamId) -> Result<Detached> {
    if tx.activity(activity)?.is_none() {
        return Ok(Detached::NotAttached);
    }
    match tx.detach(activity, stream)? {
        None => Ok(Detached::NotAttached),
        Some(0) => {
            tx.delete_activity(activity)?;
            tracing::debug!(%activity, %stream, "orphaned activity collected");
            Ok(Detached::Collected)
        }
        Some(left) => Ok(Detached::Remaining(left)),
    }
}

/// Delete the activity if it has no streams. Returns true if it was deleted.
pub fn collect_orphan<T: RepoTx + ?Sized>(tx: &mut T, activity: ActivityId) -> Result<bool> {
    match tx.activity(activity)? {
        Some(a) if a.is_orphaned() => {
            tx.delete_activity(activity)?;
            tracing::debug!(%activity, "orphaned activity collected");
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Activities attached to `stream` and nothing else.
pub fn exclusive_to<T: RepoTx + ?Sized>(tx: &mut T, stream: StreamId) -> Result<Vec<ActivityId>> {
    let mut exclusive = Vec::new();
    for id in tx.activities_on(stream)? {
        if let Some(activity) = tx.activity(id)? {
            if activity.streams.len() == 1 && activity.streams.contains(&stream) {
                exclusive.push(id);
            }
        }
    }
    Ok(exclusive)
}

/// Release every activity attached to a stream that is about to go away:
/// exclusive ones are deleted, shared ones are detached.
pub fn release_stream<T: RepoTx + ?Sized>(tx: &mut T, stream: StreamId) -> Result<CollectOutcome> {
    let mut outcome = CollectOutcome::default();
    for id in tx.activities_on(stream)? {
        match detach(tx, id, stream)? {
            Detached::Collected => outcome.deleted.push(id),
            Detached::Remaining(_) => outcome.detached.push(id),
            Detached::NotAttached => {}
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::ActivityDraft;
    use crate::repo::{MemoryRepository, Repository};

    #[test]
    fn test_last_detach_collects() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, _) = tx.get_or_create_stream("a").unwrap();
        let (b, _) = tx.get_or_create_stream("b").unwrap();
        let activity = tx.insert_activity(ActivityDraft::new("x", "x")).unwrap();
        tx.attach(activity.id, a.id).unwrap();
        tx.attach(activity.id, b.id).unwrap();

        assert_eq!(detach(&mut tx, activity.id, a.id).unwrap(), Detached::Remaining(1));
        assert_eq!(detach(&mut tx, activity.id, a.id).unwrap(), Detached::NotAttached);
        assert_eq!(detach(&mut tx, activity.id, b.id).unwrap(), Detached::Collected);
        assert!(tx.activity(activity.id).unwrap().is_none());
        assert_eq!(detach(&mut tx, activity.id, b.id).unwrap(), Detached::NotAttached);
    }

    #[test]
    fn test_release_stream_splits_exclusive_and_shared() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, _) = tx.get_or_create_stream("a").unwrap();
        let (b, _) = tx.get_or_create_stream("b").unwrap();

        let only_a = tx.insert_activity(ActivityDraft::new("x", "x")).unwrap();
        tx.attach(only_a.id, a.id).unwrap();
        let shared = tx.insert_activity(ActivityDraft::new("y", "y")).unwrap();
        tx.attach(shared.id, a.id).unwrap();
        tx.attach(shared.id, b.id).unwrap();

        assert_eq!(exclusive_to(&mut tx, a.id).unwrap(), vec![only_a.id]);

        let outcome = release_stream(&mut tx, a.id).unwrap();
        assert_eq!(outcome.deleted, vec![only_a.id]);
        assert_eq!(outcome.detached, vec![shared.id]);
        assert!(tx.activities_on(a.id).unwrap().is_empty());
        assert_eq!(tx.activity(shared.id).unwrap().unwrap().streams.len(), 1);
    }

    #[test]
    fn test_collect_orphan_leaves_attached() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, _) = tx.get_or_create_stream("a").unwrap();
        let attached = tx.insert_activity(ActivityDraft::new("x", "x")).unwrap();
        tx.attach(attached.id, a.id).unwrap();
        let loose = tx.insert_activity(ActivityDraft::new("y", "y")).unwrap();

        assert!(!collect_orphan(&mut tx, attached.id).unwrap());
        assert!(collect_orphan(&mut tx, loose.id).unwrap());
    }
}
