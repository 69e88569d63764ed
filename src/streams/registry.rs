//! Stream registry: one stream per entity, linked into a graph.

use super::types::{Stream, StreamInit, StreamSnapshot};
use crate::activities::collector::{self, CollectOutcome};
use crate::error::{EngineError, Result};
use crate::repo::RepoTx;
use crate::types::{EntityRef, StreamId, SubscriberId};

/// Slug of the stream owned by an entity: `<kind>_<id>_stream`.
///
/// The kind is lower-cased and anything outside `[a-z0-9]` becomes `-`.
pub fn slug_for(entity: &EntityRef) -> String {
    let kind: String = entity
        .kind
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}_{}_stream", kind, entity.id)
}

/// Owns stream lifecycle.
#[derive(Clone, Debug, Default)]
pub struct StreamRegistry;

impl StreamRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Initialize the stream of a newly persisted entity.
    ///
    /// Creates the stream on first call. If the stream already exists the
    /// entity is being re-initialized: activities attached only to this
    /// stream are treated as stale and purged before it is returned.
    pub fn get_or_create<T: RepoTx + ?Sized>(&self, tx: &mut T, entity: &EntityRef) -> Result<StreamInit> {
        let slug = slug_for(entity);
        let (stream, created) = tx.get_or_create_stream(&slug)?;
        if created {
            tracing::debug!(stream = %slug, "stream created");
            return Ok(StreamInit {
                stream,
                created,
                purged: Vec::new(),
            });
        }

        let purged = collector::exclusive_to(tx, stream.id)?;
        for id in &purged {
            tx.delete_activity(*id)?;
        }
        if !purged.is_empty() {
            tracing::debug!(stream = %slug, purged = purged.len(), "stale activities purged on re-initialization");
        }

        let stream = tx.stream(stream.id)?.ok_or(EngineError::StreamNotFound(stream.id))?;
        Ok(StreamInit {
            stream,
            created,
            purged,
        })
    }

    /// The entity's stream, created lazily without any purge.
    pub fn ensure<T: RepoTx + ?Sized>(&self, tx: &mut T, entity: &EntityRef) -> Result<Stream> {
        let slug = slug_for(entity);
        let (stream, created) = tx.get_or_create_stream(&slug)?;
        if created {
            tracing::debug!(stream = %slug, "stream created");
        }
        Ok(stream)
    }

    pub fn lookup<T: RepoTx + ?Sized>(&self, tx: &mut T, entity: &EntityRef) -> Result<Option<Stream>> {
        tx.stream_by_slug(&slug_for(entity))
    }

    /// Forward activities recorded on `from` to `to`. Directed.
    pub fn link<T: RepoTx + ?Sized>(&self, tx: &mut T, from: StreamId, to: StreamId) -> Result<bool> {
        if from == to {
            return Err(EngineError::InvalidOperation(format!(
                "stream {} cannot link to itself",
                from
            )));
        }
        tx.add_link(from, to)
    }

    pub fn unlink<T: RepoTx + ?Sized>(&self, tx: &mut T, from: StreamId, to: StreamId) -> Result<bool> {
        tx.remove_link(from, to)
    }

    pub fn follow<T: RepoTx + ?Sized>(&self, tx: &mut T, stream: StreamId, subscriber: SubscriberId) -> Result<bool> {
        tx.add_follower(stream, subscriber)
    }

    pub fn unfollow<T: RepoTx + ?Sized>(&self, tx: &mut T, stream: StreamId, subscriber: SubscriberId) -> Result<bool> {
        tx.remove_follower(stream, subscriber)
    }

    /// Delete a stream, collecting the activities that were only on it and
    /// detaching the rest.
    pub fn delete<T: RepoTx + ?Sized>(&self, tx: &mut T, stream: StreamId) -> Result<CollectOutcome> {
        let Some(existing) = tx.stream(stream)? else {
            return Err(EngineError::StreamNotFound(stream));
        };
        let outcome = collector::release_stream(tx, stream)?;
        tx.delete_stream(stream)?;
        tracing::debug!(
            stream = %existing.slug,
            deleted = outcome.deleted.len(),
            detached = outcome.detached.len(),
            "stream deleted"
        );
        Ok(outcome)
    }

    /// Copy the existing streams of the given entities, skipping missing ones.
    pub fn capture<T: RepoTx + ?Sized>(&self, tx: &mut T, entities: &[EntityRef]) -> Result<StreamSnapshot> {
        let mut snapshot = StreamSnapshot::default();
        for entity in entities {
            if let Some(stream) = self.lookup(tx, entity)? {
                if !snapshot.streams.iter().any(|s| s.id == stream.id) {
                    snapshot.streams.push(stream);
                }
            }
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::{ActivityDraft, ActivityLog, Propagation};
    use crate::repo::{MemoryRepository, Repository};

    #[test]
    fn test_slug_format() {
        assert_eq!(slug_for(&EntityRef::new("ticket", 42)), "ticket_42_stream");
        assert_eq!(slug_for(&EntityRef::new("Sales Invoice", 7)), "sales-invoice_7_stream");
    }

    #[test]
    fn test_get_or_create_twice_purges_exclusive_activities() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let registry = StreamRegistry::new();
        let log = ActivityLog::new();
        let ticket = EntityRef::new("ticket", 1);

        let first = registry.get_or_create(&mut tx, &ticket).unwrap();
        assert!(first.created);

        let other = registry.ensure(&mut tx, &EntityRef::new("project", 1)).unwrap();
        let stale = log
            .record(&mut tx, ActivityDraft::new("x", "x"), &[first.stream.id], Propagation::None)
            .unwrap();
        let shared = log
            .record(
                &mut tx,
                ActivityDraft::new("y", "y"),
                &[first.stream.id, other.id],
                Propagation::None,
            )
            .unwrap();

        let again = registry.get_or_create(&mut tx, &ticket).unwrap();
        assert!(!again.created);
        assert_eq!(again.stream.id, first.stream.id);
        assert_eq!(again.purged, vec![stale.id]);
        assert!(tx.activity(stale.id).unwrap().is_none());
        assert!(tx.activity(shared.id).unwrap().is_some());
    }

    #[test]
    fn test_ensure_does_not_purge() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let registry = StreamRegistry::new();
        let ticket = EntityRef::new("ticket", 1);

        let stream = registry.ensure(&mut tx, &ticket).unwrap();
        let activity = ActivityLog::new()
            .record(&mut tx, ActivityDraft::new("x", "x"), &[stream.id], Propagation::None)
            .unwrap();
        registry.ensure(&mut tx, &ticket).unwrap();
        assert!(tx.activity(activity.id).unwrap().is_some());
    }

    #[test]
    fn test_link_is_directed() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let registry = StreamRegistry::new();
        let a = registry.ensure(&mut tx, &EntityRef::new("a", 1)).unwrap();
        let b = registry.ensure(&mut tx, &EntityRef::new("b", 1)).unwrap();

        assert!(registry.link(&mut tx, a.id, b.id).unwrap());
        assert!(!registry.link(&mut tx, a.id, b.id).unwrap());
        assert!(tx.stream(b.id).unwrap().unwrap().linked.is_empty());
        assert!(registry.link(&mut tx, a.id, a.id).is_err());
    }

    #[test]
    fn test_delete_cascades_into_collector() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let registry = StreamRegistry::new();
        let log = ActivityLog::new();
        let a = registry.ensure(&mut tx, &EntityRef::new("a", 1)).unwrap();
        let b = registry.ensure(&mut tx, &EntityRef::new("b", 1)).unwrap();

        let only_a = log
            .record(&mut tx, ActivityDraft::new("x", "x"), &[a.id], Propagation::None)
            .unwrap();
        let both = log
            .record(&mut tx, ActivityDraft::new("x", "x"), &[a.id, b.id], Propagation::None)
            .unwrap();

        let outcome = registry.delete(&mut tx, a.id).unwrap();
        assert_eq!(outcome.deleted, vec![only_a.id]);
        assert_eq!(outcome.detached, vec![both.id]);
        assert!(tx.stream(a.id).unwrap().is_none());
        assert!(matches!(
            registry.delete(&mut tx, a.id),
            Err(EngineError::StreamNotFound(_))
        ));
    }

    #[test]
    fn test_capture_skips_missing_and_duplicates() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let registry = StreamRegistry::new();
        let ticket = EntityRef::new("ticket", 1);
        let stream = registry.ensure(&mut tx, &ticket).unwrap();
        registry.follow(&mut tx, stream.id, SubscriberId(5)).unwrap();

        let snapshot = registry
            .capture(&mut tx, &[ticket.clone(), ticket, EntityRef::new("project", 9)])
            .unwrap();
        assert_eq!(snapshot.ids(), vec![stream.id]);
        assert!(snapshot.streams[0].is_followed_by(SubscriberId(5)));
    }
}
