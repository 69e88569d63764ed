//! In-memory repository.
//!
//! One transaction runs at a time (single writer). Each mutation first logs
//! a before-image of the row it touches to the transaction's undo journal;
//! rollback replays the journal in reverse. Identity counters are not
//! journaled, so ids are never reused, like database sequences.

use super::{RepoTx, Repository};
use crate::activities::{Activity, ActivityDraft};
use crate::error::{EngineError, Result};
use crate::notifications::{Notification, NotificationDraft, Subscription};
use crate::streams::Stream;
use crate::types::{
    ActivityId, EntityRef, MonotonicClock, NotificationId, StreamId, SubscriberId,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type SubscriptionKey = (SubscriberId, String);
type DispatchKey = (SubscriberId, String);

/// Before-image of one row.
#[derive(Debug)]
enum Undo {
    Stream(StreamId, Option<Stream>),
    Activity(ActivityId, Option<Activity>),
    Subscription(SubscriptionKey, Option<Subscription>),
    Notification(NotificationId, Option<Notification>),
}

#[derive(Debug, Default)]
struct MemoryState {
    next_stream: u64,
    next_activity: u64,
    next_notification: u64,

    streams: HashMap<StreamId, Stream>,
    slugs: HashMap<String, StreamId>,

    activities: BTreeMap<ActivityId, Activity>,
    /// stream -> attached activities.
    attachments: HashMap<StreamId, BTreeSet<ActivityId>>,

    subscriptions: BTreeMap<SubscriptionKey, Subscription>,

    notifications: BTreeMap<NotificationId, Notification>,
    dispatched: HashMap<DispatchKey, NotificationId>,
}

impl MemoryState {
    // Row replacement keeps the secondary indexes in step. Used both by
    // forward mutations and by rollback.

    fn put_stream(&mut self, id: StreamId, row: Option<Stream>) {
        if let Some(old) = self.streams.remove(&id) {
            self.slugs.remove(&old.slug);
        }
        if let Some(row) = row {
            self.slugs.insert(row.slug.clone(), id);
            self.streams.insert(id, row);
        }
    }

    fn put_activity(&mut self, id: ActivityId, row: Option<Activity>) {
        if let Some(old) = self.activities.remove(&id) {
            for stream in &old.streams {
                if let Some(set) = self.attachments.get_mut(stream) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.attachments.remove(stream);
                    }
                }
            }
        }
        if let Some(row) = row {
            for stream in &row.streams {
                self.attachments.entry(*stream).or_default().insert(id);
            }
            self.activities.insert(id, row);
        }
    }

    fn put_subscription(&mut self, key: SubscriptionKey, row: Option<Subscription>) {
        match row {
            Some(row) => {
                self.subscriptions.insert(key, row);
            }
            None => {
                self.subscriptions.remove(&key);
            }
        }
    }

    fn put_notification(&mut self, id: NotificationId, row: Option<Notification>) {
        if let Some(old) = self.notifications.remove(&id) {
            self.dispatched.remove(&(old.subscriber, old.dispatch_key));
        }
        if let Some(row) = row {
            self.dispatched
                .insert((row.subscriber, row.dispatch_key.clone()), id);
            self.notifications.insert(id, row);
        }
    }

    fn restore(&mut self, undo: Undo) {
        match undo {
            Undo::Stream(id, row) => self.put_stream(id, row),
            Undo::Activity(id, row) => self.put_activity(id, row),
            Undo::Subscription(key, row) => self.put_subscription(key, row),
            Undo::Notification(id, row) => self.put_notification(id, row),
        }
    }
}

/// Repository keeping every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    clock: MonotonicClock,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live activities.
    pub fn activity_count(&self) -> usize {
        self.state.lock().activities.len()
    }

    /// Number of live streams.
    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Number of notifications across all subscribers.
    pub fn notification_count(&self) -> usize {
        self.state.lock().notifications.len()
    }
}

impl Repository for MemoryRepository {
    type Tx<'a> = MemoryTx<'a>
    where
        Self: 'a;

    fn begin(&self) -> Result<MemoryTx<'_>> {
        Ok(MemoryTx {
            state: self.state.lock(),
            clock: &self.clock,
            journal: Vec::new(),
            committed: false,
        })
    }
}

/// Transaction over a [`MemoryRepository`]. Rolls back on drop unless committed.
pub struct MemoryTx<'a> {
    state: MutexGuard<'a, MemoryState>,
    clock: &'a MonotonicClock,
    journal: Vec<Undo>,
    committed: bool,
}

impl MemoryTx<'_> {
    fn stream_mut(&mut self, id: StreamId) -> Result<&mut Stream> {
        let before = self
            .state
            .streams
            .get(&id)
            .cloned()
            .ok_or(EngineError::StreamNotFound(id))?;
        self.journal.push(Undo::Stream(id, Some(before)));
        self.state
            .streams
            .get_mut(&id)
            .ok_or(EngineError::StreamNotFound(id))
    }

    fn update_activity<F>(&mut self, id: ActivityId, f: F) -> Result<Activity>
    where
        F: FnOnce(&mut Activity),
    {
        let before = self
            .state
            .activities
            .get(&id)
            .cloned()
            .ok_or(EngineError::ActivityNotFound(id))?;
        let mut after = before.clone();
        f(&mut after);
        self.journal.push(Undo::Activity(id, Some(before)));
        self.state.put_activity(id, Some(after.clone()));
        Ok(after)
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.committed || self.journal.is_empty() {
            return;
        }
        tracing::debug!(entries = self.journal.len(), "rolling back transaction");
        while let Some(undo) = self.journal.pop() {
            self.state.restore(undo);
        }
    }
}

impl RepoTx for MemoryTx<'_> {
    fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.journal.clear();
        Ok(())
    }

    fn get_or_create_stream(&mut self, slug: &str) -> Result<(Stream, bool)> {
        if let Some(id) = self.state.slugs.get(slug).copied() {
            if let Some(stream) = self.state.streams.get(&id) {
                return Ok((stream.clone(), false));
            }
        }

        self.state.next_stream += 1;
        let id = StreamId(self.state.next_stream);
        let stream = Stream::new(id, slug);
        self.journal.push(Undo::Stream(id, None));
        self.state.put_stream(id, Some(stream.clone()));
        Ok((stream, true))
    }

    fn stream(&mut self, id: StreamId) -> Result<Option<Stream>> {
        Ok(self.state.streams.get(&id).cloned())
    }

    fn stream_by_slug(&mut self, slug: &str) -> Result<Option<Stream>> {
        let id = self.state.slugs.get(slug).copied();
        Ok(id.and_then(|id| self.state.streams.get(&id).cloned()))
    }

    fn add_follower(&mut self, stream: StreamId, subscriber: SubscriberId) -> Result<bool> {
        if self.stream_required(stream)?.followers.contains(&subscriber) {
            return Ok(false);
        }
        Ok(self.stream_mut(stream)?.followers.insert(subscriber))
    }

    fn remove_follower(&mut self, stream: StreamId, subscriber: SubscriberId) -> Result<bool> {
        if !self.stream_required(stream)?.followers.contains(&subscriber) {
            return Ok(false);
        }
        Ok(self.stream_mut(stream)?.followers.remove(&subscriber))
    }

    fn add_link(&mut self, from: StreamId, to: StreamId) -> Result<bool> {
        self.stream_required(to)?;
        if self.stream_required(from)?.linked.contains(&to) {
            return Ok(false);
        }
        Ok(self.stream_mut(from)?.linked.insert(to))
    }

    fn remove_link(&mut self, from: StreamId, to: StreamId) -> Result<bool> {
        if !self.stream_required(from)?.linked.contains(&to) {
            return Ok(false);
        }
        Ok(self.stream_mut(from)?.linked.remove(&to))
    }

    fn delete_stream(&mut self, id: StreamId) -> Result<bool> {
        let Some(before) = self.state.streams.get(&id).cloned() else {
            return Ok(false);
        };
        if self.state.attachments.contains_key(&id) {
            return Err(EngineError::InvalidOperation(format!(
                "stream {} still has attached activities",
                before.slug
            )));
        }

        let inbound: Vec<StreamId> = self
            .state
            .streams
            .values()
            .filter(|s| s.linked.contains(&id))
            .map(|s| s.id)
            .collect();
        for from in inbound {
            self.stream_mut(from)?.linked.remove(&id);
        }

        self.journal.push(Undo::Stream(id, Some(before)));
        self.state.put_stream(id, None);
        Ok(true)
    }

    fn activities_on(&mut self, stream: StreamId) -> Result<Vec<ActivityId>> {
        Ok(self
            .state
            .attachments
            .get(&stream)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn insert_activity(&mut self, draft: ActivityDraft) -> Result<Activity> {
        self.state.next_activity += 1;
        let id = ActivityId(self.state.next_activity);
        let activity = Activity {
            id,
            title: draft.title,
            signature: draft.signature,
            template: draft.template,
            context: draft.context.encode()?,
            created_at: self.clock.tick(),
            streams: BTreeSet::new(),
            backlink: draft.backlink,
            source: draft.source,
        };
        self.journal.push(Undo::Activity(id, None));
        self.state.put_activity(id, Some(activity.clone()));
        Ok(activity)
    }

    fn activity(&mut self, id: ActivityId) -> Result<Option<Activity>> {
        Ok(self.state.activities.get(&id).cloned())
    }

    fn attach(&mut self, activity: ActivityId, stream: StreamId) -> Result<bool> {
        self.stream_required(stream)?;
        let current = self
            .state
            .activities
            .get(&activity)
            .ok_or(EngineError::ActivityNotFound(activity))?;
        if current.streams.contains(&stream) {
            return Ok(false);
        }
        self.update_activity(activity, |a| {
            a.streams.insert(stream);
        })?;
        Ok(true)
    }

    fn detach(&mut self, activity: ActivityId, stream: StreamId) -> Result<Option<usize>> {
        let current = self
            .state
            .activities
            .get(&activity)
            .ok_or(EngineError::ActivityNotFound(activity))?;
        if !current.streams.contains(&stream) {
            return Ok(None);
        }
        let after = self.update_activity(activity, |a| {
            a.streams.remove(&stream);
        })?;
        Ok(Some(after.streams.len()))
    }

    fn delete_activity(&mut self, id: ActivityId) -> Result<bool> {
        let Some(before) = self.state.activities.get(&id).cloned() else {
            return Ok(false);
        };
        self.journal.push(Undo::Activity(id, Some(before)));
        self.state.put_activity(id, None);
        Ok(true)
    }

    fn subscription(&mut self, subscriber: SubscriberId, signature: &str) -> Result<Option<Subscription>> {
        Ok(self
            .state
            .subscriptions
            .get(&(subscriber, signature.to_string()))
            .cloned())
    }

    fn put_subscription(&mut self, subscription: Subscription) -> Result<Option<Subscription>> {
        let key = (subscription.subscriber, subscription.signature.clone());
        let before = self.state.subscriptions.get(&key).cloned();
        self.journal.push(Undo::Subscription(key.clone(), before.clone()));
        self.state.put_subscription(key, Some(subscription));
        Ok(before)
    }

    fn delete_subscription(&mut self, subscriber: SubscriberId, signature: &str) -> Result<bool> {
        let key = (subscriber, signature.to_string());
        let Some(before) = self.state.subscriptions.get(&key).cloned() else {
            return Ok(false);
        };
        self.journal.push(Undo::Subscription(key.clone(), Some(before)));
        self.state.put_subscription(key, None);
        Ok(true)
    }

    fn subscriptions_of(&mut self, subscriber: SubscriberId) -> Result<Vec<Subscription>> {
        Ok(self
            .state
            .subscriptions
            .values()
            .filter(|s| s.subscriber == subscriber)
            .cloned()
            .collect())
    }

    fn get_or_create_notification(&mut self, draft: NotificationDraft) -> Result<(Notification, bool)> {
        let key = (draft.subscriber, draft.dispatch_key.clone());
        if let Some(id) = self.state.dispatched.get(&key).copied() {
            if let Some(existing) = self.state.notifications.get(&id) {
                return Ok((existing.clone(), false));
            }
        }

        self.state.next_notification += 1;
        let id = NotificationId(self.state.next_notification);
        let notification = Notification {
            id,
            subscriber: draft.subscriber,
            signature: draft.signature,
            title: draft.title,
            description: draft.description,
            activity: draft.activity,
            source: draft.source,
            backlink: draft.backlink,
            dispatch_key: draft.dispatch_key,
            created_at: self.clock.tick(),
            read_at: None,
            delivery: draft.delivery,
        };
        self.journal.push(Undo::Notification(id, None));
        self.state.put_notification(id, Some(notification.clone()));
        Ok((notification, true))
    }

    fn notification(&mut self, id: NotificationId) -> Result<Option<Notification>> {
        Ok(self.state.notifications.get(&id).cloned())
    }

    fn notifications_for(&mut self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        let mut list: Vec<Notification> = self
            .state
            .notifications
            .values()
            .filter(|n| n.subscriber == subscriber)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    fn update_notification(&mut self, notification: &Notification) -> Result<()> {
        let id = notification.id;
        let before = self
            .state
            .notifications
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotificationNotFound(id))?;
        if before.subscriber != notification.subscriber
            || before.dispatch_key != notification.dispatch_key
        {
            return Err(EngineError::InvalidOperation(format!(
                "notification {} identity fields are immutable",
                id
            )));
        }
        self.journal.push(Undo::Notification(id, Some(before)));
        self.state.put_notification(id, Some(notification.clone()));
        Ok(())
    }

    fn delete_notification(&mut self, id: NotificationId) -> Result<bool> {
        let Some(before) = self.state.notifications.get(&id).cloned() else {
            return Ok(false);
        };
        self.journal.push(Undo::Notification(id, Some(before)));
        self.state.put_notification(id, None);
        Ok(true)
    }

    fn delete_notifications_from(&mut self, source: &EntityRef) -> Result<usize> {
        let ids: Vec<NotificationId> = self
            .state
            .notifications
            .values()
            .filter(|n| n.source.as_ref() == Some(source))
            .map(|n| n.id)
            .collect();
        for id in &ids {
            self.delete_notification(*id)?;
        }
        Ok(ids.len())
    }
}

impl MemoryTx<'_> {
    fn stream_required(&self, id: StreamId) -> Result<&Stream> {
        self.state
            .streams
            .get(&id)
            .ok_or(EngineError::StreamNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::DeliveryStatus;

    fn draft(subscriber: u64, key: &str) -> NotificationDraft {
        NotificationDraft {
            subscriber: SubscriberId(subscriber),
            signature: "ticket-created".into(),
            title: "t".into(),
            description: "d".into(),
            activity: ActivityId(1),
            source: Some(EntityRef::new("ticket", 1)),
            backlink: None,
            dispatch_key: key.into(),
            delivery: DeliveryStatus::NotRequested,
        }
    }

    #[test]
    fn test_get_or_create_stream_is_idempotent() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, created_a) = tx.get_or_create_stream("ticket_1_stream").unwrap();
        let (b, created_b) = tx.get_or_create_stream("ticket_1_stream").unwrap();
        tx.commit().unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a.id, b.id);
        assert_eq!(repo.stream_count(), 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let repo = MemoryRepository::new();
        {
            let mut tx = repo.begin().unwrap();
            let (s, _) = tx.get_or_create_stream("keep").unwrap();
            tx.add_follower(s.id, SubscriberId(1)).unwrap();
            tx.commit().unwrap();
        }
        {
            let mut tx = repo.begin().unwrap();
            let keep = tx.stream_by_slug("keep").unwrap().unwrap();
            tx.add_follower(keep.id, SubscriberId(2)).unwrap();
            let (other, _) = tx.get_or_create_stream("discard").unwrap();
            let activity = tx.insert_activity(ActivityDraft::new("x", "x")).unwrap();
            tx.attach(activity.id, other.id).unwrap();
            tx.get_or_create_notification(draft(1, "1")).unwrap();
            // dropped without commit
        }

        let mut tx = repo.begin().unwrap();
        let keep = tx.stream_by_slug("keep").unwrap().unwrap();
        assert_eq!(keep.followers.len(), 1);
        assert!(tx.stream_by_slug("discard").unwrap().is_none());
        assert_eq!(repo_counts(&mut tx), (0, 0));
    }

    fn repo_counts(tx: &mut MemoryTx<'_>) -> (usize, usize) {
        (tx.state.activities.len(), tx.state.notifications.len())
    }

    #[test]
    fn test_notification_dedup_per_subscriber() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (first, created) = tx.get_or_create_notification(draft(1, "7")).unwrap();
        assert!(created);
        let (again, created) = tx.get_or_create_notification(draft(1, "7")).unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);
        let (_, created) = tx.get_or_create_notification(draft(2, "7")).unwrap();
        assert!(created);
        tx.commit().unwrap();
        assert_eq!(repo.notification_count(), 2);
    }

    #[test]
    fn test_delete_stream_removes_inbound_links() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, _) = tx.get_or_create_stream("a").unwrap();
        let (b, _) = tx.get_or_create_stream("b").unwrap();
        tx.add_link(a.id, b.id).unwrap();
        assert!(tx.delete_stream(b.id).unwrap());
        assert!(tx.stream(a.id).unwrap().unwrap().linked.is_empty());
    }

    #[test]
    fn test_delete_stream_with_attachments_is_rejected() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, _) = tx.get_or_create_stream("a").unwrap();
        let activity = tx.insert_activity(ActivityDraft::new("x", "x")).unwrap();
        tx.attach(activity.id, a.id).unwrap();
        assert!(matches!(
            tx.delete_stream(a.id),
            Err(EngineError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_detach_reports_remaining() {
        let repo = MemoryRepository::new();
        let mut tx = repo.begin().unwrap();
        let (a, _) = tx.get_or_create_stream("a").unwrap();
        let (b, _) = tx.get_or_create_stream("b").unwrap();
        let activity = tx.insert_activity(ActivityDraft::new("x", "x")).unwrap();
        tx.attach(activity.id, a.id).unwrap();
        tx.attach(activity.id, b.id).unwrap();

        assert_eq!(tx.detach(activity.id, a.id).unwrap(), Some(1));
        assert_eq!(tx.detach(activity.id, a.id).unwrap(), None);
        assert_eq!(tx.activities_on(b.id).unwrap(), vec![activity.id]);
        assert!(tx.activities_on(a.id).unwrap().is_empty());
    }
}
