//! Persistence contract consumed by the engine.
//!
//! The engine never stores anything itself. Every read and write goes
//! through a [`RepoTx`] opened from a [`Repository`]:
//!
//! 1. `begin()` opens a transaction
//! 2. record operations run against `&mut tx`
//! 3. `tx.commit()` makes them visible; dropping `tx` uncommitted rolls back
//!
//! Implementations must serialize writers per key (row locks, or a single
//! writer) so concurrent events touching the same stream or activity do not
//! lose updates. Get-or-create operations resolve a duplicate-key race by
//! returning the existing record.

mod memory;

pub use memory::{MemoryRepository, MemoryTx};

use crate::activities::{Activity, ActivityDraft};
use crate::error::Result;
use crate::notifications::{Notification, NotificationDraft, Subscription};
use crate::streams::Stream;
use crate::types::{ActivityId, EntityRef, NotificationId, StreamId, SubscriberId};

/// A source of transactions.
pub trait Repository: Send + Sync + 'static {
    type Tx<'a>: RepoTx
    where
        Self: 'a;

    /// Open a transaction.
    fn begin(&self) -> Result<Self::Tx<'_>>;
}

/// Record operations inside one transaction.
pub trait RepoTx {
    /// Commit, consuming the transaction.
    fn commit(self) -> Result<()>
    where
        Self: Sized;

    // ── Streams ──────────────────────────────────────────────────────────────

    /// Get the stream with this slug, creating it if absent.
    /// The flag is true when the stream was created by this call.
    fn get_or_create_stream(&mut self, slug: &str) -> Result<(Stream, bool)>;

    fn stream(&mut self, id: StreamId) -> Result<Option<Stream>>;

    fn stream_by_slug(&mut self, slug: &str) -> Result<Option<Stream>>;

    /// Returns false if already a follower.
    fn add_follower(&mut self, stream: StreamId, subscriber: SubscriberId) -> Result<bool>;

    fn remove_follower(&mut self, stream: StreamId, subscriber: SubscriberId) -> Result<bool>;

    /// Add `to` to `from.linked`. Returns false if already linked.
    fn add_link(&mut self, from: StreamId, to: StreamId) -> Result<bool>;

    fn remove_link(&mut self, from: StreamId, to: StreamId) -> Result<bool>;

    /// Delete a stream and every link pointing at it.
    ///
    /// Activity attachments must already be removed.
    fn delete_stream(&mut self, id: StreamId) -> Result<bool>;

    /// Activities currently attached to a stream, oldest first.
    fn activities_on(&mut self, stream: StreamId) -> Result<Vec<ActivityId>>;

    // ── Activities ───────────────────────────────────────────────────────────

    /// Insert an activity with no streams attached.
    fn insert_activity(&mut self, draft: ActivityDraft) -> Result<Activity>;

    fn activity(&mut self, id: ActivityId) -> Result<Option<Activity>>;

    /// Returns false if already attached.
    fn attach(&mut self, activity: ActivityId, stream: StreamId) -> Result<bool>;

    /// Remove one attachment. Returns the number of streams left, or `None`
    /// if the activity was not attached to that stream.
    fn detach(&mut self, activity: ActivityId, stream: StreamId) -> Result<Option<usize>>;

    fn delete_activity(&mut self, id: ActivityId) -> Result<bool>;

    // ── Subscriptions ────────────────────────────────────────────────────────

    fn subscription(&mut self, subscriber: SubscriberId, signature: &str) -> Result<Option<Subscription>>;

    /// Insert or replace; returns the previous subscription for the pair.
    fn put_subscription(&mut self, subscription: Subscription) -> Result<Option<Subscription>>;

    fn delete_subscription(&mut self, subscriber: SubscriberId, signature: &str) -> Result<bool>;

    /// Subscriptions of one subscriber, ordered by signature.
    fn subscriptions_of(&mut self, subscriber: SubscriberId) -> Result<Vec<Subscription>>;

    // ── Notifications ────────────────────────────────────────────────────────

    /// Get the notification keyed by `(subscriber, dispatch_key)`, creating it
    /// from the draft if absent. The flag is true when it was created.
    fn get_or_create_notification(&mut self, draft: NotificationDraft) -> Result<(Notification, bool)>;

    fn notification(&mut self, id: NotificationId) -> Result<Option<Notification>>;

    /// Newest first; ties broken by ascending id.
    fn notifications_for(&mut self, subscriber: SubscriberId) -> Result<Vec<Notification>>;

    /// Persist mutable notification state (read marker, delivery status).
    fn update_notification(&mut self, notification: &Notification) -> Result<()>;

    fn delete_notification(&mut self, id: NotificationId) -> Result<bool>;

    /// Delete every notification about `source`. Returns how many.
    fn delete_notifications_from(&mut self, source: &EntityRef) -> Result<usize>;
}
