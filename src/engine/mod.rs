//! Engine tying the tracking, stream, activity and notification components
//! together over a repository.

mod config;
mod delivery;
mod scope;

pub use config::EngineConfig;
pub use scope::EventScope;

use self::delivery::Delivery;
use crate::activities::ActivityLog;
use crate::directory::{Directory, NoDirectory};
use crate::error::{EngineError, Result};
use crate::events::{EventBus, ObserverFilter, ObserverHandle, ObserverId};
use crate::mail::Mailer;
use crate::notifications::{
    DispatchReport, Notification, NotificationDispatcher, Subscription, SubscriptionMatcher,
};
use crate::repo::{MemoryRepository, Repository};
use crate::signatures::{SignatureCatalog, COMMENT_CREATED, COMMENT_DELETED};
use crate::streams::StreamRegistry;
use crate::tracking::{Observed, Trackable, TrackingRegistry};
use crate::types::{ActivityId, EntityRef, NotificationId, SubscriberId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

/// The activity and notification engine.
///
/// Domain code reports lifecycle events through [`Engine::transaction`];
/// each call is one unit of work against the repository. Events for
/// observers and mail for subscribers go out only after it commits.
///
/// Engine methods open their own transaction, so they must not be called
/// from inside a transaction closure; use the [`EventScope`] instead. A
/// nested call fails with [`EngineError::InvalidOperation`].
pub struct Engine<R: Repository = MemoryRepository> {
    config: EngineConfig,
    repo: Arc<R>,
    bus: Arc<EventBus>,
    signatures: Arc<SignatureCatalog>,
    tracking: TrackingRegistry,
    streams: StreamRegistry,
    log: ActivityLog,
    dispatcher: NotificationDispatcher,
    directory: Arc<dyn Directory>,
    delivery: Delivery,
    /// Threads currently inside [`Engine::transaction`].
    open: Mutex<HashSet<ThreadId>>,
}

impl Engine<MemoryRepository> {
    /// Engine over a fresh in-memory repository.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(MemoryRepository::new(), config)
    }
}

impl<R: Repository> Engine<R> {
    /// Create an engine with no directory and no mailer.
    pub fn new(repo: R, config: EngineConfig) -> Self {
        let signatures = Arc::new(SignatureCatalog::new());
        signatures.register(COMMENT_CREATED, "Comment created");
        signatures.register(COMMENT_DELETED, "Comment deleted");

        let dispatcher = NotificationDispatcher::new(
            SubscriptionMatcher::new(config.max_fanout),
            config.sender_address.clone(),
            config.html_mail,
        );

        Self {
            repo: Arc::new(repo),
            bus: Arc::new(EventBus::new(config.observer_buffer)),
            tracking: TrackingRegistry::new(Arc::clone(&signatures)),
            signatures,
            streams: StreamRegistry::new(),
            log: ActivityLog::new(),
            dispatcher,
            directory: Arc::new(NoDirectory),
            delivery: Delivery::Disabled,
            open: Mutex::new(HashSet::new()),
            config,
        }
    }

    /// Resolve acting principals and email addresses through `directory`.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    /// Hand notification mail to `mailer`, inline or through the background
    /// outbox depending on the configured mail mode.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Result<Self> {
        self.delivery = Delivery::start(
            mailer,
            self.config.mail_mode,
            self.config.mail_timeout,
            &self.repo,
            &self.bus,
        )?;
        tracing::info!(mode = ?self.config.mail_mode, "mail delivery enabled");
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn tracking(&self) -> &TrackingRegistry {
        &self.tracking
    }

    pub fn signatures(&self) -> &SignatureCatalog {
        &self.signatures
    }

    /// Wrap an entity of a tracked kind in a change tracker.
    pub fn attach<E: Trackable>(&self, entity: E) -> Result<Observed<E>> {
        self.tracking.attach(entity)
    }

    /// Run one unit of work.
    ///
    /// Commits if `f` returns `Ok`; rolls everything back if it returns
    /// `Err`. After a successful commit, events are published to observers
    /// and notification mail is handed off.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<EngineError>,
        F: FnOnce(&mut EventScope<'_, R>) -> std::result::Result<T, E>,
    {
        let committed;
        let value = {
            let _open = OpenTransaction::enter(&self.open)?;
            let tx = self.repo.begin()?;
            let mut scope = EventScope::new(self, tx);
            let value = f(&mut scope)?;
            committed = scope.commit()?;
            value
        };

        self.bus.publish(&committed.events);
        self.delivery.deliver(&*self.repo, &self.bus, committed.mail);
        Ok(value)
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    pub fn subscribe(&self, subscriber: SubscriberId, signature: &str, send_email: bool) -> Result<Subscription> {
        self.transaction(|s| s.subscribe(subscriber, signature, send_email))
    }

    pub fn unsubscribe(&self, subscriber: SubscriberId, signature: &str) -> Result<bool> {
        self.transaction(|s| s.unsubscribe(subscriber, signature))
    }

    pub fn subscriptions_of(&self, subscriber: SubscriberId) -> Result<Vec<Subscription>> {
        self.transaction(|s| s.subscriptions_of(subscriber))
    }

    // ── Notifications ────────────────────────────────────────────────────────

    /// A subscriber's notifications, newest first.
    pub fn notifications_for(&self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        self.transaction(|s| s.notifications_for(subscriber))
    }

    pub fn unread_for(&self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        self.transaction(|s| s.unread_for(subscriber))
    }

    pub fn read_for(&self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        self.transaction(|s| s.read_for(subscriber))
    }

    pub fn mark_read(&self, subscriber: SubscriberId, id: NotificationId) -> Result<Notification> {
        self.transaction(|s| s.mark_read(subscriber, id))
    }

    pub fn delete_notification(&self, subscriber: SubscriberId, id: NotificationId) -> Result<()> {
        self.transaction(|s| s.delete_notification(subscriber, id))
    }

    pub fn purge_entity(&self, entity: &EntityRef) -> Result<usize> {
        self.transaction(|s| s.purge_entity(entity))
    }

    /// Re-run dispatch for an activity. Idempotent.
    pub fn dispatch(&self, activity: ActivityId) -> Result<DispatchReport> {
        self.transaction(|s| s.dispatch(activity))
    }

    // ── Observers and mail ───────────────────────────────────────────────────

    pub fn observe(&self, filter: ObserverFilter) -> ObserverHandle {
        self.bus.observe(filter)
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.bus.unobserve(id)
    }

    /// Wait for the background outbox to empty. Returns false on timeout.
    pub fn drain_mail(&self, timeout: Duration) -> bool {
        self.delivery.drain(timeout)
    }
}

/// Marks the current thread as inside a transaction until dropped.
struct OpenTransaction<'a> {
    open: &'a Mutex<HashSet<ThreadId>>,
    thread: ThreadId,
}

impl<'a> OpenTransaction<'a> {
    fn enter(open: &'a Mutex<HashSet<ThreadId>>) -> Result<Self> {
        let thread = thread::current().id();
        if !open.lock().insert(thread) {
            return Err(EngineError::InvalidOperation(
                "transaction already open on this thread; use the event scope".into(),
            ));
        }
        Ok(Self { open, thread })
    }
}

impl Drop for OpenTransaction<'_> {
    fn drop(&mut self) {
        self.open.lock().remove(&self.thread);
    }
}
