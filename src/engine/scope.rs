//! Unit of work: lifecycle events recorded inside one repository transaction.

use super::Engine;
use crate::activities::{collector, Activity, ActivityDraft, CollectOutcome, Detached, Propagation};
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::events::{ActivitySummary, EngineEvent, NotificationSummary};
use crate::notifications::{DispatchReport, MailJob, Notification, Subscription};
use crate::repo::{RepoTx, Repository};
use crate::signatures::{COMMENT_CREATED, COMMENT_DELETED};
use crate::streams::{Stream, StreamSnapshot};
use crate::tracking::{ChangeSet, Observed, StreamOwner, Trackable};
use crate::types::{ActivityId, Comment, EntityRef, NotificationId, Principal, StreamId, SubscriberId, Timestamp};

/// What a committed unit of work still has to do.
pub(super) struct Committed {
    pub events: Vec<EngineEvent>,
    pub mail: Vec<MailJob>,
}

/// An open unit of work.
///
/// Everything recorded through a scope lands in one repository transaction:
/// it all commits when the closure given to [`Engine::transaction`] returns
/// `Ok`, and none of it persists otherwise. Events and mail are held back
/// until the commit succeeds.
pub struct EventScope<'e, R: Repository> {
    engine: &'e Engine<R>,
    tx: R::Tx<'e>,
    actor: Option<Principal>,
    events: Vec<EngineEvent>,
    mail: Vec<MailJob>,
}

impl<'e, R: Repository> EventScope<'e, R> {
    pub(super) fn new(engine: &'e Engine<R>, tx: R::Tx<'e>) -> Self {
        let actor = engine.directory.current_principal();
        Self {
            engine,
            tx,
            actor,
            events: Vec::new(),
            mail: Vec::new(),
        }
    }

    pub(super) fn commit(self) -> Result<Committed> {
        let EventScope { tx, events, mail, .. } = self;
        tx.commit()?;
        Ok(Committed { events, mail })
    }

    /// Principal the events of this unit of work are attributed to.
    pub fn actor(&self) -> Option<&Principal> {
        self.actor.as_ref()
    }

    /// Override the acting principal (`None` for system-initiated work).
    pub fn set_actor(&mut self, actor: Option<Principal>) {
        self.actor = actor;
    }

    /// The underlying repository transaction.
    pub fn tx(&mut self) -> &mut R::Tx<'e> {
        &mut self.tx
    }

    // ── Lifecycle events ─────────────────────────────────────────────────────

    /// First successful persist of an entity.
    ///
    /// Initializes the entity's stream (re-initializing an existing one
    /// purges the activities attached only to it), registers the entity's
    /// followers, records `<kind>-created` on the own and related streams
    /// plus one hop of links, and dispatches it.
    pub fn record_created<E: StreamOwner>(&mut self, entity: &E) -> Result<Activity> {
        let profile = self.engine.tracking.profile(entity.kind())?;
        let own = persisted(entity)?;

        let init = self.engine.streams.get_or_create(&mut self.tx, &own)?;
        self.collected(&init.purged);

        let mut targets = vec![init.stream.id];
        targets.extend(self.related_streams(entity)?);
        self.register_followers(entity, &targets)?;

        let context = self.describe(entity);
        let (title, template) = match &self.actor {
            Some(_) => (
                "{class} {name} created by {author}",
                "{class} {name} has been created by {author}.",
            ),
            None => ("{class} {name} created", "{class} {name} has been created."),
        };
        let draft = ActivityDraft::new(profile.created_signature(), title)
            .with_template(template)
            .with_context(context)
            .with_backlink(entity.backlink())
            .with_source(own);

        self.record_and_dispatch(draft, &targets, Propagation::Linked)
    }

    /// A save that changed tracked fields. Empty change sets record nothing.
    pub fn record_changed<E: StreamOwner>(&mut self, entity: &E, changes: &ChangeSet) -> Result<Option<Activity>> {
        let profile = self.engine.tracking.profile(entity.kind())?;
        if changes.is_empty() {
            return Ok(None);
        }
        let own = persisted(entity)?;

        let mut targets = vec![self.engine.streams.ensure(&mut self.tx, &own)?.id];
        targets.extend(self.related_streams(entity)?);
        self.register_followers(entity, &targets)?;

        let context = self.describe(entity).with("changes", changes.to_string());
        let draft = ActivityDraft::new(profile.changed_signature(), "{class} {name} changed")
            .with_template("The following attributes of {class} {name} have been changed: {changes}")
            .with_context(context)
            .with_backlink(entity.backlink())
            .with_source(own);

        self.record_and_dispatch(draft, &targets, Propagation::Linked)
            .map(Some)
    }

    /// Flush a tracked entity's pending changes and record them.
    pub fn save<E: StreamOwner>(&mut self, observed: &mut Observed<E>) -> Result<Option<Activity>> {
        let changes = observed.flush();
        self.record_changed(&**observed, &changes)
    }

    /// Copy the entity's own and related streams, followers included.
    pub fn capture_streams<E: StreamOwner>(&mut self, entity: &E) -> Result<StreamSnapshot> {
        let mut entities = Vec::new();
        entities.extend(entity.entity_ref());
        entities.extend(entity.related());
        self.engine.streams.capture(&mut self.tx, &entities)
    }

    /// Deletion of an entity, against streams captured before it went away.
    ///
    /// The activity is attached to whichever captured streams still exist
    /// and dispatched to the followers recorded in the snapshot, so the
    /// followers of a deleted stream still hear about the deletion.
    pub fn record_deleted<E: StreamOwner>(&mut self, entity: &E, snapshot: &StreamSnapshot) -> Result<Activity> {
        let profile = self.engine.tracking.profile(entity.kind())?;

        let mut targets = Vec::with_capacity(snapshot.streams.len());
        for id in snapshot.ids() {
            if self.tx.stream(id)?.is_some() {
                targets.push(id);
            }
        }

        let mut context = Context::new()
            .with("class", entity.kind())
            .with("name", entity.display_name());
        if let Some(actor) = &self.actor {
            context.insert("author", actor.name.clone());
        }
        let mut draft = ActivityDraft::new(profile.deleted_signature(), "{class} {name} deleted")
            .with_template("{class} {name} has been deleted.")
            .with_context(context);
        if let Some(own) = entity.entity_ref() {
            draft = draft.with_source(own);
        }

        let activity = self.engine.log.record(&mut self.tx, draft, &targets, Propagation::None)?;
        self.recorded(&activity);
        if activity.is_orphaned() {
            self.collected(&[activity.id]);
        }

        let report = self.engine.dispatcher.dispatch(
            &mut self.tx,
            &activity,
            &snapshot.streams,
            self.engine.directory.as_ref(),
        )?;
        self.absorb(report);
        Ok(activity)
    }

    /// Capture, delete the entity's own stream, then record the deletion.
    pub fn entity_deleted<E: StreamOwner>(&mut self, entity: &E) -> Result<Activity> {
        self.engine.tracking.profile(entity.kind())?;
        let own = persisted(entity)?;

        let snapshot = self.capture_streams(entity)?;
        if let Some(stream) = self.engine.streams.lookup(&mut self.tx, &own)? {
            self.remove_stream(&stream)?;
        }
        self.record_deleted(entity, &snapshot)
    }

    // ── Comments ─────────────────────────────────────────────────────────────

    /// A comment posted on an entity.
    pub fn record_comment<E: StreamOwner>(&mut self, entity: &E, comment: &Comment) -> Result<Activity> {
        let own = persisted(entity)?;
        let mut targets = vec![self.engine.streams.ensure(&mut self.tx, &own)?.id];
        targets.extend(self.related_streams(entity)?);

        let context = comment_context(entity, comment).with("comment", comment.text.clone());
        let draft = ActivityDraft::new(COMMENT_CREATED, "{author} commented {class} {name}")
            .with_template("{author} has posted a comment to {class} {name}: {comment}")
            .with_context(context)
            .with_backlink(entity.backlink())
            .with_source(own);

        self.record_and_dispatch(draft, &targets, Propagation::Linked)
    }

    /// A comment removed from an entity.
    pub fn record_comment_deleted<E: StreamOwner>(&mut self, entity: &E, comment: &Comment) -> Result<Activity> {
        let own = persisted(entity)?;
        let mut targets = vec![self.engine.streams.ensure(&mut self.tx, &own)?.id];
        targets.extend(self.related_streams(entity)?);

        let draft = ActivityDraft::new(COMMENT_DELETED, "comment deleted")
            .with_template("A comment of {author} has been deleted from {class} {name}.")
            .with_context(comment_context(entity, comment))
            .with_source(own);

        self.record_and_dispatch(draft, &targets, Propagation::Linked)
    }

    /// Record any activity on explicit streams and dispatch it.
    pub fn record(&mut self, draft: ActivityDraft, targets: &[StreamId], propagation: Propagation) -> Result<Activity> {
        self.record_and_dispatch(draft, targets, propagation)
    }

    /// Re-run dispatch for an existing activity. Already notified
    /// subscribers are skipped.
    pub fn dispatch(&mut self, activity: ActivityId) -> Result<DispatchReport> {
        let activity = self
            .tx
            .activity(activity)?
            .ok_or(EngineError::ActivityNotFound(activity))?;
        let report = self.engine.dispatcher.dispatch_attached(
            &mut self.tx,
            &activity,
            self.engine.directory.as_ref(),
        )?;
        self.absorb(report.clone());
        Ok(report)
    }

    /// Attach an existing activity to another stream.
    ///
    /// The activity is forwarded one hop along that stream's links, then
    /// dispatched to the followers of every stream it is now on. Already
    /// notified subscribers are skipped.
    pub fn attach(&mut self, activity: ActivityId, stream: StreamId) -> Result<DispatchReport> {
        let (activity, added) = self.engine.log.attach(&mut self.tx, activity, stream)?;
        if !added {
            return Ok(DispatchReport::default());
        }
        let report = self.engine.dispatcher.dispatch_attached(
            &mut self.tx,
            &activity,
            self.engine.directory.as_ref(),
        )?;
        self.absorb(report.clone());
        Ok(report)
    }

    // ── Streams ──────────────────────────────────────────────────────────────

    /// The entity's stream, if it has one.
    pub fn stream_for(&mut self, entity: &EntityRef) -> Result<Option<Stream>> {
        self.engine.streams.lookup(&mut self.tx, entity)
    }

    /// Follow an entity's stream, creating the stream if needed.
    pub fn follow(&mut self, entity: &EntityRef, subscriber: SubscriberId) -> Result<bool> {
        let stream = self.engine.streams.ensure(&mut self.tx, entity)?;
        self.engine.streams.follow(&mut self.tx, stream.id, subscriber)
    }

    pub fn unfollow(&mut self, entity: &EntityRef, subscriber: SubscriberId) -> Result<bool> {
        match self.engine.streams.lookup(&mut self.tx, entity)? {
            Some(stream) => self.engine.streams.unfollow(&mut self.tx, stream.id, subscriber),
            None => Ok(false),
        }
    }

    /// Forward activities recorded on `from`'s stream to `to`'s stream.
    ///
    /// Directed; call it both ways for mutual propagation.
    pub fn link(&mut self, from: &EntityRef, to: &EntityRef) -> Result<bool> {
        let from = self.engine.streams.ensure(&mut self.tx, from)?;
        let to = self.engine.streams.ensure(&mut self.tx, to)?;
        self.engine.streams.link(&mut self.tx, from.id, to.id)
    }

    pub fn unlink(&mut self, from: &EntityRef, to: &EntityRef) -> Result<bool> {
        let (Some(from), Some(to)) = (
            self.engine.streams.lookup(&mut self.tx, from)?,
            self.engine.streams.lookup(&mut self.tx, to)?,
        ) else {
            return Ok(false);
        };
        self.engine.streams.unlink(&mut self.tx, from.id, to.id)
    }

    /// Delete an entity's stream, collecting activities left without streams.
    pub fn delete_stream(&mut self, entity: &EntityRef) -> Result<Option<CollectOutcome>> {
        match self.engine.streams.lookup(&mut self.tx, entity)? {
            Some(stream) => self.remove_stream(&stream).map(Some),
            None => Ok(None),
        }
    }

    /// Detach an activity from one stream, collecting it if that was its last.
    pub fn detach(&mut self, activity: ActivityId, stream: StreamId) -> Result<Detached> {
        let outcome = collector::detach(&mut self.tx, activity, stream)?;
        if outcome == Detached::Collected {
            self.collected(&[activity]);
        }
        Ok(outcome)
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    /// Opt into a signature, replacing any previous preference.
    pub fn subscribe(&mut self, subscriber: SubscriberId, signature: &str, send_email: bool) -> Result<Subscription> {
        let subscription = Subscription::new(subscriber, signature, send_email);
        self.tx.put_subscription(subscription.clone())?;
        Ok(subscription)
    }

    pub fn unsubscribe(&mut self, subscriber: SubscriberId, signature: &str) -> Result<bool> {
        self.tx.delete_subscription(subscriber, signature)
    }

    pub fn subscriptions_of(&mut self, subscriber: SubscriberId) -> Result<Vec<Subscription>> {
        self.tx.subscriptions_of(subscriber)
    }

    // ── Notifications ────────────────────────────────────────────────────────

    /// Newest first.
    pub fn notifications_for(&mut self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        self.tx.notifications_for(subscriber)
    }

    pub fn unread_for(&mut self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        let mut list = self.tx.notifications_for(subscriber)?;
        list.retain(|n| !n.is_read());
        Ok(list)
    }

    pub fn read_for(&mut self, subscriber: SubscriberId) -> Result<Vec<Notification>> {
        let mut list = self.tx.notifications_for(subscriber)?;
        list.retain(Notification::is_read);
        Ok(list)
    }

    /// Mark a notification read on its first view; later views keep the
    /// original read time.
    pub fn mark_read(&mut self, subscriber: SubscriberId, id: NotificationId) -> Result<Notification> {
        let mut notification = self.owned_notification(subscriber, id)?;
        if notification.read_at.is_none() {
            notification.read_at = Some(Timestamp::now());
            self.tx.update_notification(&notification)?;
        }
        Ok(notification)
    }

    pub fn delete_notification(&mut self, subscriber: SubscriberId, id: NotificationId) -> Result<()> {
        self.owned_notification(subscriber, id)?;
        self.tx.delete_notification(id)?;
        Ok(())
    }

    /// Delete every notification about a permanently purged entity.
    pub fn purge_entity(&mut self, entity: &EntityRef) -> Result<usize> {
        let purged = self.tx.delete_notifications_from(entity)?;
        tracing::debug!(%entity, purged, "notifications purged");
        Ok(purged)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn owned_notification(&mut self, subscriber: SubscriberId, id: NotificationId) -> Result<Notification> {
        let notification = self
            .tx
            .notification(id)?
            .ok_or(EngineError::NotificationNotFound(id))?;
        if notification.subscriber != subscriber {
            return Err(EngineError::InvalidOperation(format!(
                "notification {} does not belong to subscriber {}",
                id, subscriber
            )));
        }
        Ok(notification)
    }

    fn record_and_dispatch(
        &mut self,
        draft: ActivityDraft,
        targets: &[StreamId],
        propagation: Propagation,
    ) -> Result<Activity> {
        let activity = self.engine.log.record(&mut self.tx, draft, targets, propagation)?;
        self.recorded(&activity);
        if activity.is_orphaned() {
            self.collected(&[activity.id]);
            return Ok(activity);
        }

        let report = self.engine.dispatcher.dispatch_attached(
            &mut self.tx,
            &activity,
            self.engine.directory.as_ref(),
        )?;
        self.absorb(report);
        Ok(activity)
    }

    fn remove_stream(&mut self, stream: &Stream) -> Result<CollectOutcome> {
        let outcome = self.engine.streams.delete(&mut self.tx, stream.id)?;
        self.events.push(EngineEvent::StreamDeleted {
            stream: stream.id,
            slug: stream.slug.clone(),
        });
        self.collected(&outcome.deleted);
        Ok(outcome)
    }

    /// Streams of related entities, created lazily.
    fn related_streams<E: StreamOwner>(&mut self, entity: &E) -> Result<Vec<StreamId>> {
        let mut ids = Vec::new();
        for related in entity.related() {
            ids.push(self.engine.streams.ensure(&mut self.tx, &related)?.id);
        }
        Ok(ids)
    }

    fn register_followers<E: StreamOwner>(&mut self, entity: &E, streams: &[StreamId]) -> Result<()> {
        let followers = entity.followers();
        for &stream in streams {
            for &follower in &followers {
                self.engine.streams.follow(&mut self.tx, stream, follower)?;
            }
        }
        Ok(())
    }

    /// Class, name and link of an entity, plus the acting principal if known.
    fn describe<E: Trackable>(&self, entity: &E) -> Context {
        let context = Context::new()
            .with("class", entity.kind())
            .with("name", entity.display_name())
            .with_opt("link", entity.backlink());
        match &self.actor {
            Some(actor) => context
                .with("author", actor.name.clone())
                .with_opt("author_link", actor.link.clone()),
            None => context,
        }
    }

    fn recorded(&mut self, activity: &Activity) {
        self.events.push(EngineEvent::ActivityRecorded {
            activity: ActivitySummary::from_activity(activity),
        });
    }

    fn collected(&mut self, ids: &[ActivityId]) {
        self.events.extend(
            ids.iter()
                .map(|&activity| EngineEvent::ActivityCollected { activity }),
        );
    }

    fn absorb(&mut self, report: DispatchReport) {
        self.events.extend(report.created.iter().map(|n| EngineEvent::NotificationCreated {
            notification: NotificationSummary::from(n),
        }));
        self.mail.extend(report.mail);
    }
}

fn persisted<E: Trackable>(entity: &E) -> Result<EntityRef> {
    entity.entity_ref().ok_or_else(|| EngineError::NotPersisted {
        kind: entity.kind().to_string(),
    })
}

fn comment_context<E: Trackable>(entity: &E, comment: &Comment) -> Context {
    Context::new()
        .with("class", entity.kind())
        .with("name", entity.display_name())
        .with_opt("link", entity.backlink())
        .with("author", comment.author.name.clone())
        .with_opt("author_link", comment.author.link.clone())
}
