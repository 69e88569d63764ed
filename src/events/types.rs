//! Event and observer types for the in-process event bus.

use crate::activities::Activity;
use crate::notifications::Notification;
use crate::types::{ActivityId, EntityRef, NotificationId, StreamId, SubscriberId, Timestamp};
use serde::{Deserialize, Serialize};

/// Which events an observer receives.
#[derive(Clone, Debug, Default)]
pub struct ObserverFilter {
    /// Only events with one of these signatures (None = all).
    pub signatures: Option<Vec<String>>,

    /// Only notification and mail events for these subscribers (None = all).
    pub subscribers: Option<Vec<SubscriberId>>,

    /// Include activity recorded / collected events.
    pub include_activities: bool,

    /// Include notification created events.
    pub include_notifications: bool,

    /// Include stream deleted events.
    pub include_streams: bool,

    /// Include mail failure events.
    pub include_mail: bool,
}

impl ObserverFilter {
    /// Every activity event.
    pub fn activities() -> Self {
        Self {
            include_activities: true,
            ..Default::default()
        }
    }

    /// Every notification event.
    pub fn notifications() -> Self {
        Self {
            include_notifications: true,
            include_mail: true,
            ..Default::default()
        }
    }

    /// Notification and mail events of one subscriber.
    pub fn subscriber(subscriber: SubscriberId) -> Self {
        Self {
            subscribers: Some(vec![subscriber]),
            ..Self::notifications()
        }
    }

    /// Activity and notification events with these signatures.
    pub fn signatures(signatures: Vec<String>) -> Self {
        Self {
            signatures: Some(signatures),
            include_activities: true,
            include_notifications: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            include_activities: true,
            include_notifications: true,
            include_streams: true,
            include_mail: true,
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, event: &EngineEvent) -> bool {
        match event {
            EngineEvent::ActivityRecorded { activity } => {
                self.include_activities && self.signature_allowed(&activity.signature)
            }
            EngineEvent::ActivityCollected { .. } => {
                self.include_activities && self.signatures.is_none()
            }
            EngineEvent::NotificationCreated { notification } => {
                self.include_notifications
                    && self.signature_allowed(&notification.signature)
                    && self.subscriber_allowed(notification.subscriber)
            }
            EngineEvent::StreamDeleted { .. } => self.include_streams,
            EngineEvent::MailFailed { subscriber, .. } => {
                self.include_mail && self.subscriber_allowed(*subscriber)
            }
            EngineEvent::Dropped { .. } => true,
        }
    }

    fn signature_allowed(&self, signature: &str) -> bool {
        self.signatures
            .as_ref()
            .map_or(true, |s| s.iter().any(|x| x == signature))
    }

    fn subscriber_allowed(&self, subscriber: SubscriberId) -> bool {
        self.subscribers
            .as_ref()
            .map_or(true, |s| s.contains(&subscriber))
    }
}

/// Events broadcast to observers after a transaction commits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An activity was recorded and attached to its streams.
    ActivityRecorded { activity: ActivitySummary },

    /// An activity lost its last stream and was deleted.
    ActivityCollected { activity: ActivityId },

    /// A notification was created for a subscriber.
    NotificationCreated { notification: NotificationSummary },

    /// A stream was deleted with its owning entity.
    StreamDeleted { stream: StreamId, slug: String },

    /// Handing a notification's email to the mailer failed.
    MailFailed {
        notification: NotificationId,
        subscriber: SubscriberId,
        reason: String,
    },

    /// The observer was dropped.
    Dropped { reason: DropReason },
}

/// Why an observer was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly removed.
    Unobserved,
}

/// Summary of an activity with its title rendered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: ActivityId,
    pub signature: String,
    pub title: String,
    pub source: Option<EntityRef>,
    pub streams: Vec<StreamId>,
    pub created_at: Timestamp,
}

impl ActivitySummary {
    /// Falls back to the raw title template if the context cannot be decoded.
    pub fn from_activity(activity: &Activity) -> Self {
        Self {
            id: activity.id,
            signature: activity.signature.clone(),
            title: activity
                .render_title()
                .unwrap_or_else(|_| activity.title.clone()),
            source: activity.source.clone(),
            streams: activity.streams.iter().copied().collect(),
            created_at: activity.created_at,
        }
    }
}

/// Summary of a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub id: NotificationId,
    pub subscriber: SubscriberId,
    pub signature: String,
    pub activity: ActivityId,
    pub title: String,
    pub created_at: Timestamp,
}

impl From<&Notification> for NotificationSummary {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            subscriber: n.subscriber,
            signature: n.signature.clone(),
            activity: n.activity,
            title: n.title.clone(),
            created_at: n.created_at,
        }
    }
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Receiving end of an observer.
pub struct ObserverHandle {
    pub id: ObserverId,
    pub receiver: crossbeam_channel::Receiver<EngineEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<EngineEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<EngineEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<EngineEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.receiver.try_iter().collect()
    }
}
