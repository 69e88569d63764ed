//! Subscription and notification records.

use crate::types::{ActivityId, EntityRef, NotificationId, SubscriberId, Timestamp};
use serde::{Deserialize, Serialize};

/// A subscriber's opt-in to one signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber: SubscriberId,
    pub signature: String,
    pub send_email: bool,
}

impl Subscription {
    pub fn new(subscriber: SubscriberId, signature: impl Into<String>, send_email: bool) -> Self {
        Self {
            subscriber,
            signature: signature.into(),
            send_email,
        }
    }
}

/// Email hand-off state of a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    NotRequested,
    Pending,
    Sent,
    Failed { reason: String },
}

/// One delivery of an activity to one subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub subscriber: SubscriberId,
    pub signature: String,
    pub title: String,
    pub description: String,
    pub activity: ActivityId,
    pub source: Option<EntityRef>,
    pub backlink: Option<String>,

    /// Dedup key, unique per subscriber.
    pub dispatch_key: String,

    pub created_at: Timestamp,
    pub read_at: Option<Timestamp>,
    pub delivery: DeliveryStatus,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Input for a new notification (before id and timestamp are assigned).
#[derive(Clone, Debug)]
pub struct NotificationDraft {
    pub subscriber: SubscriberId,
    pub signature: String,
    pub title: String,
    pub description: String,
    pub activity: ActivityId,
    pub source: Option<EntityRef>,
    pub backlink: Option<String>,
    pub dispatch_key: String,
    pub delivery: DeliveryStatus,
}

/// Dedup key of the notifications derived from an activity.
pub fn dispatch_key(activity: ActivityId) -> String {
    activity.0.to_string()
}
