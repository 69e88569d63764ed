//! Subscriptions, notification dispatch and the notification records.
//!
//! A notification is created for a follower of one of an activity's streams
//! only if the follower holds a [`Subscription`] for the activity's
//! signature. At most one notification exists per subscriber and activity.

mod dispatcher;
mod matcher;
mod types;

pub use dispatcher::{DispatchReport, MailJob, NotificationDispatcher};
pub use matcher::{Match, SubscriptionMatcher, DEFAULT_MAX_FANOUT};
pub use types::{dispatch_key, DeliveryStatus, Notification, NotificationDraft, Subscription};
