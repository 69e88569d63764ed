//! Notification dispatch: one activity in, one notification per subscriber out.

use super::matcher::{Match, SubscriptionMatcher};
use super::types::{dispatch_key, DeliveryStatus, Notification, NotificationDraft};
use crate::activities::Activity;
use crate::directory::Directory;
use crate::error::{MailError, Result};
use crate::mail::MailMessage;
use crate::repo::RepoTx;
use crate::streams::Stream;
use crate::types::NotificationId;

/// Email to hand off once the dispatching transaction commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailJob {
    pub notification: NotificationId,
    pub message: MailMessage,
}

/// Outcome of dispatching one activity.
#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    /// Notifications created by this dispatch.
    pub created: Vec<Notification>,
    /// Notifications that already existed for the same dispatch key.
    pub existing: Vec<NotificationId>,
    /// Emails for newly created notifications.
    pub mail: Vec<MailJob>,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.existing.is_empty()
    }

    /// Merge another report into this one.
    pub fn extend(&mut self, other: DispatchReport) {
        self.created.extend(other.created);
        self.existing.extend(other.existing);
        self.mail.extend(other.mail);
    }
}

/// Creates notifications for the subscribed followers of an activity's streams.
///
/// Dispatch is idempotent: notifications are keyed by subscriber and
/// activity, so dispatching the same activity twice creates nothing new and
/// queues no mail.
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    matcher: SubscriptionMatcher,
    sender_address: String,
    html: bool,
}

impl NotificationDispatcher {
    pub fn new(matcher: SubscriptionMatcher, sender_address: impl Into<String>, html: bool) -> Self {
        Self {
            matcher,
            sender_address: sender_address.into(),
            html,
        }
    }

    pub fn matcher(&self) -> &SubscriptionMatcher {
        &self.matcher
    }

    /// Dispatch to the followers of the activity's current streams.
    pub fn dispatch_attached<T: RepoTx + ?Sized>(
        &self,
        tx: &mut T,
        activity: &Activity,
        directory: &dyn Directory,
    ) -> Result<DispatchReport> {
        let streams = self.matcher.streams_of(tx, activity)?;
        self.dispatch(tx, activity, &streams, directory)
    }

    /// Dispatch to the followers of `streams`.
    ///
    /// The streams are passed in rather than loaded so a deleted entity's
    /// captured streams can still be notified after they are gone.
    pub fn dispatch<T: RepoTx + ?Sized>(
        &self,
        tx: &mut T,
        activity: &Activity,
        streams: &[Stream],
        directory: &dyn Directory,
    ) -> Result<DispatchReport> {
        let matches = self.matcher.match_followers(tx, activity, streams)?;
        let mut report = DispatchReport::default();
        if matches.is_empty() {
            return Ok(report);
        }

        let title = activity.render_title()?;
        let description = activity.render_description()?;
        let key = dispatch_key(activity.id);

        for Match {
            subscriber,
            send_email,
        } in matches
        {
            let address = if send_email {
                directory.principal(subscriber).and_then(|p| p.email)
            } else {
                None
            };
            let delivery = match (send_email, &address) {
                (false, _) => DeliveryStatus::NotRequested,
                (true, Some(_)) => DeliveryStatus::Pending,
                (true, None) => DeliveryStatus::Failed {
                    reason: MailError::NoAddress.to_string(),
                },
            };

            let draft = NotificationDraft {
                subscriber,
                signature: activity.signature.clone(),
                title: title.clone(),
                description: description.clone(),
                activity: activity.id,
                source: activity.source.clone(),
                backlink: activity.backlink.clone(),
                dispatch_key: key.clone(),
                delivery,
            };

            let (notification, created) = tx.get_or_create_notification(draft)?;
            debug_assert_eq!(notification.signature, activity.signature);
            if !created {
                report.existing.push(notification.id);
                continue;
            }

            if send_email && address.is_none() {
                tracing::warn!(
                    subscriber = %subscriber,
                    notification = %notification.id,
                    "subscriber wants email but has no address"
                );
            }
            if let Some(to) = address {
                report.mail.push(MailJob {
                    notification: notification.id,
                    message: MailMessage {
                        from: self.sender_address.clone(),
                        to,
                        subject: notification.title.clone(),
                        body: notification.description.clone(),
                        html: self.html,
                    },
                });
            }
            report.created.push(notification);
        }

        tracing::debug!(
            activity = %activity.id,
            signature = %activity.signature,
            created = report.created.len(),
            existing = report.existing.len(),
            "dispatched notifications"
        );
        Ok(report)
    }
}
