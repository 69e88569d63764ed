//! Post-commit mail hand-off and delivery status bookkeeping.

use crate::error::{MailError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::mail::{DeliveryReporter, MailMode, MailOutbox, Mailer};
use crate::notifications::{DeliveryStatus, MailJob};
use crate::repo::{RepoTx, Repository};
use crate::types::{NotificationId, SubscriberId};
use std::sync::Arc;
use std::time::Duration;

pub(super) enum Delivery {
    /// No mailer configured; requested mail is marked failed.
    Disabled,
    Inline {
        mailer: Arc<dyn Mailer>,
        timeout: Duration,
    },
    Outbox(MailOutbox),
}

impl Delivery {
    pub(super) fn start<R: Repository>(
        mailer: Arc<dyn Mailer>,
        mode: MailMode,
        timeout: Duration,
        repo: &Arc<R>,
        bus: &Arc<EventBus>,
    ) -> Result<Self> {
        match mode {
            MailMode::Inline => Ok(Delivery::Inline { mailer, timeout }),
            MailMode::Background { queue_size } => {
                let repo = Arc::clone(repo);
                let bus = Arc::clone(bus);
                let reporter: DeliveryReporter = Arc::new(
                    move |id: NotificationId, result: std::result::Result<(), MailError>| {
                        record_delivery(&*repo, &bus, id, result)
                    },
                );
                let outbox = MailOutbox::start(mailer, queue_size, timeout, reporter)?;
                Ok(Delivery::Outbox(outbox))
            }
        }
    }

    /// Hand off mail for a committed unit of work.
    pub(super) fn deliver<R: Repository>(&self, repo: &R, bus: &EventBus, jobs: Vec<MailJob>) {
        for job in jobs {
            match self {
                Delivery::Disabled => record_delivery(
                    repo,
                    bus,
                    job.notification,
                    Err(MailError::Transport("no mailer configured".into())),
                ),
                Delivery::Inline { mailer, timeout } => {
                    let result = mailer.send(&job.message, *timeout);
                    record_delivery(repo, bus, job.notification, result);
                }
                Delivery::Outbox(outbox) => {
                    if let Err(e) = outbox.enqueue(job.notification, job.message) {
                        record_delivery(repo, bus, job.notification, Err(e));
                    }
                }
            }
        }
    }

    pub(super) fn drain(&self, timeout: Duration) -> bool {
        match self {
            Delivery::Outbox(outbox) => outbox.drain(timeout),
            _ => true,
        }
    }
}

/// Store the outcome of a send on its notification.
///
/// Failures here are logged, never propagated: the notification itself
/// is already committed.
pub(super) fn record_delivery<R: Repository + ?Sized>(
    repo: &R,
    bus: &EventBus,
    id: NotificationId,
    result: std::result::Result<(), MailError>,
) {
    let failure = result.as_ref().err().map(|e| e.to_string());
    if let Some(reason) = &failure {
        tracing::warn!(notification = %id, %reason, "mail delivery failed");
    }

    let status = match &failure {
        None => DeliveryStatus::Sent,
        Some(reason) => DeliveryStatus::Failed {
            reason: reason.clone(),
        },
    };

    match store_status(repo, id, status) {
        Ok(Some(subscriber)) => {
            if let Some(reason) = failure {
                bus.broadcast(EngineEvent::MailFailed {
                    notification: id,
                    subscriber,
                    reason,
                });
            }
        }
        Ok(None) => tracing::debug!(notification = %id, "notification gone before delivery was recorded"),
        Err(e) => tracing::warn!(notification = %id, error = %e, "could not record delivery status"),
    }
}

fn store_status<R: Repository + ?Sized>(
    repo: &R,
    id: NotificationId,
    status: DeliveryStatus,
) -> Result<Option<SubscriberId>> {
    let mut tx = repo.begin()?;
    let Some(mut notification) = tx.notification(id)? else {
        return Ok(None);
    };
    notification.delivery = status;
    tx.update_notification(&notification)?;
    tx.commit()?;
    Ok(Some(notification.subscriber))
}
