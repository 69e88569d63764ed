//! Mail hand-off.
//!
//! Email is a best-effort side effect of notification creation. Messages
//! are handed to a [`Mailer`] only after the creating transaction commits,
//! either inline on the caller thread or through a bounded background
//! [`MailOutbox`]. Failures are logged and recorded on the notification;
//! they never undo it.

mod outbox;

pub use outbox::{DeliveryReporter, MailOutbox};

use crate::error::MailError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An outgoing email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Body is HTML rather than plain text.
    pub html: bool,
}

/// Mail transport collaborator.
pub trait Mailer: Send + Sync {
    /// Send one message. Implementations should give up after `timeout`.
    fn send(&self, message: &MailMessage, timeout: Duration) -> Result<(), MailError>;
}

/// Where mail is sent from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailMode {
    /// On the caller thread, after commit.
    Inline,
    /// On a worker thread fed by a bounded queue.
    Background { queue_size: usize },
}

impl Default for MailMode {
    fn default() -> Self {
        MailMode::Background { queue_size: 1024 }
    }
}
