//! Engine configuration.

use crate::events::DEFAULT_OBSERVER_BUFFER;
use crate::mail::MailMode;
use crate::notifications::DEFAULT_MAX_FANOUT;
use std::time::Duration;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// `From` address of notification emails.
    pub sender_address: String,

    /// Send notification bodies as HTML.
    pub html_mail: bool,

    /// Max (stream, follower) pairs examined per dispatch.
    /// Default: 10_000
    pub max_fanout: usize,

    /// Where mail is sent from once a unit of work commits.
    pub mail_mode: MailMode,

    /// Per-message timeout handed to the mailer.
    pub mail_timeout: Duration,

    /// Buffered events per observer before it is dropped.
    /// Default: 1000
    pub observer_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sender_address: "no-reply@localhost".to_string(),
            html_mail: true,
            max_fanout: DEFAULT_MAX_FANOUT,
            mail_mode: MailMode::default(),
            mail_timeout: Duration::from_secs(30),
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
        }
    }
}
