//! Background mail outbox.

use super::{MailMessage, Mailer};
use crate::error::{MailError, Result};
use crate::types::NotificationId;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Receives the outcome of every send attempted by the outbox.
pub type DeliveryReporter =
    Arc<dyn Fn(NotificationId, std::result::Result<(), MailError>) + Send + Sync>;

struct OutboxJob {
    notification: NotificationId,
    message: MailMessage,
}

/// Count of queued or in-progress jobs, with a condvar signalled on change.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    changed: Condvar,
}

impl InFlight {
    fn inc(&self) {
        *self.count.lock() += 1;
    }

    fn dec(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        self.changed.notify_all();
    }
}

/// Bounded queue of outgoing mail served by one worker thread.
///
/// A full queue rejects new mail with [`MailError::QueueFull`] instead of
/// blocking the caller.
pub struct MailOutbox {
    sender: Option<Sender<OutboxJob>>,
    worker: Option<JoinHandle<()>>,
    in_flight: Arc<InFlight>,
}

impl MailOutbox {
    /// Start the worker thread.
    pub fn start(
        mailer: Arc<dyn Mailer>,
        queue_size: usize,
        timeout: Duration,
        reporter: DeliveryReporter,
    ) -> Result<Self> {
        let (sender, receiver) = bounded::<OutboxJob>(queue_size.max(1));
        let in_flight = Arc::new(InFlight::default());
        let worker_in_flight = Arc::clone(&in_flight);

        let worker = thread::Builder::new()
            .name("mail-outbox".into())
            .spawn(move || {
                for job in receiver.iter() {
                    let result = mailer.send(&job.message, timeout);
                    reporter(job.notification, result);
                    worker_in_flight.dec();
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            in_flight,
        })
    }

    /// Queue a message without blocking.
    pub fn enqueue(
        &self,
        notification: NotificationId,
        message: MailMessage,
    ) -> std::result::Result<(), MailError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(MailError::Transport("outbox is shut down".into()));
        };

        self.in_flight.inc();
        match sender.try_send(OutboxJob {
            notification,
            message,
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.in_flight.dec();
                Err(MailError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.in_flight.dec();
                Err(MailError::Transport("outbox worker stopped".into()))
            }
        }
    }

    /// Jobs queued or being sent.
    pub fn pending(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Wait until every queued job has been attempted. Returns false on timeout.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            if self
                .in_flight
                .changed
                .wait_until(&mut count, deadline)
                .timed_out()
            {
                return *count == 0;
            }
        }
        true
    }

    /// Drain for up to `timeout`, then stop the worker.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        let drained = self.drain(timeout);
        self.close();
        drained
    }

    fn close(&mut self) {
        // Closing the channel ends the worker loop once the queue is empty.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("mail outbox worker panicked");
            }
        }
    }
}

impl Drop for MailOutbox {
    fn drop(&mut self) {
        self.close();
    }
}
