//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use activity_streams::{
    Engine, EngineConfig, EntityRef, MailError, MailMessage, MailMode, Mailer, Principal,
    StaticDirectory, StreamOwner, SubscriberId, Trackable, TrackingProfile,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const ALICE: SubscriberId = SubscriberId(1);
pub const BOB: SubscriberId = SubscriberId(2);
pub const CAROL: SubscriberId = SubscriberId(3);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Option<u64>,
    pub title: String,
    pub status: String,
    pub priority: u8,
    pub assignee: Option<SubscriberId>,
    pub project: Option<u64>,
    pub stream: Option<u64>,
}

impl Ticket {
    pub fn new(id: u64, title: &str) -> Self {
        Self {
            id: Some(id),
            title: title.to_string(),
            status: "open".to_string(),
            priority: 3,
            assignee: None,
            project: None,
            stream: None,
        }
    }

    pub fn reference(&self) -> EntityRef {
        EntityRef::new("ticket", self.id.unwrap_or_default())
    }
}

impl Trackable for Ticket {
    fn kind(&self) -> &str {
        "ticket"
    }

    fn entity_id(&self) -> Option<u64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.title.clone()
    }

    fn backlink(&self) -> Option<String> {
        self.id.map(|id| format!("/tickets/{}", id))
    }
}

impl StreamOwner for Ticket {
    fn followers(&self) -> Vec<SubscriberId> {
        self.assignee.into_iter().collect()
    }

    fn related(&self) -> Vec<EntityRef> {
        self.project
            .map(|id| EntityRef::new("project", id))
            .into_iter()
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Project {
    pub id: Option<u64>,
    pub name: String,
    pub manager: Option<SubscriberId>,
}

impl Trackable for Project {
    fn kind(&self) -> &str {
        "project"
    }

    fn entity_id(&self) -> Option<u64> {
        self.id
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl StreamOwner for Project {
    fn followers(&self) -> Vec<SubscriberId> {
        self.manager.into_iter().collect()
    }
}

/// Records every message; rejects addresses ending in `@invalid`.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.to.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &MailMessage, _timeout: Duration) -> Result<(), MailError> {
        if message.to.ends_with("@invalid") {
            return Err(MailError::Rejected {
                address: message.to.clone(),
                reason: "unknown domain".into(),
            });
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Fails every send.
pub struct DownMailer;

impl Mailer for DownMailer {
    fn send(&self, _message: &MailMessage, _timeout: Duration) -> Result<(), MailError> {
        Err(MailError::Transport("connection refused".into()))
    }
}

pub fn directory() -> Arc<StaticDirectory> {
    let directory = Arc::new(StaticDirectory::new());
    directory.insert(
        Principal::new(ALICE, "alice")
            .with_email("alice@example.com")
            .with_link("/users/alice"),
    );
    directory.insert(Principal::new(BOB, "bob").with_email("bob@example.com"));
    directory.insert(Principal::new(CAROL, "carol"));
    directory
}

/// Engine with inline mail, tracking tickets and projects.
pub fn engine_with(directory: Arc<StaticDirectory>, mailer: Arc<dyn Mailer>, mode: MailMode) -> Engine {
    init_tracing();
    let engine = Engine::in_memory(EngineConfig {
        sender_address: "erp@example.com".into(),
        mail_mode: mode,
        ..Default::default()
    })
    .with_directory(directory)
    .with_mailer(mailer)
    .unwrap();
    engine
        .tracking()
        .enable(TrackingProfile::new("ticket").label("assignee", "assigned to"));
    engine.tracking().enable(TrackingProfile::new("project"));
    engine
}

pub fn engine(mailer: Arc<RecordingMailer>) -> (Engine, Arc<StaticDirectory>) {
    let directory = directory();
    let engine = engine_with(Arc::clone(&directory), mailer, MailMode::Inline);
    (engine, directory)
}
