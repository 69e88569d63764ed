//! # Activity Streams
//!
//! Change tracking, activity streams and deduplicated notification fan-out
//! for domain entities.
//!
//! ## Core Concepts
//!
//! - **Streams**: One fan-out channel per entity, with followers and
//!   directed links to other streams
//! - **Activities**: Immutable records of lifecycle and comment events,
//!   attached to streams and collected once they are attached to none
//! - **Subscriptions**: A subscriber's opt-in to a signature, with an email flag
//! - **Notifications**: At most one per subscriber and activity
//!
//! ## Example
//!
//! ```ignore
//! use activity_streams::{Engine, EngineConfig, TrackingProfile};
//!
//! let engine = Engine::in_memory(EngineConfig::default())
//!     .with_directory(directory)
//!     .with_mailer(mailer)?;
//! engine.tracking().enable(TrackingProfile::new("ticket").exclude("cache"));
//! engine.subscribe(bob, "ticket-created", true)?;
//!
//! // First save
//! engine.transaction(|s| s.record_created(&ticket))?;
//!
//! // Later saves
//! let mut ticket = engine.attach(ticket)?;
//! ticket.set("status", |t| &mut t.status, "closed".to_string());
//! engine.transaction(|s| s.save(&mut ticket))?;
//!
//! for n in engine.unread_for(bob)? {
//!     println!("{}", n.title);
//! }
//! ```

pub mod activities;
pub mod context;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod mail;
pub mod notifications;
pub mod repo;
pub mod signatures;
pub mod streams;
pub mod tracking;
pub mod types;

// Re-exports
pub use activities::{Activity, ActivityDraft, ActivityLog, CollectOutcome, Detached, Propagation};
pub use context::{render, Context, ContextValue};
pub use directory::{Directory, NoDirectory, StaticDirectory};
pub use engine::{Engine, EngineConfig, EventScope};
pub use error::{EngineError, MailError, Result};
pub use events::{
    ActivitySummary, DropReason, EngineEvent, EventBus, NotificationSummary, ObserverFilter,
    ObserverHandle, ObserverId,
};
pub use mail::{MailMessage, MailMode, MailOutbox, Mailer};
pub use notifications::{
    DeliveryStatus, DispatchReport, MailJob, Notification, NotificationDispatcher, Subscription,
    SubscriptionMatcher,
};
pub use repo::{MemoryRepository, RepoTx, Repository};
pub use signatures::{Signature, SignatureCatalog, COMMENT_CREATED, COMMENT_DELETED};
pub use streams::{slug_for, Stream, StreamRegistry, StreamSnapshot};
pub use tracking::{
    ChangeSet, FieldChange, FieldText, Observed, StreamOwner, Trackable, TrackingProfile,
    TrackingRegistry,
};
pub use types::*;
