//! Change tracking for domain entities.
//!
//! A kind is enabled once at start-up with a [`TrackingProfile`]; entities
//! of that kind are then wrapped in an [`Observed`] handle whose writes are
//! diffed between saves.
//!
//! # Example
//!
//! ```ignore
//! registry.enable(TrackingProfile::new("ticket").label("assignee_id", "assignee"));
//!
//! let mut ticket = registry.attach(ticket)?;
//! ticket.set("status", |t| &mut t.status, "closed".to_string());
//! let diff = ticket.flush();
//! ```

mod entity;
mod observed;
mod registry;

pub use entity::{StreamOwner, Trackable};
pub use observed::{ChangeSet, FieldChange, FieldText, Observed};
pub use registry::{TrackingProfile, TrackingRegistry};
