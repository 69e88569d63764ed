//! Activity log and orphan collection.
//!
//! Activities are immutable records of domain events. They are attached to
//! one or more streams and deleted as soon as they are attached to none.

pub mod collector;
mod log;
mod types;

pub use collector::{CollectOutcome, Detached};
pub use log::{ActivityLog, Propagation};
pub use types::{Activity, ActivityDraft};
