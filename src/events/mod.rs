//! In-process event bus.
//!
//! Observers receive what the engine did once a unit of work has committed:
//! - Activities recorded and collected
//! - Notifications created
//! - Streams deleted with their entities
//! - Mail hand-off failures
//!
//! Delivery uses bounded buffers; an observer that falls behind is dropped
//! with [`DropReason::BufferOverflow`].
//!
//! # Example
//!
//! ```ignore
//! let handle = engine.observe(ObserverFilter::subscriber(bob));
//!
//! loop {
//!     match handle.recv() {
//!         Ok(EngineEvent::NotificationCreated { notification }) => println!("{}", notification.title),
//!         Ok(EngineEvent::Dropped { .. }) => break,
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod bus;
mod types;

pub use bus::{EventBus, DEFAULT_OBSERVER_BUFFER};
pub use types::{
    ActivitySummary, DropReason, EngineEvent, NotificationSummary, ObserverFilter, ObserverHandle,
    ObserverId,
};
