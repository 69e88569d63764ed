//! Streams: per-entity fan-out channels.
//!
//! Every tracked entity owns exactly one stream, keyed by a unique slug.
//! Streams carry followers and directed links to other streams; an activity
//! recorded on a stream is forwarded one hop along its links.

mod registry;
mod types;

pub use registry::{slug_for, StreamRegistry};
pub use types::{Stream, StreamInit, StreamSnapshot};
