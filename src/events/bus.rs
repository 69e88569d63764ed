//! Event bus broadcasting engine events to observers.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DropReason, EngineEvent, ObserverFilter, ObserverHandle, ObserverId};

/// Default observer buffer, in events.
pub const DEFAULT_OBSERVER_BUFFER: usize = 1000;

struct Observer {
    filter: ObserverFilter,
    sender: Sender<EngineEvent>,
}

impl Observer {
    /// Returns false if the buffer is full or the receiver is gone.
    fn try_send(&self, event: EngineEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Fans committed engine events out to registered observers.
///
/// Observers that fall behind are dropped rather than slowing the event
/// path down.
pub struct EventBus {
    observers: RwLock<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register an observer.
    pub fn observe(&self, filter: ObserverFilter) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);
        self.observers
            .write()
            .insert(id, Observer { filter, sender });
        ObserverHandle { id, receiver }
    }

    /// Remove an observer.
    pub fn unobserve(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            let _ = observer.sender.try_send(EngineEvent::Dropped {
                reason: DropReason::Unobserved,
            });
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Broadcast events in order. Drops observers that fail to receive.
    pub fn publish(&self, events: &[EngineEvent]) {
        if events.is_empty() {
            return;
        }

        let mut to_remove = Vec::new();
        {
            let observers = self.observers.read();
            if observers.is_empty() {
                return;
            }
            for (id, observer) in observers.iter() {
                for event in events.iter().filter(|e| observer.filter.matches(e)) {
                    if !observer.try_send(event.clone()) {
                        to_remove.push(*id);
                        break;
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut observers = self.observers.write();
            for id in to_remove {
                if let Some(observer) = observers.remove(&id) {
                    tracing::warn!(observer = id.0, "dropping slow event observer");
                    let _ = observer.sender.try_send(EngineEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }

    pub fn broadcast(&self, event: EngineEvent) {
        self.publish(std::slice::from_ref(&event));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_BUFFER)
    }
}
