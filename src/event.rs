//! Cross-thread notifications for the analyzer
//!
//! Hotplug, blank and video state changes arrive on whatever thread noticed
//! them. They are queued here and applied on the composition thread at the
//! start of the next `analyze()`.

use std::sync::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Hotplug { connected: bool },
    Blank { blank: bool },
    VideoState { preparing: bool, playing: bool },
}

/// FIFO of pending events, shared between producers and the composition thread
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<Vec<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event; the lock is held only for the push
    pub fn post(&self, event: Event) {
        trace!(?event, "Posting event");
        self.lock().push(event);
    }

    /// Take every pending event, leaving the queue empty
    pub fn take_all(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock())
    }

    /// Take every pending event and hand each to `apply` in post order
    ///
    /// `apply` runs after the lock is released, so it may post new events;
    /// those are picked up by the next drain.
    pub fn drain_and_apply(&self, mut apply: impl FnMut(Event)) -> usize {
        let events = self.take_all();
        let count = events.len();
        for event in events {
            apply(event);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panicking producer can't leave the Vec half-pushed
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
