//! Bounded window of recently seen inbound message ids.
//!
//! WhatsApp redelivers webhooks it considers unacknowledged; the same message
//! id must reach the pipeline at most once while it is still in the window.

use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
};

/// Default number of ids remembered before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 5_000;

struct Window {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

/// FIFO set of message ids with a fixed capacity.
pub struct Deduplicator {
    capacity: usize,
    window: Mutex<Window>,
}

impl Deduplicator {
    /// Create a window holding at most `capacity` ids (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window: Mutex::new(Window {
                ids: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Returns `true` if `id` was already recorded; records it otherwise.
    ///
    /// Absent or empty ids are never duplicates and are not recorded.
    pub fn seen(&self, id: Option<&str>) -> bool {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return false;
        };

        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if window.ids.contains(id) {
            return true;
        }

        if window.order.len() >= self.capacity
            && let Some(oldest) = window.order.pop_front()
        {
            window.ids.remove(&oldest);
        }
        window.ids.insert(id.to_string());
        window.order.push_back(id.to_string());
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .order
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
