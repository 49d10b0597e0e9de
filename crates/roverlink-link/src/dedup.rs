use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Bounded history of recently seen message ids.
///
/// An id is remembered until it is pushed out by `capacity` newer ids or,
/// when a window is set, until it is older than the window.
#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    window: Option<Duration>,
    order: VecDeque<(u32, Instant)>,
    seen: HashSet<u32>,
}

impl DedupWindow {
    pub fn new(capacity: usize, window: Option<Duration>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record `id` at `now`. Returns `false` if it was already in the window.
    pub fn observe_at(&mut self, id: u32, now: Instant) -> bool {
        self.expire(now);
        if self.seen.contains(&id) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back((id, now));
        self.seen.insert(id);
        true
    }

    fn expire(&mut self, now: Instant) {
        let Some(window) = self.window else {
            return;
        };
        while let Some(&(id, at)) = self.order.front() {
            if now.saturating_duration_since(at) < window {
                break;
            }
            self.order.pop_front();
            self.seen.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
