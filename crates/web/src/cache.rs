//! Bounded page cache.
//!
//! An explicit cache object owned by one fetcher instance — never ambient
//! module-level state. Fixed capacity, oldest-first eviction.

use std::collections::{HashMap, VecDeque};

/// Fixed-capacity URL → content cache with oldest-first eviction.
#[derive(Debug)]
pub struct PageCache {
    capacity: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl PageCache {
    /// Create a cache holding at most `capacity` pages. A zero capacity
    /// degenerates into a cache that never stores anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Look up a page by URL.
    pub fn get(&self, url: &str) -> Option<&String> {
        self.entries.get(url)
    }

    /// Insert a page, evicting the oldest entry when at capacity.
    /// Re-inserting an existing URL refreshes its content but not its age.
    pub fn insert(&mut self, url: impl Into<String>, content: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let url = url.into();
        if self.entries.insert(url.clone(), content.into()).is_some() {
            return;
        }
        self.order.push_back(url);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
                tracing::debug!(url = %evicted, "Evicted page from cache");
            }
        }
    }

    /// Number of pages currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
