//! Bounded recency set for suppressing repeated log lines

use std::collections::{HashSet, VecDeque};

/// Default number of keys remembered
pub const DEFAULT_CAPACITY: usize = 256;

/// Insertion-ordered set holding at most `capacity` keys.
///
/// When full, inserting a new key forgets the oldest one. As long as the
/// capacity is at least the number of lines a single read can present, a key
/// that is still visible in the tail window is never forgotten.
#[derive(Debug, Clone)]
pub struct RecentSet {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl RecentSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
        }
    }

    /// Insert a key. Returns `true` if it was not already present.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }

        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }

        self.order.push_back(key.to_string());
        self.keys.insert(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecentSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_new_keys_once() {
        let mut set = RecentSet::new(4);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_oldest_key_evicted_at_capacity() {
        let mut set = RecentSet::new(2);
        set.insert("a");
        set.insert("b");
        set.insert("c");
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("c"));
        assert_eq!(set.len(), 2);

        // Forgotten keys count as new again
        assert!(set.insert("a"));
    }

    #[test]
    fn test_repeat_insert_does_not_refresh_position() {
        let mut set = RecentSet::new(2);
        set.insert("a");
        set.insert("b");
        set.insert("a");
        set.insert("c");
        assert!(!set.contains("a"));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut set = RecentSet::new(0);
        assert_eq!(set.capacity(), 1);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
    }
}
