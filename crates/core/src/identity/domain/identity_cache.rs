use std::collections::{HashMap, HashSet};

use super::track_key::TrackKey;

/// Per-session mapping from track key to the last confidently resolved
/// identity label.
///
/// Owned by exactly one session; never shared.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<TrackKey, String>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TrackKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Records a confident identification, replacing any earlier label.
    pub fn insert(&mut self, key: TrackKey, label: impl Into<String>) {
        self.entries.insert(key, label.into());
    }

    /// Drops tracked entries whose tracker id is no longer retained.
    ///
    /// A forgotten tracker id is never reissued, so its entry is
    /// unreachable. External and positional entries are kept.
    pub fn retain_tracked(&mut self, live_ids: &HashSet<u32>) {
        self.entries.retain(|key, _| match key {
            TrackKey::Tracked(id) => live_ids.contains(id),
            TrackKey::External(_) | TrackKey::Positional(_) => true,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = IdentityCache::new();
        assert!(cache.get(&TrackKey::Tracked(1)).is_none());

        cache.insert(TrackKey::Tracked(1), "Alice");
        assert_eq!(cache.get(&TrackKey::Tracked(1)), Some("Alice"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut cache = IdentityCache::new();
        cache.insert(TrackKey::Tracked(1), "Alice");
        cache.insert(TrackKey::Tracked(1), "Bob");
        assert_eq!(cache.get(&TrackKey::Tracked(1)), Some("Bob"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_tracked_and_positional_keys_are_distinct() {
        let mut cache = IdentityCache::new();
        cache.insert(TrackKey::Tracked(0), "Alice");
        assert!(cache.get(&TrackKey::Positional(0)).is_none());
    }

    #[test]
    fn test_retain_tracked_prunes_forgotten_ids() {
        let mut cache = IdentityCache::new();
        cache.insert(TrackKey::Tracked(1), "Alice");
        cache.insert(TrackKey::Tracked(2), "Bob");
        cache.insert(TrackKey::Positional(0), "Carol");

        cache.retain_tracked(&HashSet::from([2]));

        assert!(cache.get(&TrackKey::Tracked(1)).is_none());
        assert_eq!(cache.get(&TrackKey::Tracked(2)), Some("Bob"));
        assert_eq!(cache.get(&TrackKey::Positional(0)), Some("Carol"));
    }

    #[test]
    fn test_clear() {
        let mut cache = IdentityCache::new();
        cache.insert(TrackKey::Tracked(1), "Alice");
        cache.clear();
        assert!(cache.is_empty());
    }
}
