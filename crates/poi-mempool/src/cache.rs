//! Insertion-ordered proof cache with a bloom filter over its keys
//!
//! Peers send the serialized filter of what they already hold; the cache
//! answers with the entries missing from it, oldest first.

use indexmap::IndexMap;
use poi_core::{BloomFilter, CountingBloomFilter, PeerFilter, Result};

/// Filter variant backing a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Insert-only entries
    Standard,
    /// Entries removed later by the pruner
    Counting,
}

#[derive(Debug, Clone)]
enum KeyFilter {
    Standard(BloomFilter),
    Counting(CountingBloomFilter),
}

/// Cached proofs keyed by dedup key.
#[derive(Debug, Clone)]
pub struct ProofCache<T> {
    entries: IndexMap<String, T>,
    filter: KeyFilter,
}

impl<T: Clone> ProofCache<T> {
    /// Empty cache with the network-wide filter geometry.
    pub fn new(kind: FilterKind) -> Self {
        let filter = match kind {
            FilterKind::Standard => KeyFilter::Standard(BloomFilter::new()),
            FilterKind::Counting => KeyFilter::Counting(CountingBloomFilter::new()),
        };
        Self {
            entries: IndexMap::new(),
            filter,
        }
    }

    /// Filter variant.
    pub fn kind(&self) -> FilterKind {
        match self.filter {
            KeyFilter::Standard(_) => FilterKind::Standard,
            KeyFilter::Counting(_) => FilterKind::Counting,
        }
    }

    /// Add an entry. Returns `false` if the key is cached already.
    pub fn insert(&mut self, key: String, value: T) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        match &mut self.filter {
            KeyFilter::Standard(filter) => filter.insert(&key),
            KeyFilter::Counting(filter) => filter.insert(&key),
        }
        self.entries.insert(key, value);
        true
    }

    /// Remove an entry, keeping the order of the rest.
    ///
    /// Standard filters cannot forget keys; only the entry is dropped.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let removed = self.entries.shift_remove(key)?;
        if let KeyFilter::Counting(filter) = &mut self.filter {
            filter.remove(key);
        }
        Some(removed)
    }

    /// Whether the key is cached.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Cached entry.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter()
    }

    /// Serialized filter of the cached keys.
    pub fn serialized_filter(&self) -> String {
        match &self.filter {
            KeyFilter::Standard(filter) => filter.serialize(),
            KeyFilter::Counting(filter) => filter.serialize(),
        }
    }

    /// Decode a peer filter of the same variant; an empty string means "nothing held".
    pub fn decode_peer_filter(&self, serialized: &str) -> Result<Option<PeerFilter>> {
        if serialized.is_empty() {
            return Ok(None);
        }
        Ok(Some(match self.filter {
            KeyFilter::Standard(_) => PeerFilter::Standard(BloomFilter::deserialize(serialized)?),
            KeyFilter::Counting(_) => {
                PeerFilter::Counting(CountingBloomFilter::deserialize(serialized)?)
            }
        }))
    }

    /// Entries whose keys the peer filter lacks, oldest first, at most `limit`.
    pub fn get_filtered(&self, peer_filter: Option<&PeerFilter>, limit: usize) -> Vec<T> {
        self.entries
            .iter()
            .filter(|(key, _)| peer_filter.map_or(true, |filter| !filter.contains(key)))
            .take(limit)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Decode `serialized` and return the delta.
    pub fn get_filtered_serialized(&self, serialized: &str, limit: usize) -> Result<Vec<T>> {
        let peer_filter = self.decode_peer_filter(serialized)?;
        Ok(self.get_filtered(peer_filter.as_ref(), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(kind: FilterKind, keys: &[&str]) -> ProofCache<String> {
        let mut cache = ProofCache::new(kind);
        for key in keys {
            cache.insert(key.to_string(), format!("proof-{key}"));
        }
        cache
    }

    #[test]
    fn test_empty_filter_returns_everything_in_order() {
        let cache = filled(FilterKind::Standard, &["c", "a", "b"]);
        assert_eq!(
            cache.get_filtered_serialized("", 100).unwrap(),
            vec!["proof-c", "proof-a", "proof-b"]
        );
        let empty = BloomFilter::new().serialize();
        assert_eq!(cache.get_filtered_serialized(&empty, 2).unwrap(), vec!["proof-c", "proof-a"]);
    }

    #[test]
    fn test_filtered_never_returns_held_keys() {
        let cache = filled(FilterKind::Counting, &["a", "b", "c"]);
        let mut peer = CountingBloomFilter::new();
        peer.insert("b");
        let delta = cache.get_filtered_serialized(&peer.serialize(), 100).unwrap();
        assert_eq!(delta, vec!["proof-a", "proof-c"]);
    }

    #[test]
    fn test_remove_forgets_counting_key() {
        let mut cache = filled(FilterKind::Counting, &["a", "b"]);
        assert_eq!(cache.remove("a").as_deref(), Some("proof-a"));
        assert!(!cache.contains("a"));
        let own = CountingBloomFilter::deserialize(&cache.serialized_filter()).unwrap();
        assert!(!own.contains("a"));
        assert!(own.contains("b"));
    }

    #[test]
    fn test_wrong_variant_rejected() {
        let cache = filled(FilterKind::Counting, &["a"]);
        let standard = BloomFilter::new().serialize();
        assert!(cache.decode_peer_filter(&standard).is_err());
    }

    #[test]
    fn test_duplicate_insert_keeps_first() {
        let mut cache = filled(FilterKind::Standard, &["a"]);
        assert!(!cache.insert("a".into(), "other".into()));
        assert_eq!(cache.get("a").map(String::as_str), Some("proof-a"));
        assert_eq!(cache.len(), 1);
    }
}
