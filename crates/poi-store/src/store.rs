//! Document store boundary
//!
//! The node depends only on this capability set: namespaced keyed documents
//! with insert (unique), upsert, delete, ordered range scans and counts.
//! Keys are ordered lexicographically, so callers zero-pad numeric key parts.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Errors returned by a document store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unique key already present
    #[error("Duplicate key {key} in {namespace}")]
    DuplicateKey {
        /// Namespace of the collision
        namespace: String,
        /// Colliding key
        key: String,
    },

    /// Backend failure
    #[error("Store backend failed: {0}")]
    Backend(String),

    /// Document could not be encoded or decoded
    #[error("Document codec failed: {0}")]
    Codec(String),
}

impl StoreError {
    /// Duplicate-key errors are idempotent no-ops for most callers.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for poi_core::PoiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Codec(message) => poi_core::PoiError::serialization(message),
            other => poi_core::PoiError::storage(other.to_string()),
        }
    }
}

/// Ordered key range within a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Only keys starting with this prefix
    pub prefix: String,
    /// Inclusive lower bound
    pub start: Option<String>,
    /// Exclusive upper bound
    pub end: Option<String>,
    /// Maximum number of documents
    pub limit: Option<usize>,
    /// Descending order
    pub reverse: bool,
}

impl KeyRange {
    /// Every key under `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Restrict to `[start, end)`.
    pub fn between(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self.end = Some(end.into());
        self
    }

    /// Cap the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Iterate in descending key order.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
            && self.start.as_deref().map_or(true, |start| key >= start)
            && self.end.as_deref().map_or(true, |end| key < end)
    }
}

/// Keyed document store with per-namespace isolation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document; fails with [`StoreError::DuplicateKey`] if present.
    async fn insert(&self, namespace: &str, key: &str, document: Vec<u8>) -> StoreResult<()>;

    /// Insert or replace a document.
    async fn upsert(&self, namespace: &str, key: &str, document: Vec<u8>) -> StoreResult<()>;

    /// Fetch a document.
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Delete a document, returning whether it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool>;

    /// Delete every document in the range, returning the count.
    async fn delete_range(&self, namespace: &str, range: &KeyRange) -> StoreResult<u64>;

    /// Ordered scan.
    async fn find(&self, namespace: &str, range: &KeyRange) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Count documents in the range.
    async fn count(&self, namespace: &str, range: &KeyRange) -> StoreResult<u64>;
}

type Namespaces = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// In-memory store handler for tests and single-process deployments
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    data: Arc<RwLock<Namespaces>>,
}

impl MemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn scan<'a>(
    docs: &'a BTreeMap<String, Vec<u8>>,
    range: &'a KeyRange,
) -> Box<dyn Iterator<Item = (&'a String, &'a Vec<u8>)> + 'a> {
    let lower = match &range.start {
        Some(start) if start.as_str() > range.prefix.as_str() => start.clone(),
        _ => range.prefix.clone(),
    };
    let upper = match &range.end {
        Some(end) if end.as_str() <= lower.as_str() => return Box::new(std::iter::empty()),
        Some(end) => Bound::Excluded(end.clone()),
        None => Bound::Unbounded,
    };
    let iter = docs
        .range((Bound::Included(lower), upper))
        .take_while(move |(key, _)| key.starts_with(&range.prefix))
        .filter(move |(key, _)| range.matches(key));
    if range.reverse {
        let mut collected: Vec<_> = iter.collect();
        collected.reverse();
        Box::new(collected.into_iter())
    } else {
        Box::new(iter)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, namespace: &str, key: &str, document: Vec<u8>) -> StoreResult<()> {
        let mut data = self.data.write().await;
        let docs = data.entry(namespace.to_string()).or_default();
        if docs.contains_key(key) {
            return Err(StoreError::DuplicateKey {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }
        docs.insert(key.to_string(), document);
        Ok(())
    }

    async fn upsert(&self, namespace: &str, key: &str, document: Vec<u8>) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let data = self.data.read().await;
        Ok(data.get(namespace).and_then(|docs| docs.get(key)).cloned())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let mut data = self.data.write().await;
        Ok(data
            .get_mut(namespace)
            .map(|docs| docs.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn delete_range(&self, namespace: &str, range: &KeyRange) -> StoreResult<u64> {
        let mut data = self.data.write().await;
        let Some(docs) = data.get_mut(namespace) else {
            return Ok(0);
        };
        let keys: Vec<String> = scan(docs, range).map(|(key, _)| key.clone()).collect();
        for key in &keys {
            docs.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn find(&self, namespace: &str, range: &KeyRange) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let data = self.data.read().await;
        let Some(docs) = data.get(namespace) else {
            return Ok(Vec::new());
        };
        let limit = range.limit.unwrap_or(usize::MAX);
        Ok(scan(docs, range)
            .take(limit)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn count(&self, namespace: &str, range: &KeyRange) -> StoreResult<u64> {
        let data = self.data.read().await;
        Ok(data
            .get(namespace)
            .map(|docs| scan(docs, range).count() as u64)
            .unwrap_or(0))
    }
}
