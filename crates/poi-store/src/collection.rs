//! Typed collections over a [`DocumentStore`]
//!
//! A collection is a JSON-encoded document family scoped to one chain. The
//! namespace is `{network}/{txid_version}/{name}`, so two chains never share
//! documents.

use std::marker::PhantomData;
use std::sync::Arc;

use poi_core::Chain;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::{DocumentStore, KeyRange, StoreError, StoreResult};

/// JSON-encoded documents of one type in one chain namespace.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace)
            .finish()
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Open the `name` collection for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain, name: &str) -> Self {
        Self {
            store,
            namespace: format!("{}/{}", chain.namespace(), name),
            _marker: PhantomData,
        }
    }

    /// Full namespace of this collection.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Insert a document with a unique key.
    pub async fn insert(&self, key: &str, value: &T) -> StoreResult<()> {
        self.store.insert(&self.namespace, key, encode(value)?).await
    }

    /// Insert a document, treating an existing key as success.
    ///
    /// Returns `false` when the key was already present.
    pub async fn insert_idempotent(&self, key: &str, value: &T) -> StoreResult<bool> {
        match self.insert(key, value).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_duplicate() => {
                tracing::trace!(namespace = %self.namespace, key, "duplicate insert ignored");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Insert or replace a document.
    pub async fn upsert(&self, key: &str, value: &T) -> StoreResult<()> {
        self.store.upsert(&self.namespace, key, encode(value)?).await
    }

    /// Fetch and decode a document.
    pub async fn get(&self, key: &str) -> StoreResult<Option<T>> {
        match self.store.get(&self.namespace, key).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether a key is present.
    pub async fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.store.get(&self.namespace, key).await?.is_some())
    }

    /// Delete a document.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.store.delete(&self.namespace, key).await
    }

    /// Delete every document in `range`.
    pub async fn delete_range(&self, range: &KeyRange) -> StoreResult<u64> {
        self.store.delete_range(&self.namespace, range).await
    }

    /// Ordered scan returning keys and documents.
    pub async fn find(&self, range: &KeyRange) -> StoreResult<Vec<(String, T)>> {
        self.store
            .find(&self.namespace, range)
            .await?
            .into_iter()
            .map(|(key, bytes)| Ok((key, decode(&bytes)?)))
            .collect()
    }

    /// Ordered scan returning documents only.
    pub async fn values(&self, range: &KeyRange) -> StoreResult<Vec<T>> {
        Ok(self
            .find(range)
            .await?
            .into_iter()
            .map(|(_, value)| value)
            .collect())
    }

    /// Last document in key order under `prefix`.
    pub async fn last(&self, prefix: &str) -> StoreResult<Option<T>> {
        let range = KeyRange::prefix(prefix).reversed().limit(1);
        Ok(self.values(&range).await?.into_iter().next())
    }

    /// Count documents in `range`.
    pub async fn count(&self, range: &KeyRange) -> StoreResult<u64> {
        self.store.count(&self.namespace, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use poi_core::testing::test_chain;
    use poi_core::{NetworkName, TxidVersion};

    #[tokio::test]
    async fn test_chains_are_isolated() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let eth: Collection<u64> = Collection::new(store.clone(), test_chain(), "values");
        let polygon: Collection<u64> = Collection::new(
            store,
            Chain::new(NetworkName::Polygon, TxidVersion::V2PoseidonMerkle),
            "values",
        );
        eth.insert("a", &1).await.unwrap();
        assert_eq!(eth.get("a").await.unwrap(), Some(1));
        assert_eq!(polygon.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_idempotent() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let values: Collection<u64> = Collection::new(store, test_chain(), "values");
        assert!(values.insert_idempotent("a", &1).await.unwrap());
        assert!(!values.insert_idempotent("a", &2).await.unwrap());
        assert_eq!(values.get("a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_last_by_prefix() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let values: Collection<u64> = Collection::new(store, test_chain(), "values");
        for i in 0..3u64 {
            values.insert(&format!("x/{i:03}"), &i).await.unwrap();
        }
        values.insert("y/000", &9).await.unwrap();
        assert_eq!(values.last("x/").await.unwrap(), Some(2));
        assert_eq!(values.last("z/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_failure_is_codec_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let values: Collection<u64> = Collection::new(store.clone(), test_chain(), "values");
        store
            .insert(values.namespace(), "bad", b"not json".to_vec())
            .await
            .unwrap();
        assert!(matches!(values.get("bad").await, Err(StoreError::Codec(_))));
    }
}
