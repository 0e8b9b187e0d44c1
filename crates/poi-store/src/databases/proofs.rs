//! Pending proof records
//!
//! Shield, transact and legacy-transact proofs plus blocked shield records
//! share one shape: a document keyed by `(scope, dedup key)` carrying an
//! insertion sequence so caches can be rebuilt in arrival order.

use std::sync::Arc;

use poi_core::Chain;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::store::{DocumentStore, KeyRange, StoreResult};

/// Persisted proof with its arrival sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProof<T> {
    /// List key, or a fixed scope for list-independent proofs
    pub scope: String,
    /// Dedup key
    pub key: String,
    /// Monotonic arrival sequence
    pub sequence: u64,
    /// Proof payload
    pub proof: T,
}

/// Proof records of one kind.
#[derive(Debug)]
pub struct ProofRecordsDb<T> {
    records: Collection<StoredProof<T>>,
}

impl<T> Clone for ProofRecordsDb<T> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<T> ProofRecordsDb<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Open the `name` proof collection for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain, name: &str) -> Self {
        Self {
            records: Collection::new(store, chain, name),
        }
    }

    /// Persist a record. Returns `false` if the key already exists.
    pub async fn insert(&self, record: &StoredProof<T>) -> StoreResult<bool> {
        self.records
            .insert_idempotent(&format!("{}/{}", record.scope, record.key), record)
            .await
    }

    /// Whether a record exists.
    pub async fn contains(&self, scope: &str, key: &str) -> StoreResult<bool> {
        self.records.contains(&format!("{scope}/{key}")).await
    }

    /// Delete a record.
    pub async fn delete(&self, scope: &str, key: &str) -> StoreResult<bool> {
        self.records.delete(&format!("{scope}/{key}")).await
    }

    /// Every record in `scope`, in arrival order.
    pub async fn all(&self, scope: &str) -> StoreResult<Vec<StoredProof<T>>> {
        let mut records = self
            .records
            .values(&KeyRange::prefix(format!("{scope}/")))
            .await?;
        records.sort_by_key(|record| record.sequence);
        Ok(records)
    }

    /// Number of records in `scope`.
    pub async fn count(&self, scope: &str) -> StoreResult<u64> {
        self.records.count(&KeyRange::prefix(format!("{scope}/"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use poi_core::testing::test_chain;

    fn record(scope: &str, key: &str, sequence: u64) -> StoredProof<String> {
        StoredProof {
            scope: scope.into(),
            key: key.into(),
            sequence,
            proof: format!("proof-{key}"),
        }
    }

    #[tokio::test]
    async fn test_records_return_in_arrival_order() {
        let db: ProofRecordsDb<String> =
            ProofRecordsDb::new(Arc::new(MemoryDocumentStore::new()), test_chain(), "proofs");
        db.insert(&record("aa", "ff", 0)).await.unwrap();
        db.insert(&record("aa", "01", 1)).await.unwrap();
        db.insert(&record("bb", "02", 2)).await.unwrap();

        let keys: Vec<_> = db.all("aa").await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["ff", "01"]);
        assert_eq!(db.count("bb").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_delete() {
        let db: ProofRecordsDb<String> =
            ProofRecordsDb::new(Arc::new(MemoryDocumentStore::new()), test_chain(), "proofs");
        assert!(db.insert(&record("aa", "01", 0)).await.unwrap());
        assert!(!db.insert(&record("aa", "01", 5)).await.unwrap());
        assert!(db.contains("aa", "01").await.unwrap());
        assert!(db.delete("aa", "01").await.unwrap());
        assert!(!db.contains("aa", "01").await.unwrap());
    }
}
