//! Signed blocked-shield records per list

use std::collections::HashMap;

use parking_lot::RwLock;
use poi_core::signature::verify_blocked_shield;
use poi_core::{BlockedShield, ListKey, Result};
use poi_store::{ProofRecordsDb, StoredProof};

use crate::cache::{FilterKind, ProofCache};
use crate::context::{MempoolContext, Sequence, SubmitOutcome};

/// Blocked shields, insert-only.
#[derive(Debug)]
pub struct BlockedShieldsMempool {
    ctx: MempoolContext,
    db: ProofRecordsDb<BlockedShield>,
    caches: RwLock<HashMap<ListKey, ProofCache<BlockedShield>>>,
    sequence: Sequence,
}

impl BlockedShieldsMempool {
    /// Create an empty mempool.
    pub fn new(ctx: MempoolContext) -> Self {
        Self {
            db: ProofRecordsDb::new(ctx.store.clone(), ctx.chain, "blocked-shields"),
            ctx,
            caches: RwLock::new(HashMap::new()),
            sequence: Sequence::default(),
        }
    }

    /// Rebuild caches from the store.
    pub async fn inflate(&self) -> Result<()> {
        let mut caches = HashMap::new();
        for list_key in self.ctx.registry.list_keys() {
            let mut cache = ProofCache::new(FilterKind::Standard);
            for record in self.db.all(list_key.as_str()).await? {
                self.sequence.resume_after(record.sequence);
                cache.insert(record.key, record.proof);
            }
            caches.insert(list_key.clone(), cache);
        }
        *self.caches.write() = caches;
        Ok(())
    }

    /// Accept a record signed by `list_key`.
    pub async fn submit(&self, list_key: &ListKey, blocked: BlockedShield) -> Result<SubmitOutcome> {
        self.ctx.require_list(list_key)?;
        let key = blocked.key();
        if self.contains(list_key, &key) {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        verify_blocked_shield(list_key, &blocked)?;

        let record = StoredProof {
            scope: list_key.to_string(),
            key: key.clone(),
            sequence: self.sequence.next(),
            proof: blocked.clone(),
        };
        if !self.db.insert(&record).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        self.caches
            .write()
            .entry(list_key.clone())
            .or_insert_with(|| ProofCache::new(FilterKind::Standard))
            .insert(key.clone(), blocked);
        tracing::info!(list_key = %list_key, chain = %self.ctx.chain, commitment = %key, "recorded blocked shield");
        Ok(SubmitOutcome::Accepted)
    }

    /// Whether the list blocked the shield.
    pub fn contains(&self, list_key: &ListKey, key: &str) -> bool {
        self.caches
            .read()
            .get(list_key)
            .map_or(false, |cache| cache.contains(key))
    }

    /// Number of blocked shields for the list.
    pub fn len(&self, list_key: &ListKey) -> usize {
        self.caches.read().get(list_key).map_or(0, ProofCache::len)
    }

    /// Serialized filter of cached keys.
    pub fn serialized_filter(&self, list_key: &ListKey) -> String {
        self.caches
            .read()
            .get(list_key)
            .map(ProofCache::serialized_filter)
            .unwrap_or_else(|| ProofCache::<BlockedShield>::new(FilterKind::Standard).serialized_filter())
    }

    /// Records missing from the peer's filter.
    pub fn get_filtered(&self, list_key: &ListKey, serialized_filter: &str) -> Result<Vec<BlockedShield>> {
        self.ctx.require_list(list_key)?;
        let caches = self.caches.read();
        match caches.get(list_key) {
            Some(cache) => cache.get_filtered_serialized(serialized_filter, self.ctx.page_size),
            None => Ok(Vec::new()),
        }
    }
}
