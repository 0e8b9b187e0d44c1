//! Shield proof mempool

use std::collections::HashMap;

use parking_lot::RwLock;
use poi_core::{
    Circuit, ListKey, PoiError, PoiEvent, PoiEventKind, Result, ShieldProofData,
};
use poi_store::{ProofRecordsDb, StoredProof};

use crate::cache::{FilterKind, ProofCache};
use crate::context::{MempoolContext, Sequence, SubmitOutcome};

fn shield_event(proof: &ShieldProofData) -> PoiEvent {
    PoiEvent::new(
        PoiEventKind::Shield {
            commitment_hash: proof.commitment_hash.clone(),
        },
        vec![proof.blinded_commitment.clone()],
        Some(proof.snark_proof.clone()),
    )
}

/// Shield proofs per list, backed by standard bloom filters.
#[derive(Debug)]
pub struct ShieldProofMempool {
    ctx: MempoolContext,
    db: ProofRecordsDb<ShieldProofData>,
    caches: RwLock<HashMap<ListKey, ProofCache<ShieldProofData>>>,
    sequence: Sequence,
}

impl ShieldProofMempool {
    /// Create an empty mempool; call [`Self::inflate`] to load persisted proofs.
    pub fn new(ctx: MempoolContext) -> Self {
        Self {
            db: ProofRecordsDb::new(ctx.store.clone(), ctx.chain, "shield-proofs"),
            ctx,
            caches: RwLock::new(HashMap::new()),
            sequence: Sequence::default(),
        }
    }

    /// Rebuild caches and filters from the store.
    ///
    /// Proofs for the owned list whose commitment is not attested yet are
    /// queued again; the event queue itself is not persisted.
    pub async fn inflate(&self) -> Result<()> {
        let mut caches = HashMap::new();
        let mut requeued = 0;
        for list_key in self.ctx.registry.list_keys() {
            let owned = self.ctx.owned_queue(list_key).is_some();
            let mut cache = ProofCache::new(FilterKind::Standard);
            for record in self.db.all(list_key.as_str()).await? {
                self.sequence.resume_after(record.sequence);
                if owned && !self.ctx.is_attested(list_key, &record.key).await? {
                    self.ctx.enqueue_for(list_key, shield_event(&record.proof));
                    requeued += 1;
                }
                cache.insert(record.key, record.proof);
            }
            caches.insert(list_key.clone(), cache);
        }
        *self.caches.write() = caches;
        if requeued > 0 {
            tracing::info!(chain = %self.ctx.chain, requeued, "requeued unattested shield proofs");
        }
        Ok(())
    }

    /// Verify and accept a shield proof for `list_key`.
    pub async fn submit(&self, list_key: &ListKey, proof: ShieldProofData) -> Result<SubmitOutcome> {
        self.ctx.require_list(list_key)?;
        let key = proof.key();
        if self.contains(list_key, &key) || self.ctx.is_attested(list_key, &key).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        if !self
            .ctx
            .verifier
            .verify(Circuit::Shield, &proof.public_signals(), &proof.snark_proof)
        {
            return Err(PoiError::validation(format!("invalid shield proof for {key}")));
        }

        let record = StoredProof {
            scope: list_key.to_string(),
            key: key.clone(),
            sequence: self.sequence.next(),
            proof: proof.clone(),
        };
        if !self.db.insert(&record).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        self.caches
            .write()
            .entry(list_key.clone())
            .or_insert_with(|| ProofCache::new(FilterKind::Standard))
            .insert(key.clone(), proof.clone());

        self.ctx.enqueue_for(list_key, shield_event(&proof));
        tracing::info!(list_key = %list_key, chain = %self.ctx.chain, commitment = %key, "accepted shield proof");
        Ok(SubmitOutcome::Accepted)
    }

    /// Whether a proof is cached.
    pub fn contains(&self, list_key: &ListKey, key: &str) -> bool {
        self.caches
            .read()
            .get(list_key)
            .map_or(false, |cache| cache.contains(key))
    }

    /// Number of cached proofs.
    pub fn len(&self, list_key: &ListKey) -> usize {
        self.caches.read().get(list_key).map_or(0, ProofCache::len)
    }

    /// Serialized filter of cached keys, for requesting deltas from peers.
    pub fn serialized_filter(&self, list_key: &ListKey) -> String {
        self.caches
            .read()
            .get(list_key)
            .map(ProofCache::serialized_filter)
            .unwrap_or_else(|| ProofCache::<ShieldProofData>::new(FilterKind::Standard).serialized_filter())
    }

    /// Proofs missing from the peer's filter.
    pub fn get_filtered(&self, list_key: &ListKey, serialized_filter: &str) -> Result<Vec<ShieldProofData>> {
        self.ctx.require_list(list_key)?;
        let caches = self.caches.read();
        match caches.get(list_key) {
            Some(cache) => cache.get_filtered_serialized(serialized_filter, self.ctx.page_size),
            None => Ok(Vec::new()),
        }
    }
}
