//! Transact proof mempool
//!
//! Proofs stay here until the event they produced is attested; the pruner
//! then drops them, so keys live in counting bloom filters.

use std::collections::HashMap;

use parking_lot::RwLock;
use poi_core::hash::normalize_hex;
use poi_core::{
    Circuit, ListKey, PoiError, PoiEvent, PoiEventKind, Result, TransactProofData,
};
use poi_store::{ProofRecordsDb, StoredProof};

use crate::cache::{FilterKind, ProofCache};
use crate::context::{MempoolContext, Sequence, SubmitOutcome};

#[derive(Debug)]
struct ListProofs {
    cache: ProofCache<TransactProofData>,
    /// Every commitment a cached proof covers, mapped to its dedup key
    covered: HashMap<String, String>,
}

impl ListProofs {
    fn new() -> Self {
        Self {
            cache: ProofCache::new(FilterKind::Counting),
            covered: HashMap::new(),
        }
    }

    fn insert(&mut self, key: String, proof: TransactProofData) -> bool {
        for commitment in event_commitments(&proof) {
            self.covered.insert(commitment, key.clone());
        }
        self.cache.insert(key, proof)
    }

    fn remove(&mut self, key: &str) -> Option<TransactProofData> {
        let proof = self.cache.remove(key)?;
        for commitment in event_commitments(&proof) {
            self.covered.remove(&commitment);
        }
        Some(proof)
    }
}

/// Commitments attested by the event of a transact proof: outputs, then the unshield txid.
pub fn event_commitments(proof: &TransactProofData) -> Vec<String> {
    proof
        .blinded_commitments_out
        .iter()
        .chain(proof.railgun_txid_if_has_unshield.iter())
        .map(|value| normalize_hex(value))
        .collect()
}

fn transact_event(proof: &TransactProofData) -> PoiEvent {
    PoiEvent::new(
        PoiEventKind::Transact {
            railgun_txid_if_has_unshield: proof.railgun_txid_if_has_unshield.clone(),
        },
        event_commitments(proof),
        Some(proof.snark_proof.clone()),
    )
}

/// Pending transact proofs per list.
#[derive(Debug)]
pub struct TransactProofMempool {
    ctx: MempoolContext,
    db: ProofRecordsDb<TransactProofData>,
    lists: RwLock<HashMap<ListKey, ListProofs>>,
    sequence: Sequence,
}

impl TransactProofMempool {
    /// Create an empty mempool.
    pub fn new(ctx: MempoolContext) -> Self {
        Self {
            db: ProofRecordsDb::new(ctx.store.clone(), ctx.chain, "transact-proofs"),
            ctx,
            lists: RwLock::new(HashMap::new()),
            sequence: Sequence::default(),
        }
    }

    /// Rebuild caches from the store.
    ///
    /// Proofs for the owned list with any commitment not attested yet are
    /// queued again.
    pub async fn inflate(&self) -> Result<()> {
        let mut lists = HashMap::new();
        let mut requeued = 0;
        for list_key in self.ctx.registry.list_keys() {
            let owned = self.ctx.owned_queue(list_key).is_some();
            let mut proofs = ListProofs::new();
            for record in self.db.all(list_key.as_str()).await? {
                self.sequence.resume_after(record.sequence);
                if owned && !self.fully_attested(list_key, &record.proof).await? {
                    self.ctx.enqueue_for(list_key, transact_event(&record.proof));
                    requeued += 1;
                }
                proofs.insert(record.key, record.proof);
            }
            lists.insert(list_key.clone(), proofs);
        }
        *self.lists.write() = lists;
        if requeued > 0 {
            tracing::info!(chain = %self.ctx.chain, requeued, "requeued unattested transact proofs");
        }
        Ok(())
    }

    async fn fully_attested(&self, list_key: &ListKey, proof: &TransactProofData) -> Result<bool> {
        for commitment in event_commitments(proof) {
            if !self.ctx.is_attested(list_key, &commitment).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn verify(&self, list_key: &ListKey, key: &str, proof: &TransactProofData) -> Result<()> {
        if proof.poi_merkleroots.is_empty() {
            return Err(PoiError::validation(format!("transact proof {key} has no POI merkleroots")));
        }
        let accumulator = self.ctx.registry.get(self.ctx.chain, list_key)?;
        for root in &proof.poi_merkleroots {
            if !accumulator.has_historical_root(root).await? {
                return Err(PoiError::validation(format!(
                    "unknown POI merkleroot {root} for list {list_key}"
                )));
            }
        }
        if !self
            .ctx
            .txid
            .validate_merkleroot(proof.txid_merkleroot_index, &proof.txid_merkleroot)
            .await?
        {
            return Err(PoiError::validation(format!(
                "txid merkleroot {} does not match index {}",
                proof.txid_merkleroot, proof.txid_merkleroot_index
            )));
        }
        let circuit = Circuit::Transact {
            inputs: proof.poi_merkleroots.len(),
            outputs: proof.blinded_commitments_out.len(),
        };
        if !self
            .ctx
            .verifier
            .verify(circuit, &proof.public_signals(), &proof.snark_proof)
        {
            return Err(PoiError::validation(format!("invalid transact proof for {key}")));
        }
        Ok(())
    }

    /// Verify and accept a transact proof for `list_key`.
    pub async fn submit(&self, list_key: &ListKey, proof: TransactProofData) -> Result<SubmitOutcome> {
        self.ctx.require_list(list_key)?;
        let key = proof
            .key()
            .ok_or_else(|| PoiError::validation("transact proof carries no commitments"))?;
        if self.contains(list_key, &key) || self.fully_attested(list_key, &proof).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        self.verify(list_key, &key, &proof).await?;

        let record = StoredProof {
            scope: list_key.to_string(),
            key: key.clone(),
            sequence: self.sequence.next(),
            proof: proof.clone(),
        };
        if !self.db.insert(&record).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        self.lists
            .write()
            .entry(list_key.clone())
            .or_insert_with(ListProofs::new)
            .insert(key.clone(), proof.clone());

        self.ctx.enqueue_for(list_key, transact_event(&proof));
        tracing::info!(list_key = %list_key, chain = %self.ctx.chain, commitment = %key, "accepted transact proof");
        Ok(SubmitOutcome::Accepted)
    }

    /// Whether a proof with this dedup key is cached.
    pub fn contains(&self, list_key: &ListKey, key: &str) -> bool {
        self.lists
            .read()
            .get(list_key)
            .map_or(false, |proofs| proofs.cache.contains(key))
    }

    /// Whether any cached proof covers the commitment.
    pub fn covers(&self, list_key: &ListKey, commitment: &str) -> bool {
        self.lists
            .read()
            .get(list_key)
            .map_or(false, |proofs| proofs.covered.contains_key(commitment))
    }

    /// Number of cached proofs.
    pub fn len(&self, list_key: &ListKey) -> usize {
        self.lists.read().get(list_key).map_or(0, |proofs| proofs.cache.len())
    }

    /// Serialized counting filter of cached keys.
    pub fn serialized_filter(&self, list_key: &ListKey) -> String {
        self.lists
            .read()
            .get(list_key)
            .map(|proofs| proofs.cache.serialized_filter())
            .unwrap_or_else(|| ListProofs::new().cache.serialized_filter())
    }

    /// Proofs missing from the peer's filter.
    pub fn get_filtered(&self, list_key: &ListKey, serialized_filter: &str) -> Result<Vec<TransactProofData>> {
        self.ctx.require_list(list_key)?;
        let lists = self.lists.read();
        match lists.get(list_key) {
            Some(proofs) => proofs
                .cache
                .get_filtered_serialized(serialized_filter, self.ctx.page_size),
            None => Ok(Vec::new()),
        }
    }

    /// Drop proofs whose every event commitment is a leaf of the list's
    /// accumulator.
    ///
    /// Returns the number removed.
    pub async fn remove_attested(&self, list_key: &ListKey) -> Result<usize> {
        let cached: Vec<(String, TransactProofData)> = self
            .lists
            .read()
            .get(list_key)
            .map(|proofs| {
                proofs
                    .cache
                    .iter()
                    .map(|(key, proof)| (key.clone(), proof.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut removed = 0;
        for (key, proof) in cached {
            if !self.fully_attested(list_key, &proof).await? {
                continue;
            }
            self.db.delete(list_key.as_str(), &key).await?;
            if let Some(proofs) = self.lists.write().get_mut(list_key) {
                if proofs.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
