//! Legacy transact proofs
//!
//! Transactions that predate transact proofs are attested from their note
//! preimage instead of a snark. Records are list independent; only the
//! owned list turns them into events.

use parking_lot::RwLock;
use poi_core::hash::{normalize_hex, poseidon_hex};
use poi_core::{LegacyTransactProofData, PoiError, PoiEvent, PoiEventKind, Result};
use poi_store::{ProofRecordsDb, StoredProof};

use crate::cache::{FilterKind, ProofCache};
use crate::context::{MempoolContext, Sequence, SubmitOutcome};

const LEGACY_SCOPE: &str = "legacy";

/// `poseidon(poseidon(npk, token_hash, value), npk, txid_index)`
pub fn legacy_blinded_commitment(
    npk: &str,
    token_hash: &str,
    value: &str,
    txid_index: u64,
) -> Result<String> {
    let commitment = poseidon_hex(&[npk, token_hash, value])?;
    poseidon_hex(&[&commitment, npk, &format!("{txid_index:x}")])
}

fn legacy_event(proof: &LegacyTransactProofData) -> PoiEvent {
    PoiEvent::new(
        PoiEventKind::LegacyTransact {
            txid_index: proof.txid_index,
        },
        vec![normalize_hex(&proof.blinded_commitment)],
        None,
    )
}

/// Legacy proofs shared by every list.
#[derive(Debug)]
pub struct LegacyTransactMempool {
    ctx: MempoolContext,
    db: ProofRecordsDb<LegacyTransactProofData>,
    cache: RwLock<ProofCache<LegacyTransactProofData>>,
    sequence: Sequence,
}

impl LegacyTransactMempool {
    /// Create an empty mempool.
    pub fn new(ctx: MempoolContext) -> Self {
        Self {
            db: ProofRecordsDb::new(ctx.store.clone(), ctx.chain, "legacy-transact-proofs"),
            ctx,
            cache: RwLock::new(ProofCache::new(FilterKind::Counting)),
            sequence: Sequence::default(),
        }
    }

    /// Rebuild the cache from the store, queueing unattested proofs again
    /// when this node operates a list.
    pub async fn inflate(&self) -> Result<()> {
        let mut cache = ProofCache::new(FilterKind::Counting);
        let mut requeued = 0;
        for record in self.db.all(LEGACY_SCOPE).await? {
            self.sequence.resume_after(record.sequence);
            if let Some(queue) = &self.ctx.queue {
                if !self.attested_by_owned_list(&record.key).await? {
                    self.ctx.enqueue_for(queue.list_key(), legacy_event(&record.proof));
                    requeued += 1;
                }
            }
            cache.insert(record.key, record.proof);
        }
        *self.cache.write() = cache;
        if requeued > 0 {
            tracing::info!(chain = %self.ctx.chain, requeued, "requeued unattested legacy transact proofs");
        }
        Ok(())
    }

    async fn attested_by_owned_list(&self, key: &str) -> Result<bool> {
        match &self.ctx.queue {
            Some(queue) => self.ctx.is_attested(queue.list_key(), key).await,
            None => Ok(false),
        }
    }

    /// Verify the preimage and accept the proof.
    pub async fn submit(&self, proof: LegacyTransactProofData) -> Result<SubmitOutcome> {
        let key = proof.key();
        if self.contains(&key) || self.attested_by_owned_list(&key).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        let expected =
            legacy_blinded_commitment(&proof.npk, &proof.token_hash, &proof.value, proof.txid_index)?;
        if expected != key {
            return Err(PoiError::validation(format!(
                "legacy blinded commitment {key} does not match its preimage"
            )));
        }

        let record = StoredProof {
            scope: LEGACY_SCOPE.to_string(),
            key: key.clone(),
            sequence: self.sequence.next(),
            proof: proof.clone(),
        };
        if !self.db.insert(&record).await? {
            return Ok(SubmitOutcome::AlreadyKnown);
        }
        self.cache.write().insert(key.clone(), proof.clone());

        if let Some(queue) = &self.ctx.queue {
            self.ctx.enqueue_for(queue.list_key(), legacy_event(&proof));
        }
        tracing::info!(chain = %self.ctx.chain, commitment = %key, txid_index = proof.txid_index, "accepted legacy transact proof");
        Ok(SubmitOutcome::Accepted)
    }

    /// Whether the commitment has a cached legacy proof.
    pub fn contains(&self, key: &str) -> bool {
        self.cache.read().contains(key)
    }

    /// Number of cached proofs.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Serialized counting filter of cached keys.
    pub fn serialized_filter(&self) -> String {
        self.cache.read().serialized_filter()
    }

    /// Proofs missing from the peer's filter.
    pub fn get_filtered(&self, serialized_filter: &str) -> Result<Vec<LegacyTransactProofData>> {
        self.cache
            .read()
            .get_filtered_serialized(serialized_filter, self.ctx.page_size)
    }

    /// Drop proofs already attested by any configured list.
    pub async fn remove_attested(&self) -> Result<usize> {
        let keys: Vec<String> = self.cache.read().iter().map(|(key, _)| key.clone()).collect();
        let mut removed = 0;
        for key in keys {
            let mut attested = false;
            for list_key in self.ctx.registry.list_keys() {
                if self.ctx.is_attested(list_key, &key).await? {
                    attested = true;
                    break;
                }
            }
            if !attested {
                continue;
            }
            self.db.delete(LEGACY_SCOPE, &key).await?;
            if self.cache.write().remove(&key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
