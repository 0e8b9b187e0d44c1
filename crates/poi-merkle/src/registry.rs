//! Accumulator registry
//!
//! One [`Accumulator`] per `(chain, list)`, created eagerly at startup and
//! shared by handle with every consumer. Status queries combine accumulator
//! membership with pending mempool state supplied through
//! [`PendingProofIndex`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use poi_core::hash::normalize_hex;
use poi_core::{
    BlindedCommitmentData, BlindedCommitmentType, Chain, ListKey, PoiError, PoiStatus,
    PoiStatusMap, Result, SignedPoiEvent,
};
use poi_store::DocumentStore;

use crate::accumulator::{Accumulator, LeafInsert, TREE_DEPTH};

/// Pending (not yet attested) state known to the mempools.
#[async_trait]
pub trait PendingProofIndex: Send + Sync {
    /// `ShieldBlocked` or `ShieldPending` for a shield commitment, if either applies.
    async fn shield_status(
        &self,
        chain: Chain,
        list_key: &ListKey,
        blinded_commitment: &str,
    ) -> Result<Option<PoiStatus>>;

    /// Whether a submitted transact (or legacy) proof covers the commitment.
    async fn has_pending_transact(
        &self,
        chain: Chain,
        list_key: &ListKey,
        blinded_commitment: &str,
    ) -> Result<bool>;
}

/// Registry of every accumulator served by this node.
#[derive(Debug)]
pub struct AccumulatorRegistry {
    list_keys: Vec<ListKey>,
    accumulators: HashMap<(Chain, ListKey), Arc<Accumulator>>,
}

impl AccumulatorRegistry {
    /// Open one accumulator per chain and list at production depth.
    pub async fn open(
        store: Arc<dyn DocumentStore>,
        chains: &[Chain],
        list_keys: &[ListKey],
    ) -> Result<Self> {
        Self::open_with_depth(store, chains, list_keys, TREE_DEPTH).await
    }

    /// Open with a custom tree depth.
    pub async fn open_with_depth(
        store: Arc<dyn DocumentStore>,
        chains: &[Chain],
        list_keys: &[ListKey],
        depth: usize,
    ) -> Result<Self> {
        let mut accumulators = HashMap::new();
        for chain in chains {
            for list_key in list_keys {
                let accumulator =
                    Accumulator::open(store.clone(), *chain, &format!("poi/{list_key}"), depth)
                        .await?;
                accumulators.insert((*chain, list_key.clone()), Arc::new(accumulator));
            }
        }
        tracing::info!(
            chains = chains.len(),
            lists = list_keys.len(),
            "accumulator registry ready"
        );
        Ok(Self {
            list_keys: list_keys.to_vec(),
            accumulators,
        })
    }

    /// Configured lists.
    pub fn list_keys(&self) -> &[ListKey] {
        &self.list_keys
    }

    /// Whether the list is configured.
    pub fn has_list(&self, list_key: &ListKey) -> bool {
        self.list_keys.contains(list_key)
    }

    /// Accumulator of `(chain, list)`.
    pub fn get(&self, chain: Chain, list_key: &ListKey) -> Result<Arc<Accumulator>> {
        self.accumulators
            .get(&(chain, list_key.clone()))
            .cloned()
            .ok_or_else(|| PoiError::UnknownList(list_key.clone()))
    }

    /// Replay every commitment of `event` into the list's accumulator, in order.
    pub async fn add_event(&self, chain: Chain, list_key: &ListKey, event: &SignedPoiEvent) -> Result<()> {
        let accumulator = self.get(chain, list_key)?;
        let mut inserted = 0usize;
        for (offset, commitment) in event.event.blinded_commitments.iter().enumerate() {
            let global = event.blinded_commitment_starting_index + offset as u64;
            if let LeafInsert::Inserted { .. } = accumulator.insert_leaf(global, commitment, None).await? {
                inserted += 1;
            }
        }
        tracing::debug!(
            list_key = %list_key,
            chain = %chain,
            index = event.index,
            inserted,
            "applied event to accumulator"
        );
        Ok(())
    }

    /// Status of one commitment for one list.
    pub async fn get_status(
        &self,
        chain: Chain,
        list_key: &ListKey,
        blinded_commitment: &str,
        commitment_type: BlindedCommitmentType,
        pending: &dyn PendingProofIndex,
    ) -> Result<PoiStatus> {
        let accumulator = self.get(chain, list_key)?;
        let commitment = normalize_hex(blinded_commitment);
        if accumulator.contains(&commitment).await? {
            return Ok(PoiStatus::Valid);
        }
        let status = match commitment_type {
            BlindedCommitmentType::Shield => pending
                .shield_status(chain, list_key, &commitment)
                .await?
                .unwrap_or(PoiStatus::Missing),
            BlindedCommitmentType::Transact | BlindedCommitmentType::Unshield => {
                if pending.has_pending_transact(chain, list_key, &commitment).await? {
                    PoiStatus::TransactProofSubmitted
                } else {
                    PoiStatus::Missing
                }
            }
        };
        Ok(status)
    }

    /// Statuses of many commitments across many lists, fanned out per list.
    pub async fn get_statuses(
        &self,
        chain: Chain,
        list_keys: &[ListKey],
        commitments: &[BlindedCommitmentData],
        pending: &dyn PendingProofIndex,
    ) -> Result<PoiStatusMap> {
        let per_list = list_keys.iter().map(|list_key| async move {
            let mut statuses = Vec::with_capacity(commitments.len());
            for data in commitments {
                let status = self
                    .get_status(
                        chain,
                        list_key,
                        &data.blinded_commitment,
                        data.commitment_type,
                        pending,
                    )
                    .await?;
                statuses.push((normalize_hex(&data.blinded_commitment), status));
            }
            Ok::<_, PoiError>((list_key.clone(), statuses))
        });

        let mut merged: PoiStatusMap = BTreeMap::new();
        for (list_key, statuses) in try_join_all(per_list).await? {
            for (commitment, status) in statuses {
                merged
                    .entry(commitment)
                    .or_default()
                    .insert(list_key.clone(), status);
            }
        }
        Ok(merged)
    }
}
