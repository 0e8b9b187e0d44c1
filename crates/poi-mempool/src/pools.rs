//! Every mempool of one chain behind a single handle

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use poi_core::hash::normalize_hex;
use poi_core::{
    Chain, Clock, ListKey, ListSigner, MempoolProof, PoiError, PoiStatus, ProofKind, Result,
    ShieldScreener,
};
use poi_merkle::PendingProofIndex;
use poi_store::ShieldQueueStatus;

use crate::blocked::BlockedShieldsMempool;
use crate::context::{MempoolContext, SubmitOutcome};
use crate::legacy::LegacyTransactMempool;
use crate::shield::ShieldProofMempool;
use crate::shield_queue::ShieldQueue;
use crate::transact::TransactProofMempool;

/// Shield, transact, legacy and blocked-shield mempools plus the shield queue.
#[derive(Debug)]
pub struct ChainMempools {
    ctx: MempoolContext,
    /// Shield proofs
    pub shield: Arc<ShieldProofMempool>,
    /// Transact proofs
    pub transact: Arc<TransactProofMempool>,
    /// Legacy transact proofs
    pub legacy: Arc<LegacyTransactMempool>,
    /// Blocked shields
    pub blocked: Arc<BlockedShieldsMempool>,
    /// Shields awaiting screening
    pub shield_queue: Arc<ShieldQueue>,
}

impl ChainMempools {
    /// Build every mempool and inflate it from the store.
    pub async fn open(
        ctx: MempoolContext,
        signer: Option<ListSigner>,
        screener: Arc<dyn ShieldScreener>,
        clock: Arc<dyn Clock>,
        shield_pending_period: Duration,
    ) -> Result<Self> {
        let shield = Arc::new(ShieldProofMempool::new(ctx.clone()));
        let transact = Arc::new(TransactProofMempool::new(ctx.clone()));
        let legacy = Arc::new(LegacyTransactMempool::new(ctx.clone()));
        let blocked = Arc::new(BlockedShieldsMempool::new(ctx.clone()));
        let shield_queue = Arc::new(ShieldQueue::new(
            ctx.clone(),
            signer,
            screener,
            blocked.clone(),
            clock,
            shield_pending_period,
        ));
        let pools = Self {
            ctx,
            shield,
            transact,
            legacy,
            blocked,
            shield_queue,
        };
        pools.inflate().await?;
        Ok(pools)
    }

    /// Rebuild every cache and bloom filter from the store and queue
    /// unattested work of the owned list again.
    pub async fn inflate(&self) -> Result<()> {
        self.shield.inflate().await?;
        self.transact.inflate().await?;
        self.legacy.inflate().await?;
        self.blocked.inflate().await?;
        self.shield_queue.requeue_allowed().await?;
        tracing::debug!(chain = %self.ctx.chain, "inflated mempools");
        Ok(())
    }

    /// Chain scope.
    pub fn chain(&self) -> Chain {
        self.ctx.chain
    }

    /// Shared context.
    pub fn context(&self) -> &MempoolContext {
        &self.ctx
    }

    /// Route a proof to its mempool.
    pub async fn submit(&self, proof: MempoolProof) -> Result<SubmitOutcome> {
        match proof {
            MempoolProof::Shield { list_key, proof } => self.shield.submit(&list_key, proof).await,
            MempoolProof::Transact { list_key, proof } => {
                self.transact.submit(&list_key, proof).await
            }
            MempoolProof::LegacyTransact { proof } => self.legacy.submit(proof).await,
            MempoolProof::BlockedShield { list_key, blocked } => {
                self.blocked.submit(&list_key, blocked).await
            }
        }
    }

    /// Entries of one mempool missing from the peer's filter.
    ///
    /// Every kind except legacy proofs needs a list.
    pub fn get_filtered(
        &self,
        kind: ProofKind,
        list_key: Option<&ListKey>,
        serialized_filter: &str,
    ) -> Result<Vec<MempoolProof>> {
        let proofs = match kind {
            ProofKind::LegacyTransact => self
                .legacy
                .get_filtered(serialized_filter)?
                .into_iter()
                .map(|proof| MempoolProof::LegacyTransact { proof })
                .collect(),
            ProofKind::Shield => {
                let list_key = list_for(kind, list_key)?;
                self.shield
                    .get_filtered(list_key, serialized_filter)?
                    .into_iter()
                    .map(|proof| MempoolProof::Shield {
                        list_key: list_key.clone(),
                        proof,
                    })
                    .collect()
            }
            ProofKind::Transact => {
                let list_key = list_for(kind, list_key)?;
                self.transact
                    .get_filtered(list_key, serialized_filter)?
                    .into_iter()
                    .map(|proof| MempoolProof::Transact {
                        list_key: list_key.clone(),
                        proof,
                    })
                    .collect()
            }
            ProofKind::BlockedShield => {
                let list_key = list_for(kind, list_key)?;
                self.blocked
                    .get_filtered(list_key, serialized_filter)?
                    .into_iter()
                    .map(|blocked| MempoolProof::BlockedShield {
                        list_key: list_key.clone(),
                        blocked,
                    })
                    .collect()
            }
        };
        Ok(proofs)
    }

    /// Serialized filter describing what this node holds in one mempool.
    pub fn serialized_filter(&self, kind: ProofKind, list_key: Option<&ListKey>) -> Result<String> {
        if kind == ProofKind::LegacyTransact {
            return Ok(self.legacy.serialized_filter());
        }
        let list_key = list_for(kind, list_key)?;
        self.ctx.require_list(list_key)?;
        Ok(match kind {
            ProofKind::Shield => self.shield.serialized_filter(list_key),
            ProofKind::Transact => self.transact.serialized_filter(list_key),
            ProofKind::BlockedShield | ProofKind::LegacyTransact => {
                self.blocked.serialized_filter(list_key)
            }
        })
    }

    /// Pending proof counts for one list: transact proofs and blocked shields.
    pub fn list_counts(&self, list_key: &ListKey) -> (u64, u64) {
        (
            self.transact.len(list_key) as u64,
            self.blocked.len(list_key) as u64,
        )
    }
}

fn list_for(kind: ProofKind, list_key: Option<&ListKey>) -> Result<&ListKey> {
    list_key.ok_or_else(|| PoiError::validation(format!("{kind:?} proofs are scoped by list")))
}

#[async_trait]
impl PendingProofIndex for ChainMempools {
    async fn shield_status(
        &self,
        _chain: Chain,
        list_key: &ListKey,
        blinded_commitment: &str,
    ) -> Result<Option<PoiStatus>> {
        let commitment = normalize_hex(blinded_commitment);
        if self.blocked.contains(list_key, &commitment) {
            return Ok(Some(PoiStatus::ShieldBlocked));
        }
        if self.shield.contains(list_key, &commitment) {
            return Ok(Some(PoiStatus::ShieldPending));
        }
        if self.ctx.owned_queue(list_key).is_none() {
            return Ok(None);
        }
        Ok(match self.shield_queue.status(&commitment).await? {
            Some(ShieldQueueStatus::Pending | ShieldQueueStatus::Allowed) => {
                Some(PoiStatus::ShieldPending)
            }
            Some(ShieldQueueStatus::Blocked) => Some(PoiStatus::ShieldBlocked),
            None => None,
        })
    }

    async fn has_pending_transact(
        &self,
        _chain: Chain,
        list_key: &ListKey,
        blinded_commitment: &str,
    ) -> Result<bool> {
        let commitment = normalize_hex(blinded_commitment);
        Ok(self.transact.covers(list_key, &commitment) || self.legacy.contains(&commitment))
    }
}
