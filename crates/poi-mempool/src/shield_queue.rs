//! Shield queue and promotion
//!
//! The chain indexer hands newly discovered shields to [`ShieldQueue`]. Once
//! a shield has waited out the pending period, the owned list screens it and
//! either attests it with a shield event or records a signed block.

use std::sync::Arc;
use std::time::Duration;

use poi_core::hash::normalize_hex;
use poi_core::{
    Clock, ListKey, ListSigner, PoiEvent, PoiEventKind, Result, ShieldDecision, ShieldQueueCounts,
    ShieldScreener,
};
use poi_store::{ShieldQueueDb, ShieldQueueEntry, ShieldQueueStatus};

use crate::blocked::BlockedShieldsMempool;
use crate::context::MempoolContext;

/// Shield found on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredShield {
    /// On-chain commitment hash
    pub commitment_hash: String,
    /// Blinded commitment
    pub blinded_commitment: String,
}

/// Outcome of one promotion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionReport {
    /// Shields turned into events
    pub allowed: usize,
    /// Shields blocked by the list
    pub blocked: usize,
}

fn allowed_event(entry: &ShieldQueueEntry) -> PoiEvent {
    PoiEvent::new(
        PoiEventKind::Shield {
            commitment_hash: entry.commitment_hash.clone(),
        },
        vec![entry.blinded_commitment.clone()],
        None,
    )
}

/// Queue of shields awaiting screening by the owned list.
pub struct ShieldQueue {
    ctx: MempoolContext,
    db: ShieldQueueDb,
    signer: Option<ListSigner>,
    screener: Arc<dyn ShieldScreener>,
    blocked: Arc<BlockedShieldsMempool>,
    clock: Arc<dyn Clock>,
    pending_period: Duration,
}

impl std::fmt::Debug for ShieldQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShieldQueue")
            .field("chain", &self.ctx.chain)
            .field("signer", &self.signer)
            .field("pending_period", &self.pending_period)
            .finish_non_exhaustive()
    }
}

impl ShieldQueue {
    /// Create the queue; promotion is a no-op unless `signer` is set.
    pub fn new(
        ctx: MempoolContext,
        signer: Option<ListSigner>,
        screener: Arc<dyn ShieldScreener>,
        blocked: Arc<BlockedShieldsMempool>,
        clock: Arc<dyn Clock>,
        pending_period: Duration,
    ) -> Self {
        Self {
            db: ShieldQueueDb::new(ctx.store.clone(), ctx.chain),
            ctx,
            signer,
            screener,
            blocked,
            clock,
            pending_period,
        }
    }

    /// Queue newly discovered shields as pending. Returns how many were new.
    pub async fn queue_shields(&self, shields: &[DiscoveredShield]) -> Result<usize> {
        let now_ms = self.clock.now_ms();
        let mut queued = 0;
        for shield in shields {
            let blinded = normalize_hex(&shield.blinded_commitment);
            if self
                .db
                .insert_pending(&normalize_hex(&shield.commitment_hash), &blinded, now_ms)
                .await?
            {
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::info!(chain = %self.ctx.chain, queued, "queued shields");
        }
        Ok(queued)
    }

    /// Screening state of a shield.
    pub async fn status(&self, blinded_commitment: &str) -> Result<Option<ShieldQueueStatus>> {
        Ok(self
            .db
            .get(&normalize_hex(blinded_commitment))
            .await?
            .map(|entry| entry.status))
    }

    /// Counts by status.
    pub async fn counts(&self) -> Result<ShieldQueueCounts> {
        Ok(self.db.counts().await?)
    }

    /// Screen every shield that has waited out the pending period.
    pub async fn promote(&self) -> Result<PromotionReport> {
        let mut report = PromotionReport::default();
        let Some(signer) = &self.signer else {
            return Ok(report);
        };
        let list_key = signer.list_key();
        let now_ms = self.clock.now_ms();
        let cutoff_ms = now_ms.saturating_sub(self.pending_period.as_millis() as u64);

        for entry in self.db.pending_before(cutoff_ms).await? {
            match self
                .screener
                .screen(self.ctx.chain, &entry.commitment_hash, &entry.blinded_commitment)
            {
                ShieldDecision::Allow => {
                    self.allow(&list_key, &entry, now_ms).await?;
                    report.allowed += 1;
                }
                ShieldDecision::Block(reason) => {
                    let blocked = signer.sign_blocked_shield(
                        &entry.commitment_hash,
                        &entry.blinded_commitment,
                        reason.clone(),
                    )?;
                    self.blocked.submit(&list_key, blocked).await?;
                    self.db
                        .update_status(&entry, ShieldQueueStatus::Blocked, reason, now_ms)
                        .await?;
                    tracing::info!(chain = %self.ctx.chain, commitment = %entry.blinded_commitment, "blocked shield");
                    report.blocked += 1;
                }
            }
        }
        Ok(report)
    }

    async fn allow(
        &self,
        list_key: &ListKey,
        entry: &ShieldQueueEntry,
        now_ms: u64,
    ) -> Result<()> {
        self.db
            .update_status(entry, ShieldQueueStatus::Allowed, None, now_ms)
            .await?;
        self.ctx.enqueue_for(list_key, allowed_event(entry));
        Ok(())
    }

    /// Queue again every allowed shield the owned list has not attested.
    ///
    /// Allowed shields are never screened twice, so after a restart this is
    /// the only path that turns them into events. Returns how many were queued.
    pub async fn requeue_allowed(&self) -> Result<usize> {
        let Some(queue) = &self.ctx.queue else {
            return Ok(0);
        };
        let list_key = queue.list_key();
        let mut requeued = 0;
        for entry in self.db.with_status(ShieldQueueStatus::Allowed).await? {
            if !self.ctx.is_attested(list_key, &entry.blinded_commitment).await? {
                self.ctx.enqueue_for(list_key, allowed_event(&entry));
                requeued += 1;
            }
        }
        if requeued > 0 {
            tracing::info!(chain = %self.ctx.chain, requeued, "requeued allowed shields");
        }
        Ok(requeued)
    }

    /// Promote on a fixed interval until the task is aborted.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.promote().await {
                Ok(report) if report.allowed > 0 || report.blocked > 0 => {
                    tracing::info!(
                        chain = %self.ctx.chain,
                        allowed = report.allowed,
                        blocked = report.blocked,
                        "promoted queued shields"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(chain = %self.ctx.chain, error = %err, "shield promotion failed");
                }
            }
        }
    }
}
