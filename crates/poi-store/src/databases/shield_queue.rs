//! Shields discovered on chain, awaiting screening by the owned list

use std::sync::Arc;

use poi_core::{BlindedCommitment, Chain, ShieldQueueCounts};
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::store::{DocumentStore, KeyRange, StoreResult};

/// Screening state of a queued shield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShieldQueueStatus {
    /// Waiting for the pending period to elapse
    Pending,
    /// Attested as a shield event
    Allowed,
    /// Rejected by the list
    Blocked,
}

/// Queued shield document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldQueueEntry {
    /// On-chain commitment hash
    pub commitment_hash: String,
    /// Blinded commitment
    pub blinded_commitment: BlindedCommitment,
    /// Screening state
    pub status: ShieldQueueStatus,
    /// Unix millis when the shield was queued
    pub queued_at_ms: u64,
    /// Unix millis of the last status change
    pub updated_at_ms: u64,
    /// Reason recorded for blocked shields
    pub block_reason: Option<String>,
}

/// Shield queue of one chain, keyed by blinded commitment.
#[derive(Debug, Clone)]
pub struct ShieldQueueDb {
    entries: Collection<ShieldQueueEntry>,
}

impl ShieldQueueDb {
    /// Open the shield queue for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain) -> Self {
        Self {
            entries: Collection::new(store, chain, "shield-queue"),
        }
    }

    /// Queue a shield. Returns `false` if it was already queued.
    pub async fn insert_pending(
        &self,
        commitment_hash: &str,
        blinded_commitment: &BlindedCommitment,
        now_ms: u64,
    ) -> StoreResult<bool> {
        let entry = ShieldQueueEntry {
            commitment_hash: commitment_hash.to_string(),
            blinded_commitment: blinded_commitment.clone(),
            status: ShieldQueueStatus::Pending,
            queued_at_ms: now_ms,
            updated_at_ms: now_ms,
            block_reason: None,
        };
        self.entries.insert_idempotent(blinded_commitment, &entry).await
    }

    /// Fetch a queued shield.
    pub async fn get(&self, blinded_commitment: &str) -> StoreResult<Option<ShieldQueueEntry>> {
        self.entries.get(blinded_commitment).await
    }

    /// Move a shield to a new status.
    pub async fn update_status(
        &self,
        entry: &ShieldQueueEntry,
        status: ShieldQueueStatus,
        block_reason: Option<String>,
        now_ms: u64,
    ) -> StoreResult<()> {
        let updated = ShieldQueueEntry {
            status,
            block_reason,
            updated_at_ms: now_ms,
            ..entry.clone()
        };
        self.entries.upsert(&entry.blinded_commitment, &updated).await
    }

    /// Pending shields queued at or before `cutoff_ms`, oldest first.
    pub async fn pending_before(&self, cutoff_ms: u64) -> StoreResult<Vec<ShieldQueueEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .values(&KeyRange::default())
            .await?
            .into_iter()
            .filter(|entry| entry.status == ShieldQueueStatus::Pending && entry.queued_at_ms <= cutoff_ms)
            .collect();
        entries.sort_by_key(|entry| entry.queued_at_ms);
        Ok(entries)
    }

    /// Shields in `status`, oldest status change first.
    pub async fn with_status(&self, status: ShieldQueueStatus) -> StoreResult<Vec<ShieldQueueEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .values(&KeyRange::default())
            .await?
            .into_iter()
            .filter(|entry| entry.status == status)
            .collect();
        entries.sort_by_key(|entry| entry.updated_at_ms);
        Ok(entries)
    }

    /// Counts by status.
    pub async fn counts(&self) -> StoreResult<ShieldQueueCounts> {
        let mut counts = ShieldQueueCounts::default();
        for entry in self.entries.values(&KeyRange::default()).await? {
            match entry.status {
                ShieldQueueStatus::Pending => counts.pending += 1,
                ShieldQueueStatus::Allowed => counts.allowed += 1,
                ShieldQueueStatus::Blocked => counts.blocked += 1,
            }
        }
        Ok(counts)
    }
}
