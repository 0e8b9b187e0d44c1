//! Ordered POI event log per list

use std::sync::Arc;

use poi_core::{BlindedCommitment, Chain, ListKey, SignedPoiEvent};

use crate::collection::Collection;
use crate::store::{DocumentStore, KeyRange, StoreResult};

fn event_key(list_key: &ListKey, index: u64) -> String {
    format!("{list_key}/{index:020}")
}

fn list_prefix(list_key: &ListKey) -> String {
    format!("{list_key}/")
}

/// Signed events keyed by `(list, index)` with a commitment lookup index.
#[derive(Debug, Clone)]
pub struct PoiOrderedEventsDb {
    events: Collection<SignedPoiEvent>,
    commitments: Collection<u64>,
}

impl PoiOrderedEventsDb {
    /// Open the event log for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain) -> Self {
        Self {
            events: Collection::new(store.clone(), chain, "poi-events"),
            commitments: Collection::new(store, chain, "poi-event-commitments"),
        }
    }

    /// Persist an event. Returns `false` if `(list, index)` is already taken.
    pub async fn insert_event(&self, list_key: &ListKey, event: &SignedPoiEvent) -> StoreResult<bool> {
        if !self
            .events
            .insert_idempotent(&event_key(list_key, event.index), event)
            .await?
        {
            return Ok(false);
        }
        for commitment in &event.event.blinded_commitments {
            self.commitments
                .insert_idempotent(&format!("{list_key}/{commitment}"), &event.index)
                .await?;
        }
        Ok(true)
    }

    /// Event at `index`.
    pub async fn get_event(&self, list_key: &ListKey, index: u64) -> StoreResult<Option<SignedPoiEvent>> {
        self.events.get(&event_key(list_key, index)).await
    }

    /// Highest-index event of the list.
    pub async fn last_event(&self, list_key: &ListKey) -> StoreResult<Option<SignedPoiEvent>> {
        self.events.last(&list_prefix(list_key)).await
    }

    /// Number of events in the list's log.
    pub async fn count(&self, list_key: &ListKey) -> StoreResult<u64> {
        self.events.count(&KeyRange::prefix(list_prefix(list_key))).await
    }

    /// Events with `start <= index < end`, ascending, at most `limit`.
    pub async fn range(
        &self,
        list_key: &ListKey,
        start: u64,
        end: u64,
        limit: usize,
    ) -> StoreResult<Vec<SignedPoiEvent>> {
        let range = KeyRange::prefix(list_prefix(list_key))
            .between(event_key(list_key, start), event_key(list_key, end))
            .limit(limit);
        self.events.values(&range).await
    }

    /// Index of the event that carries `commitment`, if any.
    pub async fn event_index_for_commitment(
        &self,
        list_key: &ListKey,
        commitment: &BlindedCommitment,
    ) -> StoreResult<Option<u64>> {
        self.commitments.get(&format!("{list_key}/{commitment}")).await
    }

    /// Remove every event of the list.
    pub async fn clear(&self, list_key: &ListKey) -> StoreResult<u64> {
        let range = KeyRange::prefix(list_prefix(list_key));
        self.commitments.delete_range(&range).await?;
        self.events.delete_range(&range).await
    }
}
