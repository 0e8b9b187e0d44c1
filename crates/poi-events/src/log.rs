//! Ordered event log operations
//!
//! The log is the source of truth for every accumulator. Events are written
//! strictly in index order and replayed into the accumulator immediately
//! after persistence, so the accumulator can always be rebuilt from the log.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use poi_core::config::EVENT_PAGE_SIZE;
use poi_core::hash::normalize_hex;
use poi_core::{Chain, ListKey, PoiError, Result, SignedPoiEvent};
use poi_merkle::AccumulatorRegistry;
use poi_store::{DocumentStore, PoiOrderedEventsDb};

/// Attempts to apply a persisted event while its accumulator is busy.
const APPLY_ATTEMPTS: u32 = 20;

/// Persistence and replay path shared by the local queue and peer sync.
#[derive(Debug, Clone)]
pub struct EventLog {
    chain: Chain,
    events: PoiOrderedEventsDb,
    registry: Arc<AccumulatorRegistry>,
    retry_delay: Duration,
}

impl EventLog {
    /// Open the log of `chain`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        chain: Chain,
        registry: Arc<AccumulatorRegistry>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            chain,
            events: PoiOrderedEventsDb::new(store, chain),
            registry,
            retry_delay,
        }
    }

    /// Chain scope.
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Accumulator registry the log replays into.
    pub fn registry(&self) -> &Arc<AccumulatorRegistry> {
        &self.registry
    }

    /// Number of events in the list's log.
    pub async fn length(&self, list_key: &ListKey) -> Result<u64> {
        Ok(self.events.count(list_key).await?)
    }

    /// Last persisted event.
    pub async fn last_event(&self, list_key: &ListKey) -> Result<Option<SignedPoiEvent>> {
        Ok(self.events.last_event(list_key).await?)
    }

    /// `(next index, next starting commitment index)` of the list.
    pub async fn next_position(&self, list_key: &ListKey) -> Result<(u64, u64)> {
        Ok(match self.last_event(list_key).await? {
            Some(last) => (last.index + 1, last.next_starting_index()),
            None => (0, 0),
        })
    }

    /// Events with `start <= index < end`, at most `limit`.
    pub async fn get_events(
        &self,
        list_key: &ListKey,
        start: u64,
        end: u64,
        limit: usize,
    ) -> Result<Vec<SignedPoiEvent>> {
        if end <= start {
            return Ok(Vec::new());
        }
        Ok(self.events.range(list_key, start, end, limit).await?)
    }

    /// Persist an already-indexed event and replay it into the accumulator.
    ///
    /// Returns `false` when the same event is already persisted. An index
    /// beyond the next free slot or a conflicting event at an occupied index
    /// is an ordering error. A wrong starting commitment index, or a
    /// commitment that is zero, repeated or already attested, is rejected
    /// before anything is written. A lagging accumulator is caught up first.
    pub async fn persist_and_apply(&self, list_key: &ListKey, event: &SignedPoiEvent) -> Result<bool> {
        let (next_index, next_start) = self.next_position(list_key).await?;
        if event.index < next_index {
            return match self.events.get_event(list_key, event.index).await? {
                Some(existing) if existing == *event => Ok(false),
                _ => Err(PoiError::ordering(format!(
                    "{list_key}: conflicting event at index {}",
                    event.index
                ))),
            };
        }
        if event.index > next_index {
            return Err(PoiError::ordering(format!(
                "{list_key}: expected event index {next_index}, got {}",
                event.index
            )));
        }
        if event.blinded_commitment_starting_index != next_start {
            return Err(PoiError::validation(format!(
                "{list_key}: event {} starts at commitment {}, expected {next_start}",
                event.index, event.blinded_commitment_starting_index
            )));
        }
        if event.event.blinded_commitments.is_empty() {
            return Err(PoiError::validation(format!(
                "{list_key}: event {} has no commitments",
                event.index
            )));
        }
        self.catch_up(list_key).await?;
        self.check_commitments(list_key, event).await?;

        if !self.events.insert_event(list_key, event).await? {
            return Err(PoiError::ordering(format!(
                "{list_key}: event index {} taken concurrently",
                event.index
            )));
        }
        self.apply(list_key, event).await?;
        tracing::info!(
            list_key = %list_key,
            chain = %self.chain,
            index = event.index,
            kind = event.event.kind.name(),
            "persisted POI event"
        );
        Ok(true)
    }

    async fn check_commitments(&self, list_key: &ListKey, event: &SignedPoiEvent) -> Result<()> {
        let accumulator = self.registry.get(self.chain, list_key)?;
        let mut seen = HashSet::with_capacity(event.event.blinded_commitments.len());
        for commitment in &event.event.blinded_commitments {
            let leaf = normalize_hex(commitment);
            if accumulator.zeros().first() == Some(&leaf) {
                return Err(PoiError::validation(format!(
                    "{list_key}: event {} carries the zero commitment",
                    event.index
                )));
            }
            if !seen.insert(leaf.clone()) {
                return Err(PoiError::validation(format!(
                    "{list_key}: event {} repeats commitment {leaf}",
                    event.index
                )));
            }
            if accumulator.contains(&leaf).await? {
                return Err(PoiError::validation(format!(
                    "{list_key}: event {} re-attests commitment {leaf}",
                    event.index
                )));
            }
        }
        Ok(())
    }

    async fn apply(&self, list_key: &ListKey, event: &SignedPoiEvent) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.registry.add_event(self.chain, list_key, event).await {
                Ok(()) => return Ok(()),
                Err(err @ PoiError::AccumulatorBusy { .. }) if attempt + 1 < APPLY_ATTEMPTS => {
                    tracing::debug!(list_key = %list_key, index = event.index, error = %err, "accumulator busy, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Replay the backlog when the accumulator holds fewer leaves than the
    /// log carries commitments. Returns the number of events replayed.
    pub async fn catch_up(&self, list_key: &ListKey) -> Result<u64> {
        let accumulator = self.registry.get(self.chain, list_key)?;
        let (_, next_start) = self.next_position(list_key).await?;
        if accumulator.leaf_count() >= next_start {
            return Ok(0);
        }
        self.replay_into_accumulator(list_key, EVENT_PAGE_SIZE as usize)
            .await
    }

    /// Replay persisted events the accumulator has not applied yet.
    pub async fn replay_into_accumulator(&self, list_key: &ListKey, page_size: usize) -> Result<u64> {
        let accumulator = self.registry.get(self.chain, list_key)?;
        let length = self.length(list_key).await?;
        let mut replayed = 0;
        let mut start = 0;
        while start < length {
            let page = self
                .get_events(list_key, start, length, page_size.max(1))
                .await?;
            let Some(last) = page.last() else { break };
            start = last.index + 1;
            for event in page {
                if event.next_starting_index() > accumulator.leaf_count() {
                    self.apply(list_key, &event).await?;
                    replayed += 1;
                }
            }
        }
        if replayed > 0 {
            tracing::info!(list_key = %list_key, chain = %self.chain, replayed, "replayed events into accumulator");
        }
        Ok(replayed)
    }

    /// Remove the list's events and accumulator. Debug and test use only.
    pub async fn clear_all_events(&self, list_key: &ListKey) -> Result<()> {
        let accumulator = self.registry.get(self.chain, list_key)?;
        let removed = self.events.clear(list_key).await?;
        accumulator.clear().await?;
        tracing::warn!(list_key = %list_key, chain = %self.chain, removed, "cleared all POI events");
        Ok(())
    }
}
