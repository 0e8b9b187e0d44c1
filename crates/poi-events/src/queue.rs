//! Single-writer event queue for the owned list
//!
//! Accepted proofs become unsigned [`PoiEvent`]s queued here. A drain pass
//! takes the queue front, assigns the next log index and starting commitment
//! index, signs, persists and replays it, then moves on until the queue is
//! empty. Only one drain runs at a time; a second caller returns immediately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use poi_core::{BlindedCommitment, Chain, ListKey, ListSigner, PoiError, PoiEvent, Result, SignedPoiEvent};
use tokio::sync::Notify;

use crate::log::EventLog;

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Events signed and persisted
    pub persisted: usize,
    /// Queued events whose commitments were all attested already
    pub discarded: usize,
}

/// Event queue of the owned list on one chain.
pub struct PoiEventQueue {
    list_key: ListKey,
    signer: ListSigner,
    log: EventLog,
    pending: Mutex<VecDeque<PoiEvent>>,
    min_next_index: AtomicU64,
    draining: tokio::sync::Mutex<()>,
    notify: Notify,
    retry_delay: Duration,
}

impl std::fmt::Debug for PoiEventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoiEventQueue")
            .field("list_key", &self.list_key)
            .field("chain", &self.log.chain())
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}

impl PoiEventQueue {
    /// Create the queue for the list `signer` operates.
    pub fn new(signer: ListSigner, log: EventLog, retry_delay: Duration) -> Self {
        Self {
            list_key: signer.list_key(),
            signer,
            log,
            pending: Mutex::new(VecDeque::new()),
            min_next_index: AtomicU64::new(0),
            draining: tokio::sync::Mutex::new(()),
            notify: Notify::new(),
            retry_delay,
        }
    }

    /// Owned list.
    pub fn list_key(&self) -> &ListKey {
        &self.list_key
    }

    /// Chain scope.
    pub fn chain(&self) -> Chain {
        self.log.chain()
    }

    /// Underlying event log.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Queue an event unless one with the same first commitment is queued.
    ///
    /// Wakes the drain loop. Returns `false` for duplicates and empty events.
    pub fn enqueue(&self, event: PoiEvent) -> bool {
        let Some(first) = event.first_commitment().cloned() else {
            tracing::warn!(list_key = %self.list_key, "refusing to queue event without commitments");
            return false;
        };
        {
            let mut pending = self.pending.lock();
            if pending
                .iter()
                .any(|queued| queued.first_commitment() == Some(&first))
            {
                return false;
            }
            pending.push_back(event);
        }
        self.notify.notify_one();
        true
    }

    /// Raise the minimum next index; drains below it are skipped.
    pub fn raise_min_next_index(&self, index: u64) {
        let previous = self.min_next_index.fetch_max(index, Ordering::SeqCst);
        if index > previous {
            tracing::info!(list_key = %self.list_key, chain = %self.chain(), index, "raised minimum next event index");
        }
    }

    /// Current minimum next index.
    pub fn min_next_index(&self) -> u64 {
        self.min_next_index.load(Ordering::SeqCst)
    }

    fn front(&self) -> Option<PoiEvent> {
        self.pending.lock().front().cloned()
    }

    fn pop_front_if(&self, event: &PoiEvent) {
        let mut pending = self.pending.lock();
        if pending.front() == Some(event) {
            pending.pop_front();
        }
    }

    /// Commitments of `event` not yet in the accumulator, in order and
    /// without repeats.
    async fn unattested(&self, event: &PoiEvent) -> Result<Vec<BlindedCommitment>> {
        let accumulator = self.log.registry().get(self.chain(), &self.list_key)?;
        let mut fresh: Vec<BlindedCommitment> = Vec::with_capacity(event.blinded_commitments.len());
        for commitment in &event.blinded_commitments {
            if !fresh.contains(commitment) && !accumulator.contains(commitment).await? {
                fresh.push(commitment.clone());
            }
        }
        Ok(fresh)
    }

    /// Drain the queue until empty.
    ///
    /// Fails with an ordering error when another drain is running, when the
    /// next index is below the watermark, or when the accumulator stays busy;
    /// the front event stays queued in every such case.
    pub async fn drain(&self) -> Result<DrainReport> {
        let _guard = self
            .draining
            .try_lock()
            .map_err(|_| PoiError::ordering(format!("{}: drain already running", self.list_key)))?;
        let mut report = DrainReport::default();

        while let Some(event) = self.front() {
            // Persisted by an earlier pass that could not finish applying it
            self.log.catch_up(&self.list_key).await?;
            let fresh = self.unattested(&event).await?;
            if fresh.is_empty() {
                tracing::debug!(list_key = %self.list_key, kind = event.kind.name(), "queued event already attested, discarding");
                self.pop_front_if(&event);
                report.discarded += 1;
                continue;
            }
            let attesting = if fresh.len() == event.blinded_commitments.len() {
                event.clone()
            } else {
                tracing::debug!(
                    list_key = %self.list_key,
                    queued = event.blinded_commitments.len(),
                    fresh = fresh.len(),
                    "dropping already attested commitments from queued event"
                );
                PoiEvent {
                    blinded_commitments: fresh,
                    ..event.clone()
                }
            };

            let (index, starting_index) = self.log.next_position(&self.list_key).await?;
            let watermark = self.min_next_index();
            if index < watermark {
                return Err(PoiError::ordering(format!(
                    "{}: next index {index} below peer watermark {watermark}, awaiting sync",
                    self.list_key
                )));
            }

            let signature = self.signer.sign_event(
                index,
                starting_index,
                &attesting.blinded_commitments,
                &attesting.proof,
            )?;
            let signed = SignedPoiEvent {
                index,
                blinded_commitment_starting_index: starting_index,
                event: attesting,
                signature,
            };
            self.log.persist_and_apply(&self.list_key, &signed).await?;
            self.pop_front_if(&event);
            report.persisted += 1;
        }
        Ok(report)
    }

    /// Drain whenever woken; re-drive after ordering conflicts.
    ///
    /// A non-retryable failure drops the front event so the queue keeps
    /// moving. Runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(list_key = %self.list_key, chain = %self.chain(), "event queue loop started");
        loop {
            if self.is_empty() {
                self.notify.notified().await;
            }
            match self.drain().await {
                Ok(report) if report.persisted > 0 || report.discarded > 0 => {
                    tracing::debug!(
                        list_key = %self.list_key,
                        persisted = report.persisted,
                        discarded = report.discarded,
                        "drained event queue"
                    );
                }
                Ok(_) => {}
                Err(err) if err.is_retryable() => {
                    tracing::debug!(list_key = %self.list_key, error = %err, "event queue drain deferred");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    // Its proof record queues it again when the mempools next inflate
                    if let Some(event) = self.front() {
                        self.pop_front_if(&event);
                    }
                    tracing::error!(list_key = %self.list_key, error = %err, "dropped queued event");
                }
            }
        }
    }
}
