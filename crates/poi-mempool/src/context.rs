//! Dependencies shared by the mempools of one chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use poi_core::{Chain, ListKey, PoiError, PoiEvent, ProofVerifier, Result};
use poi_events::PoiEventQueue;
use poi_merkle::{AccumulatorRegistry, TxidMerkletree};
use poi_store::DocumentStore;

/// Result of a proof submission that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Verified, persisted and cached
    Accepted,
    /// Already held or already attested; nothing changed
    AlreadyKnown,
}

/// Chain-scoped collaborators of every mempool.
#[derive(Clone)]
pub struct MempoolContext {
    /// Chain scope
    pub chain: Chain,
    /// Persistent store
    pub store: Arc<dyn DocumentStore>,
    /// Accumulators of every configured list
    pub registry: Arc<AccumulatorRegistry>,
    /// Txid ledger of the chain
    pub txid: Arc<TxidMerkletree>,
    /// Snark verifier
    pub verifier: Arc<dyn ProofVerifier>,
    /// Event queue of the owned list, when this node operates one
    pub queue: Option<Arc<PoiEventQueue>>,
    /// Page cap for filtered fetches
    pub page_size: usize,
}

impl std::fmt::Debug for MempoolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MempoolContext")
            .field("chain", &self.chain)
            .field("owned_list", &self.queue.as_ref().map(|queue| queue.list_key()))
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl MempoolContext {
    /// Reject lists this node does not track.
    pub fn require_list(&self, list_key: &ListKey) -> Result<()> {
        if self.registry.has_list(list_key) {
            Ok(())
        } else {
            Err(PoiError::UnknownList(list_key.clone()))
        }
    }

    /// Queue of `list_key` if this node operates it.
    pub fn owned_queue(&self, list_key: &ListKey) -> Option<&Arc<PoiEventQueue>> {
        self.queue
            .as_ref()
            .filter(|queue| queue.list_key() == list_key)
    }

    /// Whether the commitment is already a leaf of the list's accumulator.
    pub async fn is_attested(&self, list_key: &ListKey, commitment: &str) -> Result<bool> {
        self.registry.get(self.chain, list_key)?.contains(commitment).await
    }

    /// Queue an event for the owned list; no-op for other lists.
    pub fn enqueue_for(&self, list_key: &ListKey, event: PoiEvent) {
        if let Some(queue) = self.owned_queue(list_key) {
            if queue.enqueue(event) {
                tracing::debug!(list_key = %list_key, chain = %self.chain, "queued POI event");
            }
        }
    }
}

/// Monotonic arrival counter, resumed past the highest persisted sequence.
#[derive(Debug, Default)]
pub(crate) struct Sequence(AtomicU64);

impl Sequence {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn resume_after(&self, highest: u64) {
        self.0.fetch_max(highest + 1, Ordering::SeqCst);
    }
}
