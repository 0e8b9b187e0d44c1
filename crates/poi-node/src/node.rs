//! Node facade
//!
//! [`PoiNode`] owns the background loops and exposes the inbound request
//! handlers peers and wallets call. Handlers are transport independent; a
//! wire server maps its routes onto them one to one.

use std::sync::Arc;

use parking_lot::Mutex;
use poi_core::signature::verify_txid_checkpoint;
use poi_core::{
    BlindedCommitmentData, Chain, ListKey, MempoolProof, MerkleProof, NodeConfig, NodeStatus,
    PoiStatusMap, ProofKind, Result, SignedPoiEvent, ValidatedTxidCheckpoint,
};
use poi_events::DrainReport;
use poi_mempool::{DiscoveredShield, MempoolPruner, PromotionReport, PruneReport, SubmitOutcome};
use poi_sync::{RoundRobinSyncer, SyncReport};
use tokio::task::JoinHandle;

use crate::builder::PoiNodeBuilder;
use crate::services::NodeServices;

/// A running (or startable) Proof of Innocence node.
pub struct PoiNode {
    services: Arc<NodeServices>,
    syncer: Arc<RoundRobinSyncer>,
    pruner: MempoolPruner,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PoiNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoiNode")
            .field("node_name", &self.services.config.node_name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PoiNode {
    /// Start building a node from its configuration.
    pub fn builder(config: NodeConfig) -> PoiNodeBuilder {
        PoiNodeBuilder::new(config)
    }

    pub(crate) fn new(
        services: Arc<NodeServices>,
        syncer: Arc<RoundRobinSyncer>,
        pruner: MempoolPruner,
    ) -> Self {
        Self {
            services,
            syncer,
            pruner,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Node name from the configuration.
    pub fn name(&self) -> &str {
        &self.services.config.node_name
    }

    /// Tracked lists, owned list first.
    pub fn list_keys(&self) -> &[ListKey] {
        &self.services.list_keys
    }

    /// List this node signs for.
    pub fn owned_list(&self) -> Option<ListKey> {
        self.services.signer.as_ref().map(|signer| signer.list_key())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the background loops.
    ///
    /// Peers are asked for their log lengths first so the event queue never
    /// assigns an index a peer already holds. Calling `start` on a running
    /// node is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.syncer.raise_watermarks().await;

        let config = &self.services.config;
        let mut handles = Vec::new();
        for services in self.services.chains.values() {
            if let Some(queue) = &services.queue {
                handles.push(tokio::spawn(queue.clone().run()));
                handles.push(tokio::spawn(
                    services
                        .pools
                        .shield_queue
                        .clone()
                        .run(config.promotion_interval()),
                ));
            }
        }
        handles.push(tokio::spawn(
            self.pruner.clone().run(config.pruner_interval()),
        ));
        handles.push(tokio::spawn(self.syncer.clone().run()));

        tracing::info!(node = %config.node_name, tasks = handles.len(), "node started");
        self.tasks.lock().extend(handles);
        Ok(())
    }

    /// Abort every background loop. In-flight cycles are dropped; all state
    /// they had persisted stays valid.
    pub fn stop(&self) {
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in &handles {
            handle.abort();
        }
        tracing::info!(node = %self.services.config.node_name, tasks = handles.len(), "node stopped");
    }

    /// Whether background loops are running.
    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    // =========================================================================
    // Inbound handlers
    // =========================================================================

    /// Txid ledger state per chain and event log length per list.
    pub async fn node_status(&self) -> Result<NodeStatus> {
        self.services.node_status().await
    }

    /// Events `[start, end)` of a list, at most one page.
    pub async fn get_events(
        &self,
        chain: Chain,
        list_key: &ListKey,
        start: u64,
        end: u64,
    ) -> Result<Vec<SignedPoiEvent>> {
        self.services.require_list(list_key)?;
        let page_size = self.services.config.event_page_size.max(1);
        let end = end.min(start.saturating_add(page_size));
        self.services
            .chain(chain)?
            .log
            .get_events(list_key, start, end, page_size as usize)
            .await
    }

    /// Entries of one mempool absent from the caller's serialized filter.
    pub async fn get_filtered_proofs(
        &self,
        chain: Chain,
        kind: ProofKind,
        list_key: Option<&ListKey>,
        serialized_filter: &str,
    ) -> Result<Vec<MempoolProof>> {
        self.services
            .chain(chain)?
            .pools
            .get_filtered(kind, list_key, serialized_filter)
    }

    /// Submit a proof and forward it to peers once accepted.
    pub async fn submit_proof(&self, chain: Chain, proof: MempoolProof) -> Result<SubmitOutcome> {
        let pools = &self.services.chain(chain)?.pools;
        let outcome = pools.submit(proof.clone()).await?;
        if outcome == SubmitOutcome::Accepted {
            self.syncer.broadcast_proof(chain, &proof).await;
        }
        Ok(outcome)
    }

    /// POI status of each commitment for each requested list.
    pub async fn get_poi_statuses(
        &self,
        chain: Chain,
        list_keys: &[ListKey],
        commitments: &[BlindedCommitmentData],
    ) -> Result<PoiStatusMap> {
        for list_key in list_keys {
            self.services.require_list(list_key)?;
        }
        let pools = &self.services.chain(chain)?.pools;
        self.services
            .registry
            .get_statuses(chain, list_keys, commitments, pools.as_ref())
            .await
    }

    /// Inclusion proofs of attested commitments.
    pub async fn get_merkle_proofs(
        &self,
        chain: Chain,
        list_key: &ListKey,
        commitments: &[String],
    ) -> Result<Vec<MerkleProof>> {
        self.services.chain(chain)?;
        let accumulator = self.services.registry.get(chain, list_key)?;
        let mut proofs = Vec::with_capacity(commitments.len());
        for commitment in commitments {
            proofs.push(accumulator.get_merkle_proof_from_commitment(commitment).await?);
        }
        Ok(proofs)
    }

    /// Whether every root was at some point a root of the list's accumulator.
    pub async fn validate_poi_merkleroots(
        &self,
        chain: Chain,
        list_key: &ListKey,
        merkleroots: &[String],
    ) -> Result<bool> {
        if merkleroots.is_empty() {
            return Ok(false);
        }
        self.services.chain(chain)?;
        let accumulator = self.services.registry.get(chain, list_key)?;
        for root in merkleroots {
            if !accumulator.has_historical_root(root).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `merkleroot` is the local txid root at `txid_index`.
    pub async fn validate_txid_merkleroot(
        &self,
        chain: Chain,
        txid_index: u64,
        merkleroot: &str,
    ) -> Result<bool> {
        self.services
            .chain(chain)?
            .txid
            .validate_merkleroot(txid_index, merkleroot)
            .await
    }

    /// Accept a validated txid checkpoint pushed by a peer.
    ///
    /// Only checkpoints signed by a tracked list whose root matches the
    /// local ledger advance the frontier. Returns whether it moved.
    pub async fn receive_validated_txid(
        &self,
        chain: Chain,
        checkpoint: &ValidatedTxidCheckpoint,
    ) -> Result<bool> {
        self.services.require_list(&checkpoint.list_key)?;
        verify_txid_checkpoint(checkpoint)?;
        let txid = &self.services.chain(chain)?.txid;
        if !txid
            .validate_merkleroot(checkpoint.txid_index, &checkpoint.merkleroot)
            .await?
        {
            tracing::warn!(
                chain = %chain,
                list_key = %checkpoint.list_key,
                txid_index = checkpoint.txid_index,
                "pushed txid checkpoint does not match local ledger"
            );
            return Ok(false);
        }
        txid.set_validated(checkpoint.txid_index, &checkpoint.merkleroot)
            .await
    }

    // =========================================================================
    // Chain indexer entry points
    // =========================================================================

    /// Queue shields discovered on chain for screening.
    pub async fn queue_shields(&self, chain: Chain, shields: &[DiscoveredShield]) -> Result<usize> {
        self.services
            .chain(chain)?
            .pools
            .shield_queue
            .queue_shields(shields)
            .await
    }

    /// Append scanned railgun txids. Returns the new current txid index.
    pub async fn append_txids(&self, chain: Chain, txids: &[String]) -> Result<Option<u64>> {
        self.services.chain(chain)?.txid.append_txids(txids).await
    }

    // =========================================================================
    // One-shot drivers of the background loops
    // =========================================================================

    /// Drain the owned list's event queue once.
    pub async fn drain_events(&self, chain: Chain) -> Result<DrainReport> {
        match &self.services.chain(chain)?.queue {
            Some(queue) => queue.drain().await,
            None => Ok(DrainReport::default()),
        }
    }

    /// Screen queued shields past the pending period once.
    pub async fn promote_shields(&self, chain: Chain) -> Result<PromotionReport> {
        self.services
            .chain(chain)?
            .pools
            .shield_queue
            .promote()
            .await
    }

    /// Prune attested proofs once.
    pub async fn prune_mempools(&self) -> Result<PruneReport> {
        self.pruner.prune().await
    }

    /// Poll one peer once.
    pub async fn sync_with(&self, peer: &str) -> Result<SyncReport> {
        self.syncer.sync_peer(peer).await
    }

    // =========================================================================
    // Debug
    // =========================================================================

    /// Remove a list's events and accumulator on one chain.
    pub async fn clear_all_events(&self, chain: Chain, list_key: &ListKey) -> Result<()> {
        self.services.require_list(list_key)?;
        self.services
            .chain(chain)?
            .log
            .clear_all_events(list_key)
            .await
    }
}

impl Drop for PoiNode {
    fn drop(&mut self) {
        for handle in self.tasks.get_mut().drain(..) {
            handle.abort();
        }
    }
}
