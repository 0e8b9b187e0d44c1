//! Node construction
//!
//! The builder opens every accumulator, txid ledger, event queue and mempool
//! for the configured chains and inflates their caches from the store,
//! queueing the owned list's unattested proofs again. The node is idle
//! until [`PoiNode::start`](crate::PoiNode::start).

use std::collections::BTreeMap;
use std::sync::Arc;

use poi_core::verifier::{AllowAllScreener, StaticVerifier};
use poi_core::{
    Clock, NodeConfig, PoiError, ProofVerifier, Result, ShieldScreener, SystemClock,
};
use poi_events::{EventLog, PoiEventQueue};
use poi_mempool::{ChainMempools, MempoolContext, MempoolPruner};
use poi_merkle::{AccumulatorRegistry, TxidMerkletree, TREE_DEPTH};
use poi_store::{DocumentStore, MemoryDocumentStore};
use poi_sync::{PeerTransport, RoundRobinSyncer, SyncerConfig};

use crate::network::LocalNetwork;
use crate::node::PoiNode;
use crate::services::{ChainServices, NodeServices};

/// Builder for [`PoiNode`].
pub struct PoiNodeBuilder {
    config: NodeConfig,
    store: Option<Arc<dyn DocumentStore>>,
    verifier: Option<Arc<dyn ProofVerifier>>,
    screener: Arc<dyn ShieldScreener>,
    clock: Arc<dyn Clock>,
    transport: Option<Arc<dyn PeerTransport>>,
    tree_depth: usize,
}

impl std::fmt::Debug for PoiNodeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoiNodeBuilder")
            .field("node_name", &self.config.node_name)
            .field("tree_depth", &self.tree_depth)
            .finish_non_exhaustive()
    }
}

impl PoiNodeBuilder {
    pub(crate) fn new(config: NodeConfig) -> Self {
        Self {
            config,
            store: None,
            verifier: None,
            screener: Arc::new(AllowAllScreener),
            clock: Arc::new(SystemClock),
            transport: None,
            tree_depth: TREE_DEPTH,
        }
    }

    /// Persistent store. Defaults to a fresh in-memory store.
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Snark verifier.
    ///
    /// Required unless `trust_upstream_proof_verification` is set.
    pub fn verifier(mut self, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Shield screening policy of the owned list. Defaults to allow-all.
    pub fn screener(mut self, screener: Arc<dyn ShieldScreener>) -> Self {
        self.screener = screener;
        self
    }

    /// Wall clock used by the shield queue.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Transport to configured peers.
    pub fn transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Merkle tree depth of every accumulator.
    pub fn tree_depth(mut self, depth: usize) -> Self {
        self.tree_depth = depth;
        self
    }

    /// Open every service and inflate caches from the store.
    pub async fn build(self) -> Result<PoiNode> {
        let config = self.config;
        config.validate()?;
        let signer = config.list_signer()?;
        let list_keys = config.all_list_keys()?;

        let verifier: Arc<dyn ProofVerifier> = match self.verifier {
            Some(verifier) => verifier,
            None if config.trust_upstream_proof_verification => {
                tracing::warn!(node = %config.node_name, "snark proofs are not verified locally");
                Arc::new(StaticVerifier::accepting())
            }
            None => {
                return Err(PoiError::config(
                    "no proof verifier supplied and trust_upstream_proof_verification is off",
                ))
            }
        };
        let transport: Arc<dyn PeerTransport> = match self.transport {
            Some(transport) => transport,
            None if config.peers.is_empty() => Arc::new(LocalNetwork::default()),
            None => return Err(PoiError::config("peers are configured but no transport was supplied")),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryDocumentStore::new()));

        let registry = Arc::new(
            AccumulatorRegistry::open_with_depth(
                store.clone(),
                &config.chains,
                &list_keys,
                self.tree_depth,
            )
            .await?,
        );

        let mut chains = BTreeMap::new();
        for chain in &config.chains {
            let txid = Arc::new(
                TxidMerkletree::open_with_depth(store.clone(), *chain, self.tree_depth).await?,
            );
            let log = EventLog::new(
                store.clone(),
                *chain,
                registry.clone(),
                config.queue_retry_delay(),
            );
            for list_key in &list_keys {
                // Events persisted by a run that stopped before applying them
                log.catch_up(list_key).await?;
            }
            let queue = signer.clone().map(|signer| {
                Arc::new(PoiEventQueue::new(
                    signer,
                    log.clone(),
                    config.queue_retry_delay(),
                ))
            });
            let ctx = MempoolContext {
                chain: *chain,
                store: store.clone(),
                registry: registry.clone(),
                txid: txid.clone(),
                verifier: verifier.clone(),
                queue: queue.clone(),
                page_size: config.mempool_page_size,
            };
            let pools = Arc::new(
                ChainMempools::open(
                    ctx,
                    signer.clone(),
                    self.screener.clone(),
                    self.clock.clone(),
                    config.shield_pending_period(),
                )
                .await?,
            );
            chains.insert(
                *chain,
                ChainServices {
                    log,
                    txid,
                    queue,
                    pools,
                },
            );
        }

        let pruner = MempoolPruner::new(chains.values().map(|services| services.pools.clone()).collect());
        let syncer_config = SyncerConfig::from_node_config(&config);
        tracing::info!(
            node = %config.node_name,
            chains = chains.len(),
            lists = list_keys.len(),
            owned_list = ?signer.as_ref().map(|signer| signer.list_key()),
            "node services ready"
        );

        let services = Arc::new(NodeServices {
            config,
            signer,
            list_keys,
            registry,
            chains,
        });
        let syncer = Arc::new(RoundRobinSyncer::new(
            services.clone(),
            transport,
            syncer_config,
        ));
        Ok(PoiNode::new(services, syncer, pruner))
    }
}
