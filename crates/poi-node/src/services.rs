//! Per-chain services and the local effects handed to the syncer

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use poi_core::{
    Chain, ChainStatus, ListKey, ListSigner, ListStatus, MempoolProof, NodeConfig, NodeStatus,
    PoiError, ProofKind, RailgunTxidStatus, Result, ShieldQueueCounts, SignedPoiEvent,
    ValidatedTxidCheckpoint,
};
use poi_events::{EventLog, PoiEventQueue};
use poi_mempool::{ChainMempools, SubmitOutcome};
use poi_merkle::{AccumulatorRegistry, TxidMerkletree};
use poi_sync::LocalPoiEffects;

/// Everything the node runs for one chain.
#[derive(Debug)]
pub(crate) struct ChainServices {
    pub(crate) log: EventLog,
    pub(crate) txid: Arc<TxidMerkletree>,
    pub(crate) queue: Option<Arc<PoiEventQueue>>,
    pub(crate) pools: Arc<ChainMempools>,
}

impl ChainServices {
    fn owns(&self, list_key: &ListKey) -> bool {
        self.queue
            .as_ref()
            .is_some_and(|queue| queue.list_key() == list_key)
    }
}

/// Shared node state. Background loops and the syncer hold it by `Arc`.
#[derive(Debug)]
pub(crate) struct NodeServices {
    pub(crate) config: NodeConfig,
    pub(crate) signer: Option<ListSigner>,
    pub(crate) list_keys: Vec<ListKey>,
    pub(crate) registry: Arc<AccumulatorRegistry>,
    pub(crate) chains: BTreeMap<Chain, ChainServices>,
}

impl NodeServices {
    pub(crate) fn chain(&self, chain: Chain) -> Result<&ChainServices> {
        self.chains
            .get(&chain)
            .ok_or_else(|| PoiError::validation(format!("chain {chain} is not served")))
    }

    pub(crate) fn require_list(&self, list_key: &ListKey) -> Result<()> {
        if self.list_keys.contains(list_key) {
            Ok(())
        } else {
            Err(PoiError::UnknownList(list_key.clone()))
        }
    }

    pub(crate) async fn node_status(&self) -> Result<NodeStatus> {
        let mut chains = Vec::with_capacity(self.chains.len());
        for (chain, services) in &self.chains {
            let mut lists = BTreeMap::new();
            for list_key in &self.list_keys {
                let (pending_transact_proofs, blocked_shields) =
                    services.pools.list_counts(list_key);
                let shield_queue = if services.owns(list_key) {
                    services.pools.shield_queue.counts().await?
                } else {
                    ShieldQueueCounts::default()
                };
                lists.insert(
                    list_key.clone(),
                    ListStatus {
                        poi_events_length: services.log.length(list_key).await?,
                        pending_transact_proofs,
                        blocked_shields,
                        shield_queue,
                    },
                );
            }
            chains.push(ChainStatus {
                chain: *chain,
                txid_status: services.txid.status().await?,
                lists,
                legacy_transact_proofs: services.pools.legacy.len() as u64,
            });
        }
        Ok(NodeStatus {
            list_keys: self.list_keys.clone(),
            chains,
        })
    }
}

#[async_trait]
impl LocalPoiEffects for NodeServices {
    fn chains(&self) -> Vec<Chain> {
        self.chains.keys().copied().collect()
    }

    fn list_keys(&self) -> Vec<ListKey> {
        self.list_keys.clone()
    }

    fn owned_list(&self) -> Option<ListKey> {
        self.signer.as_ref().map(ListSigner::list_key)
    }

    async fn poi_events_length(&self, chain: Chain, list_key: &ListKey) -> Result<u64> {
        self.chain(chain)?.log.length(list_key).await
    }

    async fn apply_signed_event(
        &self,
        chain: Chain,
        list_key: &ListKey,
        event: &SignedPoiEvent,
    ) -> Result<bool> {
        self.chain(chain)?.log.persist_and_apply(list_key, event).await
    }

    fn raise_min_next_index(&self, chain: Chain, index: u64) {
        if let Some(queue) = self.chains.get(&chain).and_then(|services| services.queue.as_ref()) {
            queue.raise_min_next_index(index);
        }
    }

    fn proof_filter(&self, chain: Chain, kind: ProofKind, list_key: Option<&ListKey>) -> Result<String> {
        self.chain(chain)?.pools.serialized_filter(kind, list_key)
    }

    async fn submit_proof(&self, chain: Chain, proof: MempoolProof) -> Result<bool> {
        let outcome = self.chain(chain)?.pools.submit(proof).await?;
        Ok(outcome == SubmitOutcome::Accepted)
    }

    async fn txid_status(&self, chain: Chain) -> Result<RailgunTxidStatus> {
        self.chain(chain)?.txid.status().await
    }

    async fn txid_root_at(&self, chain: Chain, txid_index: u64) -> Result<Option<String>> {
        self.chain(chain)?.txid.historical_root(txid_index).await
    }

    async fn set_validated_txid(&self, chain: Chain, txid_index: u64, merkleroot: &str) -> Result<bool> {
        self.chain(chain)?.txid.set_validated(txid_index, merkleroot).await
    }

    async fn rollback_txid(&self, chain: Chain) -> Result<()> {
        self.chain(chain)?.txid.rollback_to_validated().await
    }

    fn sign_txid_checkpoint(&self, txid_index: u64, merkleroot: &str) -> Result<Option<ValidatedTxidCheckpoint>> {
        self.signer
            .as_ref()
            .map(|signer| signer.sign_txid_checkpoint(txid_index, merkleroot))
            .transpose()
    }
}
