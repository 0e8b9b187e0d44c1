//! In-process peer transport
//!
//! [`LocalNetwork`] routes the six peer operations straight to the inbound
//! handlers of nodes registered in the same process, addressed by name. It
//! backs multi-node tests and local devnets; a wire transport implements
//! [`PeerTransport`] the same way over its own protocol.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use poi_core::{
    Chain, ListKey, MempoolProof, NodeStatus, PoiError, ProofKind, Result, SignedPoiEvent,
    ValidatedTxidCheckpoint,
};
use poi_sync::PeerTransport;

use crate::node::PoiNode;

/// Registry of in-process nodes.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    nodes: RwLock<HashMap<String, Weak<PoiNode>>>,
}

impl LocalNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `node` reachable at `address`.
    pub fn register(&self, address: impl Into<String>, node: &Arc<PoiNode>) {
        self.nodes.write().insert(address.into(), Arc::downgrade(node));
    }

    /// Make `address` unreachable.
    pub fn unregister(&self, address: &str) {
        self.nodes.write().remove(address);
    }

    fn node(&self, address: &str) -> Result<Arc<PoiNode>> {
        self.nodes
            .read()
            .get(address)
            .and_then(Weak::upgrade)
            .ok_or_else(|| PoiError::transport(format!("peer {address} is unreachable")))
    }
}

#[async_trait]
impl PeerTransport for LocalNetwork {
    async fn node_status(&self, peer: &str) -> Result<NodeStatus> {
        self.node(peer)?.node_status().await
    }

    async fn get_events(
        &self,
        peer: &str,
        chain: Chain,
        list_key: &ListKey,
        start: u64,
        end: u64,
    ) -> Result<Vec<SignedPoiEvent>> {
        self.node(peer)?.get_events(chain, list_key, start, end).await
    }

    async fn get_filtered_proofs(
        &self,
        peer: &str,
        chain: Chain,
        kind: ProofKind,
        list_key: Option<&ListKey>,
        serialized_filter: &str,
    ) -> Result<Vec<MempoolProof>> {
        self.node(peer)?
            .get_filtered_proofs(chain, kind, list_key, serialized_filter)
            .await
    }

    async fn submit_proof(&self, peer: &str, chain: Chain, proof: &MempoolProof) -> Result<()> {
        self.node(peer)?.submit_proof(chain, proof.clone()).await?;
        Ok(())
    }

    async fn validate_txid_merkleroot(
        &self,
        peer: &str,
        chain: Chain,
        txid_index: u64,
        merkleroot: &str,
    ) -> Result<bool> {
        self.node(peer)?
            .validate_txid_merkleroot(chain, txid_index, merkleroot)
            .await
    }

    async fn push_validated_txid(
        &self,
        peer: &str,
        chain: Chain,
        checkpoint: &ValidatedTxidCheckpoint,
    ) -> Result<()> {
        self.node(peer)?
            .receive_validated_txid(chain, checkpoint)
            .await?;
        Ok(())
    }
}
