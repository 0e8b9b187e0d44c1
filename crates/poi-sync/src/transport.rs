//! Peer and local seams of the sync protocol
//!
//! [`PeerTransport`] carries the six logical peer operations; the wire
//! format belongs to the implementation. [`LocalPoiEffects`] is everything
//! the syncer needs from the local node.

use async_trait::async_trait;
use poi_core::{
    Chain, ListKey, MempoolProof, NodeStatus, ProofKind, RailgunTxidStatus, Result,
    SignedPoiEvent, ValidatedTxidCheckpoint,
};

/// Request/response calls to a remote node, addressed by peer URL.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Per-chain txid ledger state and per-list event log lengths.
    async fn node_status(&self, peer: &str) -> Result<NodeStatus>;

    /// Events `[start, end)` of a list's log.
    async fn get_events(
        &self,
        peer: &str,
        chain: Chain,
        list_key: &ListKey,
        start: u64,
        end: u64,
    ) -> Result<Vec<SignedPoiEvent>>;

    /// Proofs of one mempool the given filter lacks. Legacy proofs take no list.
    async fn get_filtered_proofs(
        &self,
        peer: &str,
        chain: Chain,
        kind: ProofKind,
        list_key: Option<&ListKey>,
        serialized_filter: &str,
    ) -> Result<Vec<MempoolProof>>;

    /// Submit a proof to the peer's mempool.
    async fn submit_proof(&self, peer: &str, chain: Chain, proof: &MempoolProof) -> Result<()>;

    /// Ask the peer whether `merkleroot` is its txid root at `txid_index`.
    async fn validate_txid_merkleroot(
        &self,
        peer: &str,
        chain: Chain,
        txid_index: u64,
        merkleroot: &str,
    ) -> Result<bool>;

    /// Push a validated txid checkpoint.
    async fn push_validated_txid(
        &self,
        peer: &str,
        chain: Chain,
        checkpoint: &ValidatedTxidCheckpoint,
    ) -> Result<()>;
}

/// Local node state touched by the syncer.
#[async_trait]
pub trait LocalPoiEffects: Send + Sync {
    /// Configured chains.
    fn chains(&self) -> Vec<Chain>;

    /// Configured lists.
    fn list_keys(&self) -> Vec<ListKey>;

    /// List this node signs for, if any.
    fn owned_list(&self) -> Option<ListKey>;

    /// Length of a list's local event log.
    async fn poi_events_length(&self, chain: Chain, list_key: &ListKey) -> Result<u64>;

    /// Persist an already-indexed event and apply it to the accumulator.
    ///
    /// Returns `false` when the identical event was already stored.
    async fn apply_signed_event(
        &self,
        chain: Chain,
        list_key: &ListKey,
        event: &SignedPoiEvent,
    ) -> Result<bool>;

    /// Raise the owned list's minimum next event index.
    fn raise_min_next_index(&self, chain: Chain, index: u64);

    /// Serialized filter of what the local mempool holds.
    fn proof_filter(&self, chain: Chain, kind: ProofKind, list_key: Option<&ListKey>) -> Result<String>;

    /// Submit a proof to the local mempool. Returns `true` when newly accepted.
    async fn submit_proof(&self, chain: Chain, proof: MempoolProof) -> Result<bool>;

    /// Local txid ledger state.
    async fn txid_status(&self, chain: Chain) -> Result<RailgunTxidStatus>;

    /// Local txid root at an index.
    async fn txid_root_at(&self, chain: Chain, txid_index: u64) -> Result<Option<String>>;

    /// Advance the validated checkpoint. Returns `true` if it moved.
    async fn set_validated_txid(&self, chain: Chain, txid_index: u64, merkleroot: &str) -> Result<bool>;

    /// Roll the txid ledger back to the validated checkpoint and flag a rescan.
    async fn rollback_txid(&self, chain: Chain) -> Result<()>;

    /// Sign a checkpoint for peers; `None` when this node operates no list.
    fn sign_txid_checkpoint(&self, txid_index: u64, merkleroot: &str) -> Result<Option<ValidatedTxidCheckpoint>>;
}
