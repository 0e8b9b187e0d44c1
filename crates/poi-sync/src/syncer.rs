//! Round-robin peer synchronization
//!
//! Each cycle polls one peer: its status first, then missing events for every
//! shared list, then bloom-filtered mempool deltas, then the txid checkpoint
//! handshake. Failures back off and move on to the next peer; nothing here
//! ever stops the loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use poi_core::signature::verify_signed_event;
use poi_core::{
    Chain, ChainStatus, ListKey, MempoolProof, NodeConfig, NodeStatus, PoiError, ProofKind,
    RailgunTxidStatus, Result, ValidatedTxidCheckpoint,
};

use crate::transport::{LocalPoiEffects, PeerTransport};
use crate::txid::{peer_reports_root, validation_target, TxidOutcome};

/// Mempools pulled for every shared list.
const LIST_PROOF_KINDS: [ProofKind; 3] = [
    ProofKind::Shield,
    ProofKind::Transact,
    ProofKind::BlockedShield,
];

/// Syncer settings.
#[derive(Debug, Clone)]
pub struct SyncerConfig {
    /// Peer URLs, polled in order
    pub peers: Vec<String>,
    /// Delay after a clean poll
    pub sync_interval: Duration,
    /// Delay after a failed poll
    pub error_backoff: Duration,
    /// Events requested per page
    pub event_page_size: u64,
}

impl SyncerConfig {
    /// Derive from the node configuration.
    pub fn from_node_config(config: &NodeConfig) -> Self {
        Self {
            peers: config.peers.clone(),
            sync_interval: config.sync_interval(),
            error_backoff: config.sync_error_backoff(),
            event_page_size: config.event_page_size.max(1),
        }
    }
}

/// What one poll changed locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Peer events persisted
    pub events_applied: u64,
    /// Peer proofs newly accepted
    pub proofs_accepted: u64,
    /// Peer proofs rejected by local validation
    pub proofs_rejected: u64,
    /// Txid reconciliation per chain
    pub txid: Vec<(Chain, TxidOutcome)>,
    /// Lists or chains whose sync failed this cycle
    pub failures: u64,
}

/// Polls peers one at a time, forever.
pub struct RoundRobinSyncer {
    local: Arc<dyn LocalPoiEffects>,
    transport: Arc<dyn PeerTransport>,
    config: SyncerConfig,
    cursor: AtomicUsize,
}

impl std::fmt::Debug for RoundRobinSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinSyncer")
            .field("config", &self.config)
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RoundRobinSyncer {
    /// Create a syncer over the given peers.
    pub fn new(
        local: Arc<dyn LocalPoiEffects>,
        transport: Arc<dyn PeerTransport>,
        config: SyncerConfig,
    ) -> Self {
        Self {
            local,
            transport,
            config,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Configured peers.
    pub fn peers(&self) -> &[String] {
        &self.config.peers
    }

    /// Next peer in rotation.
    pub fn next_peer(&self) -> Option<String> {
        if self.config.peers.is_empty() {
            return None;
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.config.peers.len();
        self.config.peers.get(slot).cloned()
    }

    /// Raise the owned list's index watermark to the longest peer log.
    ///
    /// Run before the event queue starts so the node never re-issues indices
    /// a peer already holds. Unreachable peers are skipped.
    pub async fn raise_watermarks(&self) {
        let Some(owned) = self.local.owned_list() else {
            return;
        };
        for peer in &self.config.peers {
            let status = match self.transport.node_status(peer).await {
                Ok(status) => status,
                Err(err) => {
                    tracing::warn!(peer = %peer, error = %err, "peer unavailable for watermark check");
                    continue;
                }
            };
            for chain in self.local.chains() {
                if let Some(length) = status
                    .chain(chain)
                    .and_then(|chain_status| chain_status.lists.get(&owned))
                    .map(|list| list.poi_events_length)
                {
                    self.local.raise_min_next_index(chain, length);
                }
            }
        }
    }

    /// One full poll of `peer`.
    pub async fn sync_peer(&self, peer: &str) -> Result<SyncReport> {
        let status = self.transport.node_status(peer).await?;
        let mut report = SyncReport::default();
        for chain in self.local.chains() {
            let Some(peer_chain) = status.chain(chain) else {
                continue;
            };
            self.sync_chain(peer, chain, &status, peer_chain, &mut report).await;
        }
        Ok(report)
    }

    async fn sync_chain(
        &self,
        peer: &str,
        chain: Chain,
        status: &NodeStatus,
        peer_chain: &ChainStatus,
        report: &mut SyncReport,
    ) {
        for list_key in self.local.list_keys() {
            if !status.list_keys.contains(&list_key) {
                continue;
            }
            if let Some(list_status) = peer_chain.lists.get(&list_key) {
                match self
                    .sync_events(peer, chain, &list_key, list_status.poi_events_length)
                    .await
                {
                    Ok(applied) => report.events_applied += applied,
                    Err(err) => {
                        tracing::warn!(peer = %peer, chain = %chain, list_key = %list_key, error = %err, "event sync failed");
                        report.failures += 1;
                    }
                }
            }
            for kind in LIST_PROOF_KINDS {
                if let Err(err) = self.sync_proofs(peer, chain, kind, Some(&list_key), report).await {
                    tracing::warn!(peer = %peer, chain = %chain, list_key = %list_key, kind = ?kind, error = %err, "proof sync failed");
                    report.failures += 1;
                }
            }
        }
        if let Err(err) = self
            .sync_proofs(peer, chain, ProofKind::LegacyTransact, None, report)
            .await
        {
            tracing::warn!(peer = %peer, chain = %chain, error = %err, "legacy proof sync failed");
            report.failures += 1;
        }
        match self.reconcile_txid(peer, chain, &peer_chain.txid_status).await {
            Ok(outcome) => report.txid.push((chain, outcome)),
            Err(err) => {
                tracing::warn!(peer = %peer, chain = %chain, error = %err, "txid reconciliation failed");
                report.failures += 1;
            }
        }
    }

    /// Page the peer's events past the local log length and apply them in order.
    async fn sync_events(
        &self,
        peer: &str,
        chain: Chain,
        list_key: &ListKey,
        peer_length: u64,
    ) -> Result<u64> {
        if self.local.owned_list().as_ref() == Some(list_key) {
            self.local.raise_min_next_index(chain, peer_length);
        }
        let mut next = self.local.poi_events_length(chain, list_key).await?;
        let mut applied = 0;
        while next < peer_length {
            let end = peer_length.min(next + self.config.event_page_size);
            let events = self
                .transport
                .get_events(peer, chain, list_key, next, end)
                .await?;
            if events.is_empty() {
                break;
            }
            for event in &events {
                if event.index != next {
                    return Err(PoiError::ordering(format!(
                        "peer {peer} sent event {} while {next} was expected",
                        event.index
                    )));
                }
                verify_signed_event(list_key, event)?;
                if self.local.apply_signed_event(chain, list_key, event).await? {
                    applied += 1;
                }
                next += 1;
            }
        }
        if applied > 0 {
            tracing::info!(peer = %peer, chain = %chain, list_key = %list_key, applied, length = next, "synced events");
        }
        Ok(applied)
    }

    /// Pull one mempool delta and submit it locally.
    async fn sync_proofs(
        &self,
        peer: &str,
        chain: Chain,
        kind: ProofKind,
        list_key: Option<&ListKey>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let filter = self.local.proof_filter(chain, kind, list_key)?;
        let proofs = self
            .transport
            .get_filtered_proofs(peer, chain, kind, list_key, &filter)
            .await?;
        for proof in proofs {
            match self.local.submit_proof(chain, proof).await {
                Ok(true) => report.proofs_accepted += 1,
                Ok(false) => {}
                Err(err @ (PoiError::Validation { .. } | PoiError::UnknownList(_))) => {
                    tracing::debug!(peer = %peer, chain = %chain, kind = ?kind, error = %err, "rejected peer proof");
                    report.proofs_rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Try to advance the local validated txid checkpoint with `peer`.
    pub async fn reconcile_txid(
        &self,
        peer: &str,
        chain: Chain,
        peer_status: &RailgunTxidStatus,
    ) -> Result<TxidOutcome> {
        let local_status = self.local.txid_status(chain).await?;
        let Some(txid_index) = validation_target(&local_status, peer_status) else {
            return Ok(TxidOutcome::Unchanged);
        };
        let Some(merkleroot) = self.local.txid_root_at(chain, txid_index).await? else {
            return Ok(TxidOutcome::Unchanged);
        };

        let agreed = peer_reports_root(peer_status, txid_index, &merkleroot)
            || self
                .transport
                .validate_txid_merkleroot(peer, chain, txid_index, &merkleroot)
                .await?;
        if !agreed {
            tracing::warn!(peer = %peer, chain = %chain, txid_index, "peer disagrees on txid root, rolling back");
            self.local.rollback_txid(chain).await?;
            return Ok(TxidOutcome::RolledBack { txid_index });
        }

        if !self
            .local
            .set_validated_txid(chain, txid_index, &merkleroot)
            .await?
        {
            return Ok(TxidOutcome::Unchanged);
        }
        if let Some(checkpoint) = self.local.sign_txid_checkpoint(txid_index, &merkleroot)? {
            self.push_checkpoint(peer, chain, &checkpoint).await;
        }
        Ok(TxidOutcome::Validated { txid_index })
    }

    async fn push_checkpoint(&self, source: &str, chain: Chain, checkpoint: &ValidatedTxidCheckpoint) {
        let pushes = self
            .config
            .peers
            .iter()
            .filter(|peer| peer.as_str() != source)
            .map(|peer| async move {
                (peer, self.transport.push_validated_txid(peer, chain, checkpoint).await)
            });
        for (peer, result) in join_all(pushes).await {
            if let Err(err) = result {
                tracing::warn!(peer = %peer, chain = %chain, error = %err, "validated txid push failed");
            }
        }
    }

    /// Forward a locally accepted proof to every peer.
    pub async fn broadcast_proof(&self, chain: Chain, proof: &MempoolProof) {
        let submissions = self
            .config
            .peers
            .iter()
            .map(|peer| async move { (peer, self.transport.submit_proof(peer, chain, proof).await) });
        for (peer, result) in join_all(submissions).await {
            if let Err(err) = result {
                tracing::debug!(peer = %peer, chain = %chain, error = %err, "proof broadcast failed");
            }
        }
    }

    /// Poll peers in rotation until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        if self.config.peers.is_empty() {
            tracing::info!("no peers configured, sync loop idle");
            return;
        }
        tracing::info!(peers = self.config.peers.len(), "sync loop started");
        while let Some(peer) = self.next_peer() {
            let delay = match self.sync_peer(&peer).await {
                Ok(report) if report.failures == 0 => {
                    tracing::debug!(
                        peer = %peer,
                        events = report.events_applied,
                        proofs = report.proofs_accepted,
                        "peer sync complete"
                    );
                    self.config.sync_interval
                }
                Ok(report) => {
                    tracing::warn!(peer = %peer, failures = report.failures, "peer sync partially failed");
                    self.config.error_backoff
                }
                Err(err) => {
                    tracing::warn!(peer = %peer, error = %err, "peer poll failed");
                    self.config.error_backoff
                }
            };
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use poi_core::testing::{test_chain, test_signer};
    use poi_core::{ListSigner, ListStatus, PoiEvent, PoiEventKind, SignedPoiEvent};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicBool, AtomicU64};

    struct FakeLocal {
        signer: ListSigner,
        events: Mutex<Vec<SignedPoiEvent>>,
        watermark: AtomicU64,
        txid: Mutex<RailgunTxidStatus>,
        roots: HashMap<u64, String>,
        rolled_back: AtomicBool,
    }

    impl FakeLocal {
        fn new(current_txid: Option<u64>) -> Self {
            let roots: HashMap<u64, String> = (0..=current_txid.unwrap_or(0))
                .map(|index| (index, format!("{index:02x}")))
                .collect();
            Self {
                signer: test_signer(1),
                events: Mutex::new(Vec::new()),
                watermark: AtomicU64::new(0),
                txid: Mutex::new(RailgunTxidStatus {
                    current_txid_index: current_txid,
                    current_merkleroot: current_txid.map(|index| format!("{index:02x}")),
                    ..RailgunTxidStatus::default()
                }),
                roots,
                rolled_back: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl LocalPoiEffects for FakeLocal {
        fn chains(&self) -> Vec<Chain> {
            vec![test_chain()]
        }

        fn list_keys(&self) -> Vec<ListKey> {
            vec![self.signer.list_key()]
        }

        fn owned_list(&self) -> Option<ListKey> {
            Some(self.signer.list_key())
        }

        async fn poi_events_length(&self, _chain: Chain, _list_key: &ListKey) -> Result<u64> {
            Ok(self.events.lock().len() as u64)
        }

        async fn apply_signed_event(
            &self,
            _chain: Chain,
            _list_key: &ListKey,
            event: &SignedPoiEvent,
        ) -> Result<bool> {
            self.events.lock().push(event.clone());
            Ok(true)
        }

        fn raise_min_next_index(&self, _chain: Chain, index: u64) {
            self.watermark.fetch_max(index, Ordering::SeqCst);
        }

        fn proof_filter(&self, _chain: Chain, _kind: ProofKind, _list_key: Option<&ListKey>) -> Result<String> {
            Ok(String::new())
        }

        async fn submit_proof(&self, _chain: Chain, _proof: MempoolProof) -> Result<bool> {
            Ok(true)
        }

        async fn txid_status(&self, _chain: Chain) -> Result<RailgunTxidStatus> {
            Ok(self.txid.lock().clone())
        }

        async fn txid_root_at(&self, _chain: Chain, txid_index: u64) -> Result<Option<String>> {
            Ok(self.roots.get(&txid_index).cloned())
        }

        async fn set_validated_txid(&self, _chain: Chain, txid_index: u64, merkleroot: &str) -> Result<bool> {
            let mut status = self.txid.lock();
            status.validated_txid_index = Some(txid_index);
            status.validated_merkleroot = Some(merkleroot.to_string());
            Ok(true)
        }

        async fn rollback_txid(&self, _chain: Chain) -> Result<()> {
            self.rolled_back.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn sign_txid_checkpoint(&self, txid_index: u64, merkleroot: &str) -> Result<Option<ValidatedTxidCheckpoint>> {
            self.signer.sign_txid_checkpoint(txid_index, merkleroot).map(Some)
        }
    }

    struct FakePeer {
        status: NodeStatus,
        events: Vec<SignedPoiEvent>,
        validates: bool,
    }

    #[derive(Default)]
    struct FakeNetwork {
        peers: HashMap<String, FakePeer>,
        pushed: Mutex<Vec<(String, u64)>>,
    }

    impl FakeNetwork {
        fn peer(&self, peer: &str) -> Result<&FakePeer> {
            self.peers
                .get(peer)
                .ok_or_else(|| PoiError::transport(format!("{peer} unreachable")))
        }
    }

    #[async_trait]
    impl PeerTransport for FakeNetwork {
        async fn node_status(&self, peer: &str) -> Result<NodeStatus> {
            Ok(self.peer(peer)?.status.clone())
        }

        async fn get_events(
            &self,
            peer: &str,
            _chain: Chain,
            _list_key: &ListKey,
            start: u64,
            end: u64,
        ) -> Result<Vec<SignedPoiEvent>> {
            Ok(self
                .peer(peer)?
                .events
                .iter()
                .filter(|event| event.index >= start && event.index < end)
                .cloned()
                .collect())
        }

        async fn get_filtered_proofs(
            &self,
            peer: &str,
            _chain: Chain,
            _kind: ProofKind,
            _list_key: Option<&ListKey>,
            _serialized_filter: &str,
        ) -> Result<Vec<MempoolProof>> {
            self.peer(peer)?;
            Ok(Vec::new())
        }

        async fn submit_proof(&self, peer: &str, _chain: Chain, _proof: &MempoolProof) -> Result<()> {
            self.peer(peer).map(|_| ())
        }

        async fn validate_txid_merkleroot(
            &self,
            peer: &str,
            _chain: Chain,
            _txid_index: u64,
            _merkleroot: &str,
        ) -> Result<bool> {
            Ok(self.peer(peer)?.validates)
        }

        async fn push_validated_txid(
            &self,
            peer: &str,
            _chain: Chain,
            checkpoint: &ValidatedTxidCheckpoint,
        ) -> Result<()> {
            poi_core::signature::verify_txid_checkpoint(checkpoint)?;
            self.pushed.lock().push((peer.to_string(), checkpoint.txid_index));
            Ok(())
        }
    }

    fn signed_events(signer: &ListSigner, count: u64) -> Vec<SignedPoiEvent> {
        (0..count)
            .map(|index| {
                let event = PoiEvent::new(
                    PoiEventKind::Transact {
                        railgun_txid_if_has_unshield: None,
                    },
                    vec![format!("{:02x}", index + 1)],
                    None,
                );
                let signature = signer
                    .sign_event(index, index, &event.blinded_commitments, &event.proof)
                    .unwrap();
                SignedPoiEvent {
                    index,
                    blinded_commitment_starting_index: index,
                    event,
                    signature,
                }
            })
            .collect()
    }

    fn peer_status(list_key: &ListKey, events: u64, txid: RailgunTxidStatus) -> NodeStatus {
        let mut lists = BTreeMap::new();
        lists.insert(
            list_key.clone(),
            ListStatus {
                poi_events_length: events,
                ..ListStatus::default()
            },
        );
        NodeStatus {
            list_keys: vec![list_key.clone()],
            chains: vec![ChainStatus {
                chain: test_chain(),
                txid_status: txid,
                lists,
                legacy_transact_proofs: 0,
            }],
        }
    }

    fn syncer(local: Arc<FakeLocal>, network: Arc<FakeNetwork>, peers: &[&str]) -> RoundRobinSyncer {
        RoundRobinSyncer::new(
            local,
            network,
            SyncerConfig {
                peers: peers.iter().map(|peer| peer.to_string()).collect(),
                sync_interval: Duration::from_millis(1),
                error_backoff: Duration::from_millis(1),
                event_page_size: 2,
            },
        )
    }

    #[test]
    fn test_peers_rotate() {
        let local = Arc::new(FakeLocal::new(None));
        let syncer = syncer(local, Arc::new(FakeNetwork::default()), &["a", "b"]);
        let order: Vec<_> = (0..4).filter_map(|_| syncer.next_peer()).collect();
        assert_eq!(order, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_pages_events_and_raises_watermark() {
        let local = Arc::new(FakeLocal::new(None));
        let list_key = local.signer.list_key();
        let mut network = FakeNetwork::default();
        network.peers.insert(
            "a".into(),
            FakePeer {
                status: peer_status(&list_key, 5, RailgunTxidStatus::default()),
                events: signed_events(&local.signer, 5),
                validates: true,
            },
        );
        let syncer = syncer(local.clone(), Arc::new(network), &["a"]);

        let report = syncer.sync_peer("a").await.unwrap();
        assert_eq!(report.events_applied, 5);
        assert_eq!(report.failures, 0);
        assert_eq!(local.watermark.load(Ordering::SeqCst), 5);
        let indices: Vec<_> = local.events.lock().iter().map(|event| event.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_forged_event_stops_list_sync() {
        let local = Arc::new(FakeLocal::new(None));
        let list_key = local.signer.list_key();
        let mut events = signed_events(&local.signer, 3);
        events[1].signature = test_signer(2)
            .sign_event(1, 1, &events[1].event.blinded_commitments, &None)
            .unwrap();
        let mut network = FakeNetwork::default();
        network.peers.insert(
            "a".into(),
            FakePeer {
                status: peer_status(&list_key, 3, RailgunTxidStatus::default()),
                events,
                validates: true,
            },
        );
        let syncer = syncer(local.clone(), Arc::new(network), &["a"]);

        // The valid prefix stays applied; the list is reported as failed
        let report = syncer.sync_peer("a").await.unwrap();
        assert_eq!(report.events_applied, 0);
        assert_eq!(report.failures, 1);
        assert_eq!(local.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_txid_agreement_validates_and_pushes_to_other_peers() {
        let local = Arc::new(FakeLocal::new(Some(5)));
        let list_key = local.signer.list_key();
        let peer_txid = RailgunTxidStatus {
            current_txid_index: Some(3),
            current_merkleroot: Some("ff".into()),
            ..RailgunTxidStatus::default()
        };
        let mut network = FakeNetwork::default();
        for name in ["a", "b"] {
            network.peers.insert(
                name.into(),
                FakePeer {
                    status: peer_status(&list_key, 0, peer_txid.clone()),
                    events: Vec::new(),
                    validates: true,
                },
            );
        }
        let network = Arc::new(network);
        let syncer = syncer(local.clone(), network.clone(), &["a", "b"]);

        let outcome = syncer.reconcile_txid("a", test_chain(), &peer_txid).await.unwrap();
        assert_eq!(outcome, TxidOutcome::Validated { txid_index: 3 });
        assert_eq!(local.txid.lock().validated_txid_index, Some(3));
        assert_eq!(network.pushed.lock().clone(), vec![("b".to_string(), 3)]);

        // Already validated at the common index
        let outcome = syncer.reconcile_txid("a", test_chain(), &peer_txid).await.unwrap();
        assert_eq!(outcome, TxidOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_matching_peer_root_skips_validation_request() {
        let local = Arc::new(FakeLocal::new(Some(5)));
        let list_key = local.signer.list_key();
        let peer_txid = RailgunTxidStatus {
            current_txid_index: Some(4),
            current_merkleroot: Some("04".into()),
            ..RailgunTxidStatus::default()
        };
        let mut network = FakeNetwork::default();
        network.peers.insert(
            "a".into(),
            FakePeer {
                status: peer_status(&list_key, 0, peer_txid.clone()),
                events: Vec::new(),
                validates: false,
            },
        );
        let syncer = syncer(local.clone(), Arc::new(network), &["a"]);
        let outcome = syncer.reconcile_txid("a", test_chain(), &peer_txid).await.unwrap();
        assert_eq!(outcome, TxidOutcome::Validated { txid_index: 4 });
    }

    #[tokio::test]
    async fn test_txid_disagreement_rolls_back() {
        let local = Arc::new(FakeLocal::new(Some(5)));
        let list_key = local.signer.list_key();
        let peer_txid = RailgunTxidStatus {
            current_txid_index: Some(7),
            current_merkleroot: Some("aa".into()),
            ..RailgunTxidStatus::default()
        };
        let mut network = FakeNetwork::default();
        network.peers.insert(
            "a".into(),
            FakePeer {
                status: peer_status(&list_key, 0, peer_txid.clone()),
                events: Vec::new(),
                validates: false,
            },
        );
        let syncer = syncer(local.clone(), Arc::new(network), &["a"]);

        let report = syncer.sync_peer("a").await.unwrap();
        assert_eq!(report.txid, vec![(test_chain(), TxidOutcome::RolledBack { txid_index: 5 })]);
        assert!(local.rolled_back.load(Ordering::SeqCst));
        assert_eq!(local.txid.lock().validated_txid_index, None);
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails_poll() {
        let local = Arc::new(FakeLocal::new(None));
        let syncer = syncer(local, Arc::new(FakeNetwork::default()), &["gone"]);
        assert!(matches!(
            syncer.sync_peer("gone").await,
            Err(PoiError::Transport { .. })
        ));
    }
}
