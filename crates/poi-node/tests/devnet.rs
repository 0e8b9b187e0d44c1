//! Several nodes on one in-process network.

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use poi_core::hash::normalize_hex;
use poi_core::testing::{test_chain, test_shield_proof, test_signer, MarkerVerifier};
use poi_core::{
    BlindedCommitmentData, BlindedCommitmentType, ListKey, MempoolProof, NodeConfig, PoiError,
    PoiStatus, ProofKind,
};
use poi_mempool::{DiscoveredShield, SubmitOutcome};
use poi_node::{LocalNetwork, PoiNode};
use poi_store::{DocumentStore, MemoryDocumentStore};
use poi_sync::TxidOutcome;

const DEPTH: usize = 8;

fn list_a() -> ListKey {
    test_signer(1).list_key()
}

fn list_b() -> ListKey {
    test_signer(2).list_key()
}

fn config(name: &str, seed: Option<u8>, peers: &[&str]) -> NodeConfig {
    NodeConfig {
        node_name: name.into(),
        list_signing_key: seed.map(|seed| format!("{seed:02x}").repeat(32)),
        list_keys: vec![list_a(), list_b()],
        chains: vec![test_chain()],
        peers: peers.iter().map(|peer| peer.to_string()).collect(),
        ..NodeConfig::for_testing()
    }
}

async fn join(network: &Arc<LocalNetwork>, config: NodeConfig) -> Arc<PoiNode> {
    join_on(network, config, Arc::new(MemoryDocumentStore::new())).await
}

async fn join_on(
    network: &Arc<LocalNetwork>,
    config: NodeConfig,
    store: Arc<dyn DocumentStore>,
) -> Arc<PoiNode> {
    let name = config.node_name.clone();
    let node = Arc::new(
        PoiNode::builder(config)
            .store(store)
            .transport(network.clone())
            .verifier(Arc::new(MarkerVerifier))
            .tree_depth(DEPTH)
            .build()
            .await
            .unwrap(),
    );
    network.register(name, &node);
    node
}

async fn status(node: &PoiNode, list_key: &ListKey, commitment: &str) -> PoiStatus {
    let statuses = node
        .get_poi_statuses(
            test_chain(),
            &[list_key.clone()],
            &[BlindedCommitmentData {
                blinded_commitment: commitment.into(),
                commitment_type: BlindedCommitmentType::Shield,
            }],
        )
        .await
        .unwrap();
    statuses[&normalize_hex(commitment)][list_key]
}

async fn events_length(node: &PoiNode, list_key: &ListKey) -> u64 {
    node.node_status()
        .await
        .unwrap()
        .chain(test_chain())
        .unwrap()
        .lists[list_key]
        .poi_events_length
}

fn shield(list_key: ListKey, commitment_hash: &str, blinded: &str) -> MempoolProof {
    MempoolProof::Shield {
        list_key,
        proof: test_shield_proof(commitment_hash, blinded),
    }
}

#[tokio::test]
async fn submitted_proof_is_broadcast_and_events_sync() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &["beta"])).await;
    let beta = join(&network, config("beta", Some(2), &["alpha"])).await;

    let outcome = alpha
        .submit_proof(test_chain(), shield(list_a(), "0a", "01"))
        .await
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Accepted);
    // Beta received the broadcast but does not sign for list A
    assert_eq!(status(&beta, &list_a(), "01").await, PoiStatus::ShieldPending);
    assert_eq!(
        alpha
            .submit_proof(test_chain(), shield(list_a(), "0a", "01"))
            .await
            .unwrap(),
        SubmitOutcome::AlreadyKnown
    );

    assert_eq!(alpha.drain_events(test_chain()).await.unwrap().persisted, 1);
    assert_eq!(status(&alpha, &list_a(), "01").await, PoiStatus::Valid);

    let report = beta.sync_with("alpha").await.unwrap();
    assert_eq!(report.events_applied, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(status(&beta, &list_a(), "01").await, PoiStatus::Valid);

    // Both accumulators hold the same leaves
    let proofs_alpha = alpha
        .get_merkle_proofs(test_chain(), &list_a(), &["01".into()])
        .await
        .unwrap();
    let proofs_beta = beta
        .get_merkle_proofs(test_chain(), &list_a(), &["01".into()])
        .await
        .unwrap();
    assert_eq!(proofs_alpha, proofs_beta);
    assert!(beta
        .validate_poi_merkleroots(test_chain(), &list_a(), &[proofs_alpha[0].root.clone()])
        .await
        .unwrap());
    assert!(!beta
        .validate_poi_merkleroots(test_chain(), &list_a(), &["ff".into()])
        .await
        .unwrap());

    // A second poll has nothing new
    let report = beta.sync_with("alpha").await.unwrap();
    assert_eq!(report.events_applied, 0);
    assert_eq!(report.proofs_accepted, 0);
}

#[tokio::test]
async fn mempool_delta_reaches_list_owner_through_sync() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &["beta"])).await;

    // Beta is offline when the proof arrives
    alpha
        .submit_proof(test_chain(), shield(list_b(), "0b", "02"))
        .await
        .unwrap();
    assert_eq!(status(&alpha, &list_b(), "02").await, PoiStatus::ShieldPending);

    let beta = join(&network, config("beta", Some(2), &["alpha"])).await;
    let report = beta.sync_with("alpha").await.unwrap();
    assert_eq!(report.proofs_accepted, 1);
    assert_eq!(beta.drain_events(test_chain()).await.unwrap().persisted, 1);

    let report = alpha.sync_with("beta").await.unwrap();
    assert_eq!(report.events_applied, 1);
    assert_eq!(status(&alpha, &list_b(), "02").await, PoiStatus::Valid);

    // Filters now match; neither side has anything the other lacks
    let filter = alpha
        .get_filtered_proofs(test_chain(), ProofKind::Shield, Some(&list_b()), "")
        .await
        .unwrap();
    assert_eq!(filter.len(), 1);
    let report = beta.sync_with("alpha").await.unwrap();
    assert_eq!(report.proofs_accepted, 0);
}

#[tokio::test]
async fn txid_agreement_is_validated_and_pushed() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &["beta", "gamma"])).await;
    let beta = join(&network, config("beta", Some(2), &["alpha"])).await;
    let gamma = join(&network, config("gamma", None, &["alpha"])).await;

    let txids: Vec<String> = vec!["01".into(), "02".into(), "03".into()];
    alpha.append_txids(test_chain(), &txids).await.unwrap();
    gamma.append_txids(test_chain(), &txids).await.unwrap();
    beta.append_txids(test_chain(), &txids[..2]).await.unwrap();

    let report = alpha.sync_with("beta").await.unwrap();
    assert_eq!(report.txid, vec![(test_chain(), TxidOutcome::Validated { txid_index: 1 })]);

    let txid_status = |status: poi_core::NodeStatus| {
        status.chain(test_chain()).unwrap().txid_status.clone()
    };
    let alpha_txid = txid_status(alpha.node_status().await.unwrap());
    assert_eq!(alpha_txid.validated_txid_index, Some(1));
    assert_eq!(alpha_txid.current_txid_index, Some(2));

    // Alpha signed the checkpoint and pushed it to gamma
    let gamma_txid = txid_status(gamma.node_status().await.unwrap());
    assert_eq!(gamma_txid.validated_txid_index, Some(1));
    assert_eq!(gamma_txid.validated_merkleroot, alpha_txid.validated_merkleroot);
    // Beta was the source and validates on its own poll
    assert_eq!(
        txid_status(beta.node_status().await.unwrap()).validated_txid_index,
        None
    );
}

#[tokio::test]
async fn txid_disagreement_rolls_back_to_checkpoint() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &["beta"])).await;
    let beta = join(&network, config("beta", Some(2), &["alpha"])).await;

    alpha
        .append_txids(test_chain(), &["01".into(), "02".into(), "03".into()])
        .await
        .unwrap();
    beta.append_txids(test_chain(), &["01".into(), "ff".into()])
        .await
        .unwrap();

    let report = alpha.sync_with("beta").await.unwrap();
    assert_eq!(report.txid, vec![(test_chain(), TxidOutcome::RolledBack { txid_index: 1 })]);
    let alpha_txid = alpha
        .node_status()
        .await
        .unwrap()
        .chain(test_chain())
        .unwrap()
        .txid_status
        .clone();
    assert_eq!(alpha_txid.current_txid_index, None);
    assert_eq!(alpha_txid.validated_txid_index, None);
}

#[tokio::test]
async fn pushed_checkpoint_requires_tracked_signed_matching_root() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &[])).await;
    alpha
        .append_txids(test_chain(), &["01".into(), "02".into()])
        .await
        .unwrap();
    let root = alpha
        .node_status()
        .await
        .unwrap()
        .chain(test_chain())
        .unwrap()
        .txid_status
        .current_merkleroot
        .clone()
        .unwrap();

    let untracked = test_signer(9).sign_txid_checkpoint(1, &root).unwrap();
    assert_matches!(
        alpha.receive_validated_txid(test_chain(), &untracked).await,
        Err(PoiError::UnknownList(_))
    );

    let mut forged = test_signer(2).sign_txid_checkpoint(1, &root).unwrap();
    forged.txid_index = 0;
    assert_matches!(
        alpha.receive_validated_txid(test_chain(), &forged).await,
        Err(PoiError::Validation { .. })
    );

    let wrong_root = test_signer(2).sign_txid_checkpoint(1, "ee").unwrap();
    assert!(!alpha
        .receive_validated_txid(test_chain(), &wrong_root)
        .await
        .unwrap());

    let valid = test_signer(2).sign_txid_checkpoint(1, &root).unwrap();
    assert!(alpha.receive_validated_txid(test_chain(), &valid).await.unwrap());
    assert!(!alpha.receive_validated_txid(test_chain(), &valid).await.unwrap());
}

#[tokio::test]
async fn restarted_owner_resumes_numbering_after_peer_log() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &[])).await;
    alpha
        .submit_proof(test_chain(), shield(list_a(), "0a", "01"))
        .await
        .unwrap();
    alpha.drain_events(test_chain()).await.unwrap();

    // Same list key, empty store
    let replica = join(&network, config("replica", Some(1), &["alpha"])).await;
    replica
        .queue_shields(
            test_chain(),
            &[DiscoveredShield {
                commitment_hash: "0c".into(),
                blinded_commitment: "03".into(),
            }],
        )
        .await
        .unwrap();
    replica.start().await.unwrap();
    assert!(replica.is_running());

    tokio::time::timeout(Duration::from_secs(10), async {
        while events_length(&replica, &list_a()).await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("replica never caught up");
    replica.stop();
    assert!(!replica.is_running());

    let events = replica
        .get_events(test_chain(), &list_a(), 0, 10)
        .await
        .unwrap();
    let original = alpha.get_events(test_chain(), &list_a(), 0, 1).await.unwrap();
    assert_eq!(events[0], original[0]);
    assert_eq!(events[1].event.blinded_commitments, vec![normalize_hex("03")]);
    assert_eq!(events[1].blinded_commitment_starting_index, 1);
    assert_eq!(status(&replica, &list_a(), "03").await, PoiStatus::Valid);
}

#[tokio::test]
async fn accepted_proof_is_attested_after_restart_before_drain() {
    let network = LocalNetwork::new();
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let alpha = join_on(&network, config("alpha", Some(1), &[]), store.clone()).await;
    assert_eq!(
        alpha
            .submit_proof(test_chain(), shield(list_a(), "0a", "01"))
            .await
            .unwrap(),
        SubmitOutcome::Accepted
    );
    network.unregister("alpha");
    drop(alpha);

    let alpha = join_on(&network, config("alpha", Some(1), &[]), store.clone()).await;
    assert_eq!(status(&alpha, &list_a(), "01").await, PoiStatus::ShieldPending);
    assert_eq!(alpha.drain_events(test_chain()).await.unwrap().persisted, 1);
    assert_eq!(status(&alpha, &list_a(), "01").await, PoiStatus::Valid);
    assert_eq!(events_length(&alpha, &list_a()).await, 1);
    network.unregister("alpha");
    drop(alpha);

    // Attested state survives and nothing is queued twice
    let alpha = join_on(&network, config("alpha", Some(1), &[]), store).await;
    assert_eq!(alpha.drain_events(test_chain()).await.unwrap().persisted, 0);
    assert_eq!(status(&alpha, &list_a(), "01").await, PoiStatus::Valid);
    assert_eq!(events_length(&alpha, &list_a()).await, 1);
    let root = alpha
        .get_merkle_proofs(test_chain(), &list_a(), &["01".into()])
        .await
        .unwrap()[0]
        .root
        .clone();
    assert!(alpha
        .validate_poi_merkleroots(test_chain(), &list_a(), &[root])
        .await
        .unwrap());
}

#[tokio::test]
async fn node_status_reports_every_list() {
    let network = LocalNetwork::new();
    let alpha = join(&network, config("alpha", Some(1), &[])).await;
    alpha
        .queue_shields(
            test_chain(),
            &[DiscoveredShield {
                commitment_hash: "0d".into(),
                blinded_commitment: "04".into(),
            }],
        )
        .await
        .unwrap();

    let status = alpha.node_status().await.unwrap();
    assert_eq!(status.list_keys, vec![list_a(), list_b()]);
    let chain = status.chain(test_chain()).unwrap();
    assert_eq!(chain.lists[&list_a()].shield_queue.pending, 1);
    assert_eq!(chain.lists[&list_b()].shield_queue.pending, 0);
    assert_eq!(chain.legacy_transact_proofs, 0);

    assert_eq!(alpha.promote_shields(test_chain()).await.unwrap().allowed, 1);
    assert_eq!(alpha.drain_events(test_chain()).await.unwrap().persisted, 1);
    assert_eq!(events_length(&alpha, &list_a()).await, 1);

    alpha.clear_all_events(test_chain(), &list_a()).await.unwrap();
    assert_eq!(events_length(&alpha, &list_a()).await, 0);
    assert_matches!(
        alpha.clear_all_events(test_chain(), &test_signer(9).list_key()).await,
        Err(PoiError::UnknownList(_))
    );
}

#[tokio::test]
async fn builder_refuses_unverified_proofs_and_missing_transport() {
    let strict = NodeConfig {
        trust_upstream_proof_verification: false,
        ..config("strict", Some(1), &[])
    };
    assert_matches!(
        PoiNode::builder(strict).build().await,
        Err(PoiError::Config { .. })
    );
    assert_matches!(
        PoiNode::builder(config("lonely", Some(1), &["beta"]))
            .verifier(Arc::new(MarkerVerifier))
            .build()
            .await,
        Err(PoiError::Config { .. })
    );
}
