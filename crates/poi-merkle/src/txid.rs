//! Chain-derived txid ledger
//!
//! The external chain scanner appends railgun txids in on-chain order. The
//! ledger exposes historical roots by txid index so peers can compare roots
//! without recomputation, and tracks the peer-validated checkpoint. A
//! disagreement with a peer rolls the ledger back to that checkpoint and
//! flags it for rescan.

use std::sync::Arc;

use poi_core::hash::normalize_hex;
use poi_core::{Chain, PoiError, RailgunTxidStatus, Result};
use poi_store::{DocumentStore, TxidStatusDb, TxidValidatedStatus};

use crate::accumulator::{Accumulator, TREE_DEPTH};

/// Txid ledger of one chain.
#[derive(Debug)]
pub struct TxidMerkletree {
    chain: Chain,
    accumulator: Accumulator,
    status: TxidStatusDb,
}

impl TxidMerkletree {
    /// Open the ledger at production depth.
    pub async fn open(store: Arc<dyn DocumentStore>, chain: Chain) -> Result<Self> {
        Self::open_with_depth(store, chain, TREE_DEPTH).await
    }

    /// Open the ledger with a custom tree depth.
    pub async fn open_with_depth(store: Arc<dyn DocumentStore>, chain: Chain, depth: usize) -> Result<Self> {
        Ok(Self {
            chain,
            accumulator: Accumulator::open(store.clone(), chain, "txid", depth).await?,
            status: TxidStatusDb::new(store, chain),
        })
    }

    /// Chain scope.
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Append txids in order. Returns the new current txid index.
    pub async fn append_txids(&self, txids: &[String]) -> Result<Option<u64>> {
        let mut next = self.accumulator.leaf_count();
        for txid in txids {
            self.accumulator.insert_leaf(next, txid, None).await?;
            next += 1;
        }
        if !txids.is_empty() {
            let mut status = self.status.get().await?;
            if status.needs_rescan {
                status.needs_rescan = false;
                self.status.set(&status).await?;
            }
            tracing::debug!(chain = %self.chain, appended = txids.len(), current = next - 1, "appended txids");
        }
        Ok(next.checked_sub(1))
    }

    /// Latest scanned index, if any.
    pub fn current_txid_index(&self) -> Option<u64> {
        self.accumulator.leaf_count().checked_sub(1)
    }

    /// Root recorded when the txid at `txid_index` was appended.
    pub async fn historical_root(&self, txid_index: u64) -> Result<Option<String>> {
        self.accumulator.root_at(txid_index).await
    }

    /// Whether `merkleroot` is this ledger's root at `txid_index`.
    pub async fn validate_merkleroot(&self, txid_index: u64, merkleroot: &str) -> Result<bool> {
        Ok(self
            .historical_root(txid_index)
            .await?
            .map_or(false, |root| root == normalize_hex(merkleroot)))
    }

    /// Ledger state with the validated frontier.
    pub async fn status(&self) -> Result<RailgunTxidStatus> {
        let validated = self.status.get().await?;
        let current_txid_index = self.current_txid_index();
        let current_merkleroot = match current_txid_index {
            Some(index) => self.historical_root(index).await?,
            None => None,
        };
        Ok(RailgunTxidStatus {
            current_txid_index,
            current_merkleroot,
            validated_txid_index: validated.validated_txid_index,
            validated_merkleroot: validated.validated_merkleroot,
        })
    }

    /// Whether a rollback left the ledger waiting for a rescan.
    pub async fn needs_rescan(&self) -> Result<bool> {
        Ok(self.status.get().await?.needs_rescan)
    }

    /// Advance the validated checkpoint.
    ///
    /// The root must match the local ledger. Returns `false` without writing
    /// when the checkpoint does not move the frontier forward.
    pub async fn set_validated(&self, txid_index: u64, merkleroot: &str) -> Result<bool> {
        if !self.validate_merkleroot(txid_index, merkleroot).await? {
            return Err(PoiError::consistency(format!(
                "{}: txid root {merkleroot} does not match local ledger at {txid_index}",
                self.chain
            )));
        }
        let mut status = self.status.get().await?;
        if status.validated_txid_index.is_some_and(|current| current >= txid_index) {
            return Ok(false);
        }
        status.validated_txid_index = Some(txid_index);
        status.validated_merkleroot = Some(normalize_hex(merkleroot));
        self.status.set(&status).await?;
        tracing::info!(chain = %self.chain, txid_index, "validated txid checkpoint advanced");
        Ok(true)
    }

    /// Drop every txid after the validated checkpoint and flag a rescan.
    pub async fn rollback_to_validated(&self) -> Result<()> {
        let mut status = self.status.get().await?;
        let keep = status.validated_txid_index.map_or(0, |index| index + 1);
        self.accumulator.truncate(keep).await?;
        status.needs_rescan = true;
        self.status.set(&status).await?;
        tracing::warn!(chain = %self.chain, keep, "rolled back txid ledger, rescan required");
        Ok(())
    }

    /// Remove every txid and the validated checkpoint.
    pub async fn clear(&self) -> Result<()> {
        self.accumulator.clear().await?;
        self.status.set(&TxidValidatedStatus::default()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_core::testing::test_chain;
    use poi_store::MemoryDocumentStore;

    async fn ledger() -> TxidMerkletree {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        TxidMerkletree::open_with_depth(store, test_chain(), 4).await.unwrap()
    }

    fn txids(range: std::ops::Range<u64>) -> Vec<String> {
        range.map(|i| format!("{:x}", 0x100 + i)).collect()
    }

    #[tokio::test]
    async fn test_status_tracks_current_index() {
        let ledger = ledger().await;
        assert_eq!(ledger.status().await.unwrap(), RailgunTxidStatus::default());

        assert_eq!(ledger.append_txids(&txids(0..5)).await.unwrap(), Some(4));
        let status = ledger.status().await.unwrap();
        assert_eq!(status.current_txid_index, Some(4));
        assert_eq!(status.current_merkleroot, ledger.historical_root(4).await.unwrap());
        assert_eq!(status.validated_txid_index, None);
    }

    #[tokio::test]
    async fn test_validate_and_advance() {
        let ledger = ledger().await;
        ledger.append_txids(&txids(0..5)).await.unwrap();
        let root_2 = ledger.historical_root(2).await.unwrap().unwrap();

        assert!(ledger.validate_merkleroot(2, &root_2).await.unwrap());
        assert!(!ledger.validate_merkleroot(3, &root_2).await.unwrap());
        assert!(!ledger.validate_merkleroot(9, &root_2).await.unwrap());

        assert!(ledger.set_validated(2, &root_2).await.unwrap());
        assert!(!ledger.set_validated(2, &root_2).await.unwrap());
        let err = ledger.set_validated(3, &root_2).await.unwrap_err();
        assert!(matches!(err, PoiError::Consistency { .. }));
        assert_eq!(ledger.status().await.unwrap().validated_txid_index, Some(2));
    }

    #[tokio::test]
    async fn test_rollback_keeps_validated_prefix() {
        let ledger = ledger().await;
        ledger.append_txids(&txids(0..6)).await.unwrap();
        let root_2 = ledger.historical_root(2).await.unwrap().unwrap();
        ledger.set_validated(2, &root_2).await.unwrap();

        ledger.rollback_to_validated().await.unwrap();
        assert!(ledger.needs_rescan().await.unwrap());
        let status = ledger.status().await.unwrap();
        assert_eq!(status.current_txid_index, Some(2));
        assert_eq!(status.current_merkleroot, Some(root_2));

        ledger.append_txids(&txids(3..6)).await.unwrap();
        assert!(!ledger.needs_rescan().await.unwrap());
        assert_eq!(ledger.current_txid_index(), Some(5));
    }

    #[tokio::test]
    async fn test_rollback_without_checkpoint_clears_ledger() {
        let ledger = ledger().await;
        ledger.append_txids(&txids(0..3)).await.unwrap();
        ledger.rollback_to_validated().await.unwrap();
        assert_eq!(ledger.current_txid_index(), None);
    }
}
