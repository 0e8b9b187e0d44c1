//! Validated txid checkpoint per chain

use std::sync::Arc;

use poi_core::Chain;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::store::{DocumentStore, StoreResult};

const STATUS_KEY: &str = "status";

/// Peer-validated frontier of the txid ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxidValidatedStatus {
    /// Highest validated txid index
    pub validated_txid_index: Option<u64>,
    /// Root at that index
    pub validated_merkleroot: Option<String>,
    /// Ledger was rolled back and must be rescanned from the chain
    pub needs_rescan: bool,
}

/// Txid checkpoint document of one chain.
#[derive(Debug, Clone)]
pub struct TxidStatusDb {
    status: Collection<TxidValidatedStatus>,
}

impl TxidStatusDb {
    /// Open the txid status for `chain`.
    pub fn new(store: Arc<dyn DocumentStore>, chain: Chain) -> Self {
        Self {
            status: Collection::new(store, chain, "txid-status"),
        }
    }

    /// Current checkpoint, default when none was ever written.
    pub async fn get(&self) -> StoreResult<TxidValidatedStatus> {
        Ok(self.status.get(STATUS_KEY).await?.unwrap_or_default())
    }

    /// Replace the checkpoint.
    pub async fn set(&self, status: &TxidValidatedStatus) -> StoreResult<()> {
        self.status.upsert(STATUS_KEY, status).await
    }
}
