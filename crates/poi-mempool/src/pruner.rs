//! Removes pending proofs once their events are attested

use std::sync::Arc;
use std::time::Duration;

use poi_core::Result;

use crate::pools::ChainMempools;

/// Proofs dropped by one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Transact proofs removed across lists
    pub transact: usize,
    /// Legacy proofs removed
    pub legacy: usize,
}

/// Periodic pruner over the mempools of every chain.
#[derive(Debug, Clone)]
pub struct MempoolPruner {
    pools: Vec<Arc<ChainMempools>>,
}

impl MempoolPruner {
    /// Prune the given chains.
    pub fn new(pools: Vec<Arc<ChainMempools>>) -> Self {
        Self { pools }
    }

    /// Run one pass.
    pub async fn prune(&self) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        for pools in &self.pools {
            for list_key in pools.context().registry.list_keys() {
                report.transact += pools.transact.remove_attested(list_key).await?;
            }
            report.legacy += pools.legacy.remove_attested().await?;
        }
        Ok(report)
    }

    /// Prune on a fixed interval until the task is aborted.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.prune().await {
                Ok(report) if report.transact > 0 || report.legacy > 0 => {
                    tracing::info!(
                        transact = report.transact,
                        legacy = report.legacy,
                        "pruned attested proofs"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "mempool prune failed"),
            }
        }
    }
}
