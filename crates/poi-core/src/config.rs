//! Node configuration.
//!
//! Loaded from TOML by the node binary; durations are whole milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PoiError, Result};
use crate::signature::ListSigner;
use crate::types::{Chain, ListKey};

/// Maximum events returned by one paged event fetch.
pub const EVENT_PAGE_SIZE: u64 = 100;

/// Maximum proofs returned by one filtered mempool fetch.
pub const MEMPOOL_PAGE_SIZE: usize = 100;

/// Top-level node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Human-readable node name used in logs
    pub node_name: String,

    /// Hex Ed25519 seed of the list this node operates, if any
    pub list_signing_key: Option<String>,

    /// Lists tracked by this node (the owned list is added implicitly)
    pub list_keys: Vec<ListKey>,

    /// Chains served by this node
    pub chains: Vec<Chain>,

    /// Peer node URLs polled round-robin
    pub peers: Vec<String>,

    /// Delay between successful peer polls
    pub sync_interval_ms: u64,

    /// Delay after a failed peer poll
    pub sync_error_backoff_ms: u64,

    /// Delay before re-driving a queue blocked by an ordering conflict
    pub queue_retry_delay_ms: u64,

    /// Minimum age of a queued shield before it is screened
    pub shield_pending_period_ms: u64,

    /// Interval of the shield promotion loop
    pub promotion_interval_ms: u64,

    /// Interval of the mempool pruner
    pub pruner_interval_ms: u64,

    /// Events requested per page during sync
    pub event_page_size: u64,

    /// Proofs returned per filtered mempool request
    pub mempool_page_size: usize,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Accept snark proofs without local verification (proofs are checked upstream)
    pub trust_upstream_proof_verification: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "poi-node".to_string(),
            list_signing_key: None,
            list_keys: Vec::new(),
            chains: Vec::new(),
            peers: Vec::new(),
            sync_interval_ms: 1_000,
            sync_error_backoff_ms: 5_000,
            queue_retry_delay_ms: 500,
            shield_pending_period_ms: 60 * 60 * 1_000,
            promotion_interval_ms: 30_000,
            pruner_interval_ms: 60_000,
            event_page_size: EVENT_PAGE_SIZE,
            mempool_page_size: MEMPOOL_PAGE_SIZE,
            log_level: "info".to_string(),
            trust_upstream_proof_verification: false,
        }
    }
}

impl NodeConfig {
    /// Create config for testing (short intervals, no pending period)
    pub fn for_testing() -> Self {
        Self {
            node_name: "test-node".to_string(),
            sync_interval_ms: 10,
            sync_error_backoff_ms: 20,
            queue_retry_delay_ms: 5,
            shield_pending_period_ms: 0,
            promotion_interval_ms: 20,
            pruner_interval_ms: 20,
            trust_upstream_proof_verification: true,
            ..Self::default()
        }
    }

    /// Signer of the owned list, if configured.
    pub fn list_signer(&self) -> Result<Option<ListSigner>> {
        self.list_signing_key
            .as_deref()
            .map(ListSigner::from_hex)
            .transpose()
    }

    /// Every tracked list, owned list first.
    pub fn all_list_keys(&self) -> Result<Vec<ListKey>> {
        let mut keys = Vec::with_capacity(self.list_keys.len() + 1);
        if let Some(signer) = self.list_signer()? {
            keys.push(signer.list_key());
        }
        for key in &self.list_keys {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        Ok(keys)
    }

    /// Reject configurations the node cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(PoiError::config("at least one chain must be configured"));
        }
        if self.all_list_keys()?.is_empty() {
            return Err(PoiError::config(
                "configure list_keys or a list_signing_key",
            ));
        }
        if self.event_page_size == 0 || self.mempool_page_size == 0 {
            return Err(PoiError::config("page sizes must be positive"));
        }
        Ok(())
    }

    /// Delay between successful peer polls
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Delay after a failed peer poll
    pub fn sync_error_backoff(&self) -> Duration {
        Duration::from_millis(self.sync_error_backoff_ms)
    }

    /// Delay before re-driving a blocked queue
    pub fn queue_retry_delay(&self) -> Duration {
        Duration::from_millis(self.queue_retry_delay_ms)
    }

    /// Minimum shield age before screening
    pub fn shield_pending_period(&self) -> Duration {
        Duration::from_millis(self.shield_pending_period_ms)
    }

    /// Shield promotion loop interval
    pub fn promotion_interval(&self) -> Duration {
        Duration::from_millis(self.promotion_interval_ms)
    }

    /// Mempool pruner interval
    pub fn pruner_interval(&self) -> Duration {
        Duration::from_millis(self.pruner_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NetworkName, TxidVersion};

    #[test]
    fn test_owned_list_comes_first() {
        let signer = ListSigner::from_seed([1u8; 32]);
        let config = NodeConfig {
            list_signing_key: Some(hex::encode([1u8; 32])),
            list_keys: vec![ListKey::new("ab"), signer.list_key()],
            chains: vec![Chain::new(NetworkName::Ethereum, TxidVersion::V2PoseidonMerkle)],
            ..NodeConfig::default()
        };
        let keys = config.all_list_keys().unwrap();
        assert_eq!(keys, vec![signer.list_key(), ListKey::new("ab")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_chains_and_lists() {
        assert!(NodeConfig::default().validate().is_err());
        let config = NodeConfig {
            list_keys: vec![ListKey::new("ab")],
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parses_toml() {
        let config: NodeConfig = toml::from_str(
            r#"
            node_name = "alpha"
            list_keys = ["ab"]
            peers = ["http://peer:3010"]
            sync_interval_ms = 250

            [[chains]]
            network = "Ethereum"
            txidVersion = "V2PoseidonMerkle"
            "#,
        )
        .unwrap();
        assert_eq!(config.node_name, "alpha");
        assert_eq!(config.sync_interval(), Duration::from_millis(250));
        assert_eq!(config.event_page_size, EVENT_PAGE_SIZE);
        assert_eq!(config.chains.len(), 1);
    }
}
