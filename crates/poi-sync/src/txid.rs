//! Txid checkpoint reconciliation rules
//!
//! Two nodes agree on a txid root at the lower of their current indices. If
//! the peer's reported current root already matches, the checkpoint is taken
//! directly; otherwise the peer is asked to validate the local root.

use poi_core::hash::normalize_hex;
use poi_core::RailgunTxidStatus;

/// Result of reconciling with one peer on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxidOutcome {
    /// Nothing to validate, or the frontier did not move
    Unchanged,
    /// Validated frontier advanced
    Validated {
        /// New validated index
        txid_index: u64,
    },
    /// Peer disagreed; ledger rolled back to the previous checkpoint
    RolledBack {
        /// Index the peer disagreed on
        txid_index: u64,
    },
}

/// Index both ledgers can be compared at, if it lies past the local checkpoint.
pub fn validation_target(local: &RailgunTxidStatus, peer: &RailgunTxidStatus) -> Option<u64> {
    let target = local.current_txid_index?.min(peer.current_txid_index?);
    match local.validated_txid_index {
        Some(validated) if validated >= target => None,
        _ => Some(target),
    }
}

/// Whether the peer's status alone vouches for `merkleroot` at `txid_index`.
pub fn peer_reports_root(peer: &RailgunTxidStatus, txid_index: u64, merkleroot: &str) -> bool {
    peer.current_txid_index == Some(txid_index)
        && peer
            .current_merkleroot
            .as_deref()
            .is_some_and(|root| normalize_hex(root) == normalize_hex(merkleroot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(current: Option<(u64, &str)>, validated: Option<u64>) -> RailgunTxidStatus {
        RailgunTxidStatus {
            current_txid_index: current.map(|(index, _)| index),
            current_merkleroot: current.map(|(_, root)| root.to_string()),
            validated_txid_index: validated,
            validated_merkleroot: validated.map(|_| "00".to_string()),
        }
    }

    #[test]
    fn test_target_is_lower_current_index() {
        let local = status(Some((10, "aa")), None);
        let peer = status(Some((7, "bb")), None);
        assert_eq!(validation_target(&local, &peer), Some(7));
        assert_eq!(validation_target(&peer, &local), Some(7));
    }

    #[test]
    fn test_no_target_when_already_validated_or_empty() {
        let peer = status(Some((7, "bb")), None);
        assert_eq!(validation_target(&status(Some((10, "aa")), Some(7)), &peer), None);
        assert_eq!(validation_target(&status(Some((10, "aa")), Some(6)), &peer), Some(7));
        assert_eq!(validation_target(&status(None, None), &peer), None);
        assert_eq!(validation_target(&peer, &status(None, None)), None);
    }

    #[test]
    fn test_peer_reports_root_only_at_its_current_index() {
        let peer = status(Some((7, "0xBB")), None);
        assert!(peer_reports_root(&peer, 7, "bb"));
        assert!(!peer_reports_root(&peer, 7, "cc"));
        assert!(!peer_reports_root(&peer, 6, "bb"));
    }
}
