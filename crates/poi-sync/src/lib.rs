//! POI Sync - cross-node synchronization
//!
//! A [`RoundRobinSyncer`] cycles through configured peers, pulling missing
//! signed events, bloom-filtered mempool deltas and reconciling the txid
//! ledger checkpoint. Remote nodes are reached through [`PeerTransport`];
//! the local node is reached through [`LocalPoiEffects`].

#![forbid(unsafe_code)]

pub mod syncer;
pub mod transport;
pub mod txid;

pub use syncer::{RoundRobinSyncer, SyncReport, SyncerConfig};
pub use transport::{LocalPoiEffects, PeerTransport};
pub use txid::{peer_reports_root, validation_target, TxidOutcome};
