//! POI Mempool - pending proofs awaiting attestation
//!
//! Shield, transact and legacy-transact proofs are verified on submission,
//! persisted, cached in insertion order and advertised through bloom
//! filters so peers only exchange what the other side lacks. When this node
//! operates the target list, accepted proofs are queued as POI events.
//!
//! The [`ShieldQueue`] screens shields discovered on chain and the
//! [`MempoolPruner`] drops proofs once their events are attested.

#![forbid(unsafe_code)]

pub mod blocked;
pub mod cache;
pub mod context;
pub mod legacy;
pub mod pools;
pub mod pruner;
pub mod shield;
pub mod shield_queue;
pub mod transact;

pub use blocked::BlockedShieldsMempool;
pub use cache::{FilterKind, ProofCache};
pub use context::{MempoolContext, SubmitOutcome};
pub use legacy::{legacy_blinded_commitment, LegacyTransactMempool};
pub use pools::ChainMempools;
pub use pruner::{MempoolPruner, PruneReport};
pub use shield::ShieldProofMempool;
pub use shield_queue::{DiscoveredShield, PromotionReport, ShieldQueue};
pub use transact::{event_commitments, TransactProofMempool};
