//! Typed databases, one per persisted entity family.

pub mod events;
pub mod merkletree;
pub mod proofs;
pub mod shield_queue;
pub mod txid_status;

pub use events::PoiOrderedEventsDb;
pub use merkletree::{LeafPosition, MerklerootDb, MerkletreeDb, StoredMerkleNode, StoredMerkleroot};
pub use proofs::{ProofRecordsDb, StoredProof};
pub use shield_queue::{ShieldQueueDb, ShieldQueueEntry, ShieldQueueStatus};
pub use txid_status::{TxidStatusDb, TxidValidatedStatus};
