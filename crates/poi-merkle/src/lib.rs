//! POI Merkle - accumulators for attested commitments and the txid ledger
//!
//! - [`accumulator`]: incremental shard-of-trees Merkle accumulator with
//!   inclusion proofs and root history
//! - [`registry`]: one accumulator per chain and list, plus status derivation
//! - [`txid`]: chain-derived txid ledger with a peer-validated checkpoint

#![forbid(unsafe_code)]

pub mod accumulator;
pub mod registry;
pub mod txid;

pub use accumulator::{global_leaf_index, verify_proof, Accumulator, LeafInsert, TREE_DEPTH};
pub use registry::{AccumulatorRegistry, PendingProofIndex};
pub use txid::TxidMerkletree;
