//! POI Core - Foundation types for the Proof of Innocence node
//!
//! Every other crate in the workspace builds on the types defined here:
//! - [`types`]: lists, chains, POI events, mempool proofs, statuses
//! - [`errors`]: the unified [`PoiError`] and its recovery classes
//! - [`hash`]: Poseidon hashing and the merkle zero ladder
//! - [`bloom`]: standard and counting bloom filter codec
//! - [`signature`]: Ed25519 list signatures over canonical encodings
//! - [`verifier`]: snark verification and shield screening seams
//! - [`config`]: node configuration
//! - [`time`]: wall-clock seam

#![forbid(unsafe_code)]

pub mod bloom;
pub mod config;
pub mod errors;
pub mod hash;
pub mod signature;
pub mod time;
pub mod types;
pub mod verifier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bloom::{BloomFilter, CountingBloomFilter, PeerFilter};
pub use config::NodeConfig;
pub use errors::{PoiError, Result};
pub use signature::ListSigner;
pub use time::{Clock, SystemClock};
pub use types::*;
pub use verifier::{Circuit, ProofVerifier, ShieldDecision, ShieldScreener};
