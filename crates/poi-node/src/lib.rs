//! POI Node - service wiring, inbound handlers and background loops
//!
//! [`PoiNode`] assembles the accumulators, event queues, mempools and the
//! peer syncer for every configured chain. Once started it runs:
//! - one event queue drain loop per chain (list owners only)
//! - one shield promotion loop per chain (list owners only)
//! - the mempool pruner
//! - the round-robin peer syncer
//!
//! [`LocalNetwork`] connects nodes hosted in the same process.

#![forbid(unsafe_code)]

pub mod builder;
pub mod config;
pub mod network;
pub mod node;
mod services;

pub use builder::PoiNodeBuilder;
pub use config::{load_config, parse_config};
pub use network::LocalNetwork;
pub use node::PoiNode;
