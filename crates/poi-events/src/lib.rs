//! POI Events - ordered event log and the single-writer event queue
//!
//! [`EventLog`] is the persistence and replay path for signed events, shared
//! by locally produced events and events pulled from peers. [`PoiEventQueue`]
//! serializes production of new events for the list this node operates.

#![forbid(unsafe_code)]

pub mod log;
pub mod queue;

pub use log::EventLog;
pub use queue::{DrainReport, PoiEventQueue};
