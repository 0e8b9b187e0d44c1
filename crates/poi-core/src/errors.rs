//! Unified error type for the POI node
//!
//! Every failure falls into one of four recovery classes:
//! - **Ordering** conflicts (accumulator busy, unexpected next index,
//!   duplicate or zero leaf, index watermark) are retried or skipped.
//! - **Validation** failures permanently reject a single submission.
//! - **Consistency** failures (txid root disagreement) trigger a rollback.
//! - **Transport** and **Storage** failures back off the current cycle.

use serde::{Deserialize, Serialize};

use crate::types::ListKey;

/// Unified error type for all POI operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PoiError {
    /// Another structural mutation is in flight on the same accumulator
    #[error("Accumulator busy: {list_key}")]
    AccumulatorBusy {
        /// List (or ledger) whose accumulator is locked
        list_key: String,
    },

    /// Ordering conflict (unexpected index, duplicate leaf, watermark)
    #[error("Ordering conflict: {message}")]
    Ordering {
        /// What was out of order
        message: String,
    },

    /// Submission rejected permanently
    #[error("Validation failed: {message}")]
    Validation {
        /// Reason for rejection
        message: String,
    },

    /// List key is not configured on this node
    #[error("Unknown list key: {0}")]
    UnknownList(ListKey),

    /// Peer disagreement on chain-derived state
    #[error("Consistency failure: {message}")]
    Consistency {
        /// Description of the disagreement
        message: String,
    },

    /// Peer request failed
    #[error("Transport error: {message}")]
    Transport {
        /// Transport failure detail
        message: String,
    },

    /// Persistent store failed
    #[error("Storage error: {message}")]
    Storage {
        /// Storage failure detail
        message: String,
    },

    /// Encoding or decoding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Codec failure detail
        message: String,
    },

    /// Invalid configuration
    #[error("Config error: {message}")]
    Config {
        /// Config problem
        message: String,
    },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl PoiError {
    /// Create an accumulator busy error
    pub fn busy(list_key: impl Into<String>) -> Self {
        Self::AccumulatorBusy {
            list_key: list_key.into(),
        }
    }

    /// Create an ordering conflict error
    pub fn ordering(message: impl Into<String>) -> Self {
        Self::Ordering {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Ordering conflicts never corrupt state; the caller re-drives.
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::AccumulatorBusy { .. } | Self::Ordering { .. })
    }

    /// Whether a later attempt of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AccumulatorBusy { .. }
                | Self::Ordering { .. }
                | Self::Transport { .. }
                | Self::Storage { .. }
        )
    }
}

/// Standard Result type for POI operations
pub type Result<T> = std::result::Result<T, PoiError>;

impl From<serde_json::Error> for PoiError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
