//! Error types for topology queries

use crate::range::Range;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by a topology build
#[derive(Error, Debug)]
pub enum TopologyError {
    /// A required identity is missing or a parameter is malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Range with `from` after `to`
    #[error("Invalid range: from {from} is after to {to}")]
    InvalidRange { from: i64, to: i64 },

    /// Bucket index outside the window. Indicates a defect in the caller.
    #[error("Timestamp {timestamp} maps to bucket {index}, outside the window")]
    OutOfRange { timestamp: i64, index: i64 },

    /// A store collaborator failed
    #[error("{operation} failed for {application} over {range}: {source}")]
    ExternalFetch {
        operation: &'static str,
        application: String,
        range: Range,
        #[source]
        source: StoreError,
    },

    /// The query deadline elapsed; partial results were discarded
    #[error("Topology query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl TopologyError {
    /// Whether the caller may reasonably retry the same query
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TopologyError::Timeout { .. } | TopologyError::ExternalFetch { .. }
        )
    }
}

pub type TopologyResult<T> = Result<T, TopologyError>;
