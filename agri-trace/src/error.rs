//! Trace Error Types
//!
//! Error definitions shared by the ledger client, scoring gateway,
//! reconciliation engine, mapping index and submission workflows.

use thiserror::Error;

/// Trace engine error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    /// The external ledger could not be reached (connectivity or config)
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The ledger refused the data
    #[error("Ledger rejected request: {0}")]
    LedgerRejected(String),

    /// No record / entry exists under the requested key
    #[error("Not found: {0}")]
    NotFound(String),

    /// A full ledger scan finished without a matching record
    #[error("No matching product for {commodity}/{state}/{district}/{market}")]
    NoMatch {
        commodity: String,
        state: String,
        district: String,
        market: String,
    },

    /// A mapping entry already exists for this ledger id
    #[error("Mapping already exists for ledger id {0}")]
    DuplicateMapping(String),

    /// No scoring candidate process could be started
    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    /// A scoring process started but did not produce a usable answer
    #[error("Scoring failed: {0}")]
    ScoringFailed(String),

    /// Input rejected before any external system was contacted
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Mapping index storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Trace result type
pub type TraceResult<T> = Result<T, TraceError>;

impl TraceError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, TraceError::LedgerUnavailable(_) | TraceError::Storage(_))
    }

    /// Normal negative lookups, not failures in the exceptional sense
    pub fn is_negative_result(&self) -> bool {
        matches!(self, TraceError::NotFound(_) | TraceError::NoMatch { .. })
    }
}

impl From<reqwest::Error> for TraceError {
    fn from(e: reqwest::Error) -> Self {
        TraceError::LedgerUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(e: serde_json::Error) -> Self {
        TraceError::Serialization(e.to_string())
    }
}

impl From<sled::Error> for TraceError {
    fn from(e: sled::Error) -> Self {
        TraceError::Storage(e.to_string())
    }
}
