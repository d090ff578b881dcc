//! Core type definitions
//!
//! - [`LedgerRecord`]: typed view of one product on the external ledger
//! - [`MappingEntry`]: off-chain metadata correlated with a ledger id
//! - [`ScoringRequest`] / [`ScoringResponse`]: the price-scoring exchange
//!
//! Ledger tuples are decoded into these structs once, by the ledger
//! client, so nothing above it indexes fields by position.

pub mod common;
pub mod mapping;
pub mod record;
pub mod scoring;

pub use common::*;
pub use mapping::*;
pub use record::*;
pub use scoring::*;
