//! Agri Trace - Ledger Query & Reconciliation Engine
//!
//! Tracks commodities from producer to consumer against an append-only
//! product ledger. The ledger only knows how to append and read by id; this
//! crate supplies everything above that.
//!
//! # Architecture
//!
//! - **Ledger Client**: typed accessor over the external ledger
//!   (`append` / `get` / `count` / `update_price`)
//! - **Scoring Gateway**: brokers every new price to an external scoring
//!   process before it may reach the ledger
//! - **Reconciliation Engine**: full-scan filter lists and field matching
//! - **Mapping Index**: off-chain ledger id → metadata index, one entry per id
//! - **Submission Orchestrator**: the submit and price-update workflows
//!
//! ```text
//! submit ──► Scoring ──accept──► Ledger append ──► Mapping create
//!               └─reject/fail──► (nothing written)
//!
//! update ──► Reconcile match ──► Ledger update_price
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use agri_trace::{connect, ProductDraft, TraceConfig};
//!
//! async fn example() {
//!     let engine = connect(TraceConfig::from_env()).await.unwrap();
//!
//!     let draft = ProductDraft::new("Wheat", 1500.0, "Karnataka", "Bangalore", "Ramanagara");
//!     let report = engine.submit(&draft).await.unwrap();
//!     println!("{:?} -> {:?}", report.state(), report.ledger_id());
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod mapping;
pub mod metrics;
pub mod ops;
pub mod reconcile;
pub mod scoring;
pub mod types;

pub use config::{LedgerRpcConfig, MappingConfig, MatchPolicy, ScoringConfig, TraceConfig};
pub use error::{TraceError, TraceResult};
pub use ledger::{LedgerBackend, LedgerClient, MemoryLedger, RpcLedger};
pub use mapping::{
    MappingBackend, MappingIndex, MappingStats, MappingStore, MemoryMappingStore, SledMappingStore,
};
pub use metrics::{MetricsSnapshot, TraceMetrics};
pub use ops::{
    ConsistencyReport, PriceUpdate, PriceUpdateOutcome, PriceUpdateReport, PriceUpdateState,
    ProductDetail, ProductDraft, SubmissionOrchestrator, SubmissionOutcome, SubmissionReport,
    SubmissionState,
};
pub use reconcile::{FilterLevel, FilterOptions, FilterSelection, ReconcileEngine, ScanStats};
pub use scoring::{PriceScorer, ProcessScorer, StaticScorer};
pub use types::*;

use std::sync::Arc;
use tracing::info;

/// Orchestrator wired to the production backends
pub type TraceEngine = SubmissionOrchestrator<RpcLedger, MappingBackend, ProcessScorer>;

/// Build a [`TraceEngine`] from configuration.
///
/// Validates the configuration, opens the ledger client (probing the
/// ledger), prepares the scoring gateway and opens the mapping store.
pub async fn connect(config: TraceConfig) -> TraceResult<TraceEngine> {
    config.validate()?;

    let ledger = RpcLedger::new(config.ledger.clone())?;
    let client = LedgerClient::open(Arc::new(ledger), config.ledger.account.clone()).await?;
    let scorer = ProcessScorer::new(config.scoring.clone())?;
    let mapping = MappingIndex::new(Arc::new(MappingBackend::from_config(&config.mapping)?));

    info!(
        "Trace engine ready (ledger={}, match policy={:?})",
        config.ledger.url, config.match_policy
    );

    Ok(SubmissionOrchestrator::from_config(
        Arc::new(client),
        Arc::new(scorer),
        mapping,
        &config,
    ))
}
