//! Submission Orchestrator
//!
//! Composes the ledger client, scoring gateway, reconciliation engine and
//! mapping index into the user-facing workflows:
//!
//! ```text
//! submit:        Scoring → Append → Index
//! update_price:  Lookup  → Append
//! read paths:    product_detail / product_by_record / filter_options
//! maintenance:   audit
//! ```
//!
//! Each workflow lives in its own module; every collaborator is passed in
//! explicitly.

pub mod audit;
pub mod query;
pub mod submit;
pub mod update;

use std::sync::Arc;

use crate::config::{default_code_url_base, MatchPolicy, TraceConfig};
use crate::ledger::{LedgerBackend, LedgerClient};
use crate::mapping::{MappingIndex, MappingStore};
use crate::metrics::TraceMetrics;
use crate::reconcile::ReconcileEngine;
use crate::scoring::PriceScorer;

pub use audit::ConsistencyReport;
pub use query::ProductDetail;
pub use submit::{ProductDraft, SubmissionOutcome, SubmissionReport, SubmissionState};
pub use update::{PriceUpdate, PriceUpdateOutcome, PriceUpdateReport, PriceUpdateState};

/// Workflow executor
pub struct SubmissionOrchestrator<B: LedgerBackend, S: MappingStore, P: PriceScorer> {
    /// Ledger client
    ledger: Arc<LedgerClient<B>>,
    /// Price scorer
    scorer: Arc<P>,
    /// Scanner over the same ledger client
    engine: ReconcileEngine<B>,
    /// Off-chain index
    mapping: MappingIndex<S>,
    /// Base of scannable-code URLs
    code_url_base: String,
    metrics: Arc<TraceMetrics>,
}

impl<B: LedgerBackend, S: MappingStore, P: PriceScorer> SubmissionOrchestrator<B, S, P> {
    /// Create a new orchestrator with default policy and code URL base
    pub fn new(ledger: Arc<LedgerClient<B>>, scorer: Arc<P>, mapping: MappingIndex<S>) -> Self {
        let metrics = Arc::new(TraceMetrics::new());
        let engine = ReconcileEngine::new(ledger.clone(), MatchPolicy::default())
            .with_metrics(metrics.clone());
        Self {
            ledger,
            scorer,
            engine,
            mapping,
            code_url_base: default_code_url_base(),
            metrics,
        }
    }

    /// Create an orchestrator using the policy and URL base from `config`
    pub fn from_config(
        ledger: Arc<LedgerClient<B>>,
        scorer: Arc<P>,
        mapping: MappingIndex<S>,
        config: &TraceConfig,
    ) -> Self {
        Self::new(ledger, scorer, mapping)
            .with_match_policy(config.match_policy)
            .with_code_url_base(config.code_url_base.clone())
    }

    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.engine = self.engine.with_policy(policy);
        self
    }

    pub fn with_code_url_base(mut self, base: impl Into<String>) -> Self {
        self.code_url_base = base.into();
        self
    }

    /// Share a metrics collector with the orchestrator and its engine
    pub fn with_metrics(mut self, metrics: Arc<TraceMetrics>) -> Self {
        self.engine = self.engine.with_metrics(metrics.clone());
        self.metrics = metrics;
        self
    }

    pub fn ledger(&self) -> &Arc<LedgerClient<B>> {
        &self.ledger
    }

    pub fn engine(&self) -> &ReconcileEngine<B> {
        &self.engine
    }

    pub fn mapping(&self) -> &MappingIndex<S> {
        &self.mapping
    }

    pub fn metrics(&self) -> &Arc<TraceMetrics> {
        &self.metrics
    }
}
