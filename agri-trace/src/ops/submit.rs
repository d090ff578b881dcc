//! New product submission
//!
//! ```text
//! Drafted → Scoring → Rejected
//!                   → ScoringFailed
//!                   → Accepted → Appending → LedgerFailed
//!                                          → Appended → Indexing → Indexed
//!                                                                → IndexFailed
//! ```
//!
//! Nothing reaches the ledger unless the scorer accepted the price, and no
//! mapping entry exists for a submission that never reached the ledger.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::SubmissionOrchestrator;
use crate::error::{TraceError, TraceResult};
use crate::ledger::LedgerBackend;
use crate::mapping::MappingStore;
use crate::scoring::PriceScorer;
use crate::types::{
    is_blank, MappingEntry, NewProduct, ProductId, Region, ScoringRequest, ScoringResponse,
    ScoringStatus, Verification,
};

/// Product as entered by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub commodity: String,
    pub base_price: f64,
    pub state: String,
    pub district: String,
    pub market: String,
}

impl ProductDraft {
    pub fn new(
        commodity: impl Into<String>,
        base_price: f64,
        state: impl Into<String>,
        district: impl Into<String>,
        market: impl Into<String>,
    ) -> Self {
        Self {
            commodity: commodity.into(),
            base_price,
            state: state.into(),
            district: district.into(),
            market: market.into(),
        }
    }

    /// Trimmed copy, or `InvalidInput` naming the first bad field
    pub fn normalized(&self) -> TraceResult<Self> {
        for (field, value) in [
            ("commodity", &self.commodity),
            ("state", &self.state),
            ("district", &self.district),
            ("market", &self.market),
        ] {
            if is_blank(value) {
                return Err(TraceError::InvalidInput(format!("{} is required", field)));
            }
        }
        if !self.base_price.is_finite() || self.base_price <= 0.0 {
            return Err(TraceError::InvalidInput(format!(
                "base price must be a positive number, got {}",
                self.base_price
            )));
        }

        Ok(Self {
            commodity: self.commodity.trim().to_string(),
            base_price: self.base_price,
            state: self.state.trim().to_string(),
            district: self.district.trim().to_string(),
            market: self.market.trim().to_string(),
        })
    }

    pub fn scoring_request(&self) -> ScoringRequest {
        ScoringRequest {
            commodity: self.commodity.clone(),
            state: self.state.clone(),
            district: self.district.clone(),
            market: self.market.clone(),
            vendor_price: self.base_price,
        }
    }

    pub fn new_product(&self) -> NewProduct {
        NewProduct::new(
            self.commodity.clone(),
            self.base_price,
            Region::new(self.state.clone(), self.district.clone(), self.market.clone()),
        )
    }
}

/// Submission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionState {
    Drafted,
    Scoring,
    Rejected,
    ScoringFailed,
    Accepted,
    Appending,
    LedgerFailed,
    Appended,
    Indexing,
    Indexed,
    /// Ledger record exists but the mapping entry could not be written
    IndexFailed,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::ScoringFailed | Self::LedgerFailed | Self::Indexed | Self::IndexFailed
        )
    }

    pub fn can_transition_to(&self, target: SubmissionState) -> bool {
        matches!(
            (self, target),
            (Self::Drafted, Self::Scoring)
                | (Self::Scoring, Self::Rejected)
                | (Self::Scoring, Self::ScoringFailed)
                | (Self::Scoring, Self::Accepted)
                | (Self::Accepted, Self::Appending)
                | (Self::Appending, Self::LedgerFailed)
                | (Self::Appending, Self::Appended)
                | (Self::Appended, Self::Indexing)
                | (Self::Indexing, Self::Indexed)
                | (Self::Indexing, Self::IndexFailed)
        )
    }
}

/// Final result of a submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Scorer rejected the price
    Rejected { verdict: ScoringResponse },
    /// No verdict could be obtained
    ScoringFailed { error: TraceError },
    /// Accepted but the append failed
    LedgerFailed {
        verdict: ScoringResponse,
        error: TraceError,
    },
    /// Appended and indexed
    Indexed {
        ledger_id: ProductId,
        receipt_ref: String,
        entry: MappingEntry,
    },
    /// Appended, but the mapping entry is missing
    IndexingFailed {
        ledger_id: ProductId,
        receipt_ref: String,
        error: TraceError,
    },
}

/// Submission outcome plus the states walked
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReport {
    pub outcome: SubmissionOutcome,
    pub trail: Vec<SubmissionState>,
}

impl SubmissionReport {
    /// Terminal state
    pub fn state(&self) -> SubmissionState {
        self.trail.last().copied().unwrap_or(SubmissionState::Drafted)
    }

    /// Ledger id, when the product reached the ledger
    pub fn ledger_id(&self) -> Option<ProductId> {
        match &self.outcome {
            SubmissionOutcome::Indexed { ledger_id, .. }
            | SubmissionOutcome::IndexingFailed { ledger_id, .. } => Some(*ledger_id),
            _ => None,
        }
    }

    /// True only for a fully indexed submission
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, SubmissionOutcome::Indexed { .. })
    }
}

struct Trail(Vec<SubmissionState>);

impl Trail {
    fn start() -> Self {
        Self(vec![SubmissionState::Drafted])
    }

    fn advance(&mut self, next: SubmissionState) {
        let current = self.0.last().copied().unwrap_or(SubmissionState::Drafted);
        debug_assert!(
            current.can_transition_to(next),
            "invalid submission transition {:?} -> {:?}",
            current,
            next
        );
        debug!("Submission {:?} -> {:?}", current, next);
        self.0.push(next);
    }

    fn finish(self, outcome: SubmissionOutcome) -> SubmissionReport {
        SubmissionReport {
            outcome,
            trail: self.0,
        }
    }
}

impl<B, S, P> SubmissionOrchestrator<B, S, P>
where
    B: LedgerBackend,
    S: MappingStore,
    P: PriceScorer,
{
    /// Address a scannable code for `ledger_id` resolves to
    pub fn code_url(&self, ledger_id: ProductId) -> String {
        format!(
            "{}/product/{}",
            self.code_url_base.trim_end_matches('/'),
            ledger_id
        )
    }

    /// Score, append and index a new product.
    ///
    /// Fails only when the draft itself is invalid; every other failure is
    /// reported through [`SubmissionOutcome`].
    pub async fn submit(&self, draft: &ProductDraft) -> TraceResult<SubmissionReport> {
        let draft = draft.normalized()?;
        self.metrics.submission_started();
        let mut trail = Trail::start();

        trail.advance(SubmissionState::Scoring);
        let verdict = match self.scorer.score(&draft.scoring_request()).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!("Scoring failed for '{}': {}", draft.commodity, error);
                self.metrics.scoring_failed();
                trail.advance(SubmissionState::ScoringFailed);
                return Ok(trail.finish(SubmissionOutcome::ScoringFailed { error }));
            }
        };

        match verdict.status {
            ScoringStatus::Accept => {}
            ScoringStatus::Reject => {
                info!(
                    "Submission of '{}' at {} rejected: {}",
                    draft.commodity, draft.base_price, verdict.reason
                );
                self.metrics.submission_rejected();
                trail.advance(SubmissionState::Rejected);
                return Ok(trail.finish(SubmissionOutcome::Rejected { verdict }));
            }
            ScoringStatus::Error => {
                warn!("Scorer reported an error for '{}': {}", draft.commodity, verdict.reason);
                self.metrics.scoring_failed();
                trail.advance(SubmissionState::ScoringFailed);
                return Ok(trail.finish(SubmissionOutcome::ScoringFailed {
                    error: TraceError::ScoringFailed(verdict.reason),
                }));
            }
        }

        trail.advance(SubmissionState::Accepted);
        trail.advance(SubmissionState::Appending);
        let receipt = match self.ledger.append(&draft.new_product()).await {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!("Ledger append failed for '{}': {}", draft.commodity, error);
                self.metrics.ledger_failed();
                trail.advance(SubmissionState::LedgerFailed);
                return Ok(trail.finish(SubmissionOutcome::LedgerFailed { verdict, error }));
            }
        };
        self.metrics.ledger_appended();
        trail.advance(SubmissionState::Appended);

        trail.advance(SubmissionState::Indexing);
        let verification = Verification::from_scoring(&verdict);
        let indexed = self
            .mapping
            .create(
                &receipt.id.to_string(),
                &receipt.receipt_ref,
                &self.code_url(receipt.id),
                Some(verification),
            )
            .await;

        match indexed {
            Ok(entry) => {
                self.metrics.mapping_indexed();
                trail.advance(SubmissionState::Indexed);
                info!("Product {} submitted and indexed as {}", receipt.id, entry.record_id);
                Ok(trail.finish(SubmissionOutcome::Indexed {
                    ledger_id: receipt.id,
                    receipt_ref: receipt.receipt_ref,
                    entry,
                }))
            }
            Err(error) => {
                self.metrics.indexing_failed();
                trail.advance(SubmissionState::IndexFailed);
                warn!(
                    "Product {} is on the ledger but has no mapping entry: {}",
                    receipt.id, error
                );
                Ok(trail.finish(SubmissionOutcome::IndexingFailed {
                    ledger_id: receipt.id,
                    receipt_ref: receipt.receipt_ref,
                    error,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingStats;
    use crate::ops::tests::{harness, wheat_draft, Harness};
    use crate::types::VerificationStatus;

    #[test]
    fn test_draft_validation() {
        let draft = ProductDraft::new("  Wheat ", 1500.0, " Karnataka", "Bangalore ", "Ramanagara");
        let normalized = draft.normalized().unwrap();
        assert_eq!(normalized.commodity, "Wheat");
        assert_eq!(normalized.state, "Karnataka");
        assert_eq!(normalized.district, "Bangalore");

        for price in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut bad = draft.clone();
            bad.base_price = price;
            assert!(matches!(bad.normalized(), Err(TraceError::InvalidInput(_))));
        }

        let mut bad = draft;
        bad.market = "\t".into();
        assert!(matches!(bad.normalized(), Err(TraceError::InvalidInput(_))));
    }

    #[test]
    fn test_state_transitions() {
        use SubmissionState::*;
        assert!(Drafted.can_transition_to(Scoring));
        assert!(Scoring.can_transition_to(Rejected));
        assert!(Indexing.can_transition_to(IndexFailed));
        assert!(!Drafted.can_transition_to(Appending));
        assert!(!Rejected.can_transition_to(Appending));
        assert!(!Scoring.can_transition_to(Appending));

        for state in [Rejected, ScoringFailed, LedgerFailed, Indexed, IndexFailed] {
            assert!(state.is_terminal());
        }
        assert!(!Appended.is_terminal());
    }

    #[tokio::test]
    async fn test_accepted_submission_is_indexed() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("Within 10%", 1450.0))]).await;

        let report = orchestrator.submit(&wheat_draft()).await.unwrap();
        assert_eq!(report.state(), SubmissionState::Indexed);
        assert_eq!(
            report.trail,
            vec![
                SubmissionState::Drafted,
                SubmissionState::Scoring,
                SubmissionState::Accepted,
                SubmissionState::Appending,
                SubmissionState::Appended,
                SubmissionState::Indexing,
                SubmissionState::Indexed,
            ]
        );

        match report.outcome {
            SubmissionOutcome::Indexed { ledger_id, receipt_ref, entry } => {
                assert_eq!(ledger_id, 1);
                assert_eq!(entry.ledger_id, "1");
                assert_eq!(entry.receipt_ref, receipt_ref);
                assert_eq!(entry.code_url, "http://localhost:5173/product/1");
                assert_eq!(entry.verification_status(), VerificationStatus::Accept);
                assert_eq!(entry.verification.unwrap().market_modal_price, 1450.0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(ledger.append_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_never_appends() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::reject("price too high", 1000.0))]).await;

        let report = orchestrator.submit(&wheat_draft()).await.unwrap();
        assert_eq!(report.state(), SubmissionState::Rejected);
        assert_eq!(report.ledger_id(), None);
        assert_eq!(ledger.append_calls(), 0);
        assert_eq!(orchestrator.mapping().stats().await.unwrap(), MappingStats::default());
        assert_eq!(orchestrator.metrics().snapshot().submissions_rejected, 1);
    }

    #[tokio::test]
    async fn test_scoring_error_status_is_a_failure() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::error("no market data"))]).await;

        let report = orchestrator.submit(&wheat_draft()).await.unwrap();
        assert_eq!(report.state(), SubmissionState::ScoringFailed);
        assert!(matches!(
            report.outcome,
            SubmissionOutcome::ScoringFailed { error: TraceError::ScoringFailed(_) }
        ));
        assert_eq!(ledger.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_scoring_unavailable_never_appends() {
        let Harness { orchestrator, ledger, .. } = harness(vec![Err(
            TraceError::ScoringUnavailable("no interpreter".into()),
        )])
        .await;

        let report = orchestrator.submit(&wheat_draft()).await.unwrap();
        assert!(matches!(
            report.outcome,
            SubmissionOutcome::ScoringFailed { error: TraceError::ScoringUnavailable(_) }
        ));
        assert_eq!(ledger.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_ledger_failure_creates_no_mapping() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        ledger.set_offline(true);

        let report = orchestrator.submit(&wheat_draft()).await.unwrap();
        assert_eq!(report.state(), SubmissionState::LedgerFailed);
        assert!(matches!(
            report.outcome,
            SubmissionOutcome::LedgerFailed { error: TraceError::LedgerUnavailable(_), .. }
        ));
        assert_eq!(orchestrator.mapping().stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_indexing_failure_is_surfaced() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        // Occupy the id the ledger will assign next.
        orchestrator.mapping().create("1", "0xstale", "url", None).await.unwrap();

        let report = orchestrator.submit(&wheat_draft()).await.unwrap();
        assert_eq!(report.state(), SubmissionState::IndexFailed);
        assert_eq!(report.ledger_id(), Some(1));
        assert!(!report.is_complete());
        assert!(matches!(
            report.outcome,
            SubmissionOutcome::IndexingFailed { error: TraceError::DuplicateMapping(_), .. }
        ));
        assert_eq!(ledger.records().await.len(), 1);
        assert_eq!(orchestrator.metrics().snapshot().indexing_failures, 1);
    }

    #[tokio::test]
    async fn test_invalid_draft_is_refused_before_scoring() {
        let Harness { orchestrator, scorer, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        let mut draft = wheat_draft();
        draft.commodity = " ".into();

        assert!(matches!(
            orchestrator.submit(&draft).await,
            Err(TraceError::InvalidInput(_))
        ));
        assert_eq!(scorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_code_url_trims_trailing_slash() {
        let Harness { orchestrator, .. } = harness(vec![]).await;
        let orchestrator = orchestrator.with_code_url_base("https://trace.example/");
        assert_eq!(orchestrator.code_url(12), "https://trace.example/product/12");
    }
}
