//! Price update
//!
//! ```text
//! Lookup → NoMatch
//!        → Matched → Appending → LedgerFailed
//!                              → Appended
//! ```
//!
//! The descriptive fields are resolved to a ledger id with the configured
//! match policy, then one price point is appended. The ledger extends the
//! price trail and the handler list together.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::SubmissionOrchestrator;
use crate::error::{TraceError, TraceResult};
use crate::ledger::{validate_price, LedgerBackend};
use crate::mapping::MappingStore;
use crate::scoring::PriceScorer;
use crate::types::{is_blank, ProductId};

/// Price amendment addressed by descriptive fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub commodity: String,
    pub state: String,
    pub district: String,
    pub market: String,
    pub new_price: f64,
}

impl PriceUpdate {
    pub fn new(
        commodity: impl Into<String>,
        state: impl Into<String>,
        district: impl Into<String>,
        market: impl Into<String>,
        new_price: f64,
    ) -> Self {
        Self {
            commodity: commodity.into(),
            state: state.into(),
            district: district.into(),
            market: market.into(),
            new_price,
        }
    }

    fn validate(&self) -> TraceResult<()> {
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
        validate_price("new price", self.new_price)
    }
}

/// Price update state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceUpdateState {
    Lookup,
    NoMatch,
    Matched,
    Appending,
    LedgerFailed,
    Appended,
}

impl PriceUpdateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoMatch | Self::LedgerFailed | Self::Appended)
    }

    pub fn can_transition_to(&self, target: PriceUpdateState) -> bool {
        matches!(
            (self, target),
            (Self::Lookup, Self::NoMatch)
                // the scan itself could not start
                | (Self::Lookup, Self::LedgerFailed)
                | (Self::Lookup, Self::Matched)
                | (Self::Matched, Self::Appending)
                | (Self::Appending, Self::LedgerFailed)
                | (Self::Appending, Self::Appended)
        )
    }
}

/// Final result of a price update
#[derive(Debug, Clone, PartialEq)]
pub enum PriceUpdateOutcome {
    NoMatch,
    LedgerFailed {
        /// Matched id, when the lookup got that far
        ledger_id: Option<ProductId>,
        error: TraceError,
    },
    Appended {
        ledger_id: ProductId,
        receipt_ref: String,
        new_price: f64,
    },
}

/// Price update outcome plus the states walked
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdateReport {
    pub outcome: PriceUpdateOutcome,
    pub trail: Vec<PriceUpdateState>,
}

impl PriceUpdateReport {
    pub fn state(&self) -> PriceUpdateState {
        self.trail.last().copied().unwrap_or(PriceUpdateState::Lookup)
    }

    pub fn ledger_id(&self) -> Option<ProductId> {
        match &self.outcome {
            PriceUpdateOutcome::Appended { ledger_id, .. } => Some(*ledger_id),
            PriceUpdateOutcome::LedgerFailed { ledger_id, .. } => *ledger_id,
            PriceUpdateOutcome::NoMatch => None,
        }
    }
}

struct Trail(Vec<PriceUpdateState>);

impl Trail {
    fn advance(&mut self, next: PriceUpdateState) {
        let current = self.0.last().copied().unwrap_or(PriceUpdateState::Lookup);
        debug_assert!(
            current.can_transition_to(next),
            "invalid price update transition {:?} -> {:?}",
            current,
            next
        );
        debug!("Price update {:?} -> {:?}", current, next);
        self.0.push(next);
    }

    fn finish(self, outcome: PriceUpdateOutcome) -> PriceUpdateReport {
        PriceUpdateReport {
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
    /// Match the fields to a product and append `new_price` to its trail.
    ///
    /// Prices are not scored here. Fails only for invalid input.
    pub async fn update_price(&self, update: &PriceUpdate) -> TraceResult<PriceUpdateReport> {
        update.validate()?;
        let mut trail = Trail(vec![PriceUpdateState::Lookup]);

        let matched = self
            .engine
            .match_fields(&update.commodity, &update.state, &update.district, &update.market)
            .await;

        let ledger_id = match matched {
            Ok(id) => id,
            Err(TraceError::NoMatch { .. }) => {
                info!(
                    "No product for {}/{}/{}/{}; price not recorded",
                    update.commodity, update.state, update.district, update.market
                );
                trail.advance(PriceUpdateState::NoMatch);
                return Ok(trail.finish(PriceUpdateOutcome::NoMatch));
            }
            Err(TraceError::InvalidInput(msg)) => return Err(TraceError::InvalidInput(msg)),
            Err(error) => {
                warn!("Product lookup failed: {}", error);
                self.metrics.ledger_failed();
                trail.advance(PriceUpdateState::LedgerFailed);
                return Ok(trail.finish(PriceUpdateOutcome::LedgerFailed {
                    ledger_id: None,
                    error,
                }));
            }
        };
        trail.advance(PriceUpdateState::Matched);

        trail.advance(PriceUpdateState::Appending);
        match self.ledger.update_price(ledger_id, update.new_price).await {
            Ok(receipt_ref) => {
                self.metrics.price_updated();
                trail.advance(PriceUpdateState::Appended);
                info!(
                    "Recorded price {} for product {} receipt={}",
                    update.new_price, ledger_id, receipt_ref
                );
                Ok(trail.finish(PriceUpdateOutcome::Appended {
                    ledger_id,
                    receipt_ref,
                    new_price: update.new_price,
                }))
            }
            Err(error) => {
                warn!("Price update for product {} failed: {}", ledger_id, error);
                self.metrics.ledger_failed();
                trail.advance(PriceUpdateState::LedgerFailed);
                Ok(trail.finish(PriceUpdateOutcome::LedgerFailed {
                    ledger_id: Some(ledger_id),
                    error,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchPolicy;
    use crate::ops::tests::{harness, seed, Harness};
    use crate::types::ScoringResponse;

    #[test]
    fn test_state_transitions() {
        use PriceUpdateState::*;
        assert!(Lookup.can_transition_to(Matched));
        assert!(Lookup.can_transition_to(NoMatch));
        assert!(Matched.can_transition_to(Appending));
        assert!(!Lookup.can_transition_to(Appending));
        assert!(!NoMatch.can_transition_to(Matched));
        assert!(Appended.is_terminal());
        assert!(!Matched.is_terminal());
    }

    #[tokio::test]
    async fn test_update_extends_trail() {
        let Harness { orchestrator, ledger, scorer } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;

        let update = PriceUpdate::new("wheat", " karnataka", "BANGALORE", "Ramanagara ", 1600.0);
        let report = orchestrator.update_price(&update).await.unwrap();

        assert_eq!(
            report.trail,
            vec![
                PriceUpdateState::Lookup,
                PriceUpdateState::Matched,
                PriceUpdateState::Appending,
                PriceUpdateState::Appended,
            ]
        );
        assert_eq!(report.ledger_id(), Some(1));

        let record = orchestrator.ledger().get(1).await.unwrap();
        assert_eq!(record.price_trail, vec![1600.0]);
        assert_eq!(record.handlers.len(), 1);
        assert_eq!(ledger.update_calls(), 1);
        assert_eq!(scorer.calls(), 1, "only the submission is scored");
    }

    #[tokio::test]
    async fn test_no_match_appends_nothing() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;

        let update = PriceUpdate::new("Rice", "Karnataka", "Bangalore", "Ramanagara", 1600.0);
        let report = orchestrator.update_price(&update).await.unwrap();

        assert_eq!(report.outcome, PriceUpdateOutcome::NoMatch);
        assert_eq!(report.state(), PriceUpdateState::NoMatch);
        assert_eq!(ledger.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_not_a_negative_match() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;
        ledger.mark_unreadable(1).await;

        let update = PriceUpdate::new("Wheat", "Karnataka", "Bangalore", "Ramanagara", 1700.0);
        let report = orchestrator.update_price(&update).await.unwrap();
        assert_eq!(report.ledger_id(), Some(2));
    }

    #[tokio::test]
    async fn test_most_recent_policy_targets_latest() {
        let Harness { orchestrator, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        let orchestrator = orchestrator.with_match_policy(MatchPolicy::MostRecent);
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;

        let update = PriceUpdate::new("Wheat", "Karnataka", "Bangalore", "Ramanagara", 1700.0);
        let report = orchestrator.update_price(&update).await.unwrap();
        assert_eq!(report.ledger_id(), Some(2));
    }

    #[tokio::test]
    async fn test_ledger_outage_during_lookup() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;
        ledger.set_offline(true);

        let update = PriceUpdate::new("Wheat", "Karnataka", "Bangalore", "Ramanagara", 1700.0);
        let report = orchestrator.update_price(&update).await.unwrap();
        assert_eq!(report.state(), PriceUpdateState::LedgerFailed);
        assert_eq!(report.ledger_id(), None);
    }

    #[tokio::test]
    async fn test_invalid_price_is_refused() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1500.0))]).await;

        let update = PriceUpdate::new("Wheat", "Karnataka", "Bangalore", "Ramanagara", -3.0);
        assert!(matches!(
            orchestrator.update_price(&update).await,
            Err(TraceError::InvalidInput(_))
        ));
        assert_eq!(ledger.update_calls(), 0);
    }
}
