//! Read paths: product detail and cascading filter options.

use serde::Serialize;
use tracing::debug;

use super::SubmissionOrchestrator;
use crate::error::{TraceError, TraceResult};
use crate::ledger::LedgerBackend;
use crate::mapping::MappingStore;
use crate::reconcile::{FilterOptions, FilterSelection};
use crate::scoring::PriceScorer;
use crate::types::{parse_ledger_id, LedgerRecord, MappingEntry};

/// Ledger record joined with its mapping entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    pub record: LedgerRecord,
    /// Absent when the product was never indexed
    pub mapping: Option<MappingEntry>,
}

impl<B, S, P> SubmissionOrchestrator<B, S, P>
where
    B: LedgerBackend,
    S: MappingStore,
    P: PriceScorer,
{
    /// Product by ledger id
    pub async fn product_detail(&self, ledger_id: &str) -> TraceResult<ProductDetail> {
        let id = parse_ledger_id(ledger_id).ok_or_else(|| {
            TraceError::InvalidInput(format!("invalid ledger id {:?}", ledger_id))
        })?;
        let record = self.ledger.get(id).await?;

        let mapping = match self.mapping.get(ledger_id).await {
            Ok(entry) => Some(entry),
            Err(TraceError::NotFound(_)) => {
                debug!("Product {} has no mapping entry", id);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(ProductDetail { record, mapping })
    }

    /// Product by mapping record id, for callers holding only the code
    pub async fn product_by_record(&self, record_id: &str) -> TraceResult<ProductDetail> {
        let entry = self.mapping.get_by_record(record_id).await?;
        let id = parse_ledger_id(&entry.ledger_id).ok_or_else(|| {
            TraceError::Serialization(format!(
                "mapping {} holds invalid ledger id {:?}",
                record_id, entry.ledger_id
            ))
        })?;
        let record = self.ledger.get(id).await?;
        Ok(ProductDetail {
            record,
            mapping: Some(entry),
        })
    }

    /// Next filter list for a partial selection
    pub async fn filter_options(&self, selection: &FilterSelection) -> TraceResult<FilterOptions> {
        self.engine.options_for(selection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::tests::{harness, seed, Harness};
    use crate::reconcile::FilterLevel;
    use crate::types::ScoringResponse;

    #[tokio::test]
    async fn test_product_detail_joins_mapping() {
        let Harness { orchestrator, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1450.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;

        let detail = orchestrator.product_detail("1").await.unwrap();
        assert_eq!(detail.record.name, "Wheat");
        let mapping = detail.mapping.unwrap();
        assert_eq!(mapping.ledger_id, "1");

        let by_record = orchestrator.product_by_record(&mapping.record_id).await.unwrap();
        assert_eq!(by_record.record, detail.record);
    }

    #[tokio::test]
    async fn test_product_detail_without_mapping() {
        let Harness { orchestrator, .. } = harness(vec![]).await;
        orchestrator
            .ledger()
            .append(&crate::types::NewProduct::new(
                "Rice",
                2100.0,
                crate::types::Region::new("Punjab", "Ludhiana", "Khanna"),
            ))
            .await
            .unwrap();

        let detail = orchestrator.product_detail("1").await.unwrap();
        assert!(detail.mapping.is_none());
    }

    #[tokio::test]
    async fn test_product_detail_errors() {
        let Harness { orchestrator, .. } = harness(vec![]).await;
        assert!(matches!(
            orchestrator.product_detail("abc").await,
            Err(TraceError::InvalidInput(_))
        ));
        assert!(matches!(
            orchestrator.product_detail("3").await,
            Err(TraceError::NotFound(_))
        ));
        assert!(matches!(
            orchestrator.product_by_record("nope").await,
            Err(TraceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_options_cascade() {
        let Harness { orchestrator, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1450.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;
        seed(&orchestrator, "Wheat", "Punjab", "Ludhiana", "Khanna").await;

        let selection = FilterSelection {
            commodity: Some("Wheat".into()),
            ..Default::default()
        };
        let options = orchestrator.filter_options(&selection).await.unwrap();
        assert_eq!(options.level, FilterLevel::State);
        assert_eq!(options.values, vec!["Karnataka", "Punjab"]);
    }
}
