//! Cross-store consistency check between the ledger and the mapping index.
//!
//! The ledger is authoritative. A mapping entry whose ledger record does not
//! exist is an orphan; a ledger id without a mapping entry is unindexed
//! (typically left behind by an `IndexingFailed` submission).

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use super::SubmissionOrchestrator;
use crate::error::{TraceError, TraceResult};
use crate::ledger::LedgerBackend;
use crate::mapping::MappingStore;
use crate::scoring::PriceScorer;
use crate::types::{parse_ledger_id, ProductId};

/// Audit findings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// `count()` at the time of the audit
    pub ledger_count: u64,
    /// Mapping entries examined
    pub mapped: u64,
    /// Ledger ids of entries whose record is missing
    pub orphans: Vec<String>,
    /// Ledger ids of entries whose record could not be read
    pub unreadable: Vec<String>,
    /// Ledger ids with no mapping entry
    pub unindexed: Vec<ProductId>,
}

impl ConsistencyReport {
    /// No orphaned or unreadable entries
    pub fn is_consistent(&self) -> bool {
        self.orphans.is_empty() && self.unreadable.is_empty()
    }
}

impl<B, S, P> SubmissionOrchestrator<B, S, P>
where
    B: LedgerBackend,
    S: MappingStore,
    P: PriceScorer,
{
    /// Compare every mapping entry against the ledger
    pub async fn audit(&self) -> TraceResult<ConsistencyReport> {
        let ledger_count = self.ledger.count().await?;
        let entries = self.mapping.list().await?;

        let mut report = ConsistencyReport {
            ledger_count,
            mapped: entries.len() as u64,
            ..Default::default()
        };
        let mut indexed = HashSet::new();

        for entry in &entries {
            let id = match parse_ledger_id(&entry.ledger_id) {
                Some(id) => id,
                None => {
                    report.orphans.push(entry.ledger_id.clone());
                    continue;
                }
            };
            indexed.insert(id);

            if id > ledger_count {
                report.orphans.push(entry.ledger_id.clone());
                continue;
            }
            match self.ledger.get(id).await {
                Ok(_) => {}
                Err(TraceError::NotFound(_)) => report.orphans.push(entry.ledger_id.clone()),
                Err(e) => {
                    warn!("Audit could not read product {}: {}", id, e);
                    report.unreadable.push(entry.ledger_id.clone());
                }
            }
        }

        report.unindexed = (1..=ledger_count).filter(|id| !indexed.contains(id)).collect();

        if report.is_consistent() {
            info!(
                "Audit: {} entries consistent, {} unindexed ledger ids",
                report.mapped,
                report.unindexed.len()
            );
        } else {
            warn!(
                "Audit: {} orphaned and {} unreadable mapping entries",
                report.orphans.len(),
                report.unreadable.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::ops::tests::{harness, seed, Harness};
    use crate::types::{NewProduct, Region, ScoringResponse};

    #[tokio::test]
    async fn test_clean_audit() {
        let Harness { orchestrator, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1450.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;
        seed(&orchestrator, "Rice", "Punjab", "Ludhiana", "Khanna").await;

        let report = orchestrator.audit().await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.ledger_count, 2);
        assert_eq!(report.mapped, 2);
        assert!(report.unindexed.is_empty());
    }

    #[tokio::test]
    async fn test_audit_findings() {
        let Harness { orchestrator, ledger, .. } =
            harness(vec![Ok(ScoringResponse::accept("ok", 1450.0))]).await;
        seed(&orchestrator, "Wheat", "Karnataka", "Bangalore", "Ramanagara").await;
        seed(&orchestrator, "Rice", "Punjab", "Ludhiana", "Khanna").await;
        // Appended outside the orchestrator, so never indexed.
        orchestrator
            .ledger()
            .append(&NewProduct::new("Barley", 900.0, Region::new("Rajasthan", "Jaipur", "Chomu")))
            .await
            .unwrap();
        orchestrator.mapping().create("9", "0xghost", "url", None).await.unwrap();
        ledger.mark_unreadable(2).await;

        let report = orchestrator.audit().await.unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.orphans, vec!["9"]);
        assert_eq!(report.unreadable, vec!["2"]);
        assert_eq!(report.unindexed, vec![3]);
    }
}
