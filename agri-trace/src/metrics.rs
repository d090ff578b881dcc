//! Trace Metrics
//!
//! Lock-free counters for the submission and reconciliation paths.
//!
//! ```rust,ignore
//! let metrics = TraceMetrics::new();
//! metrics.submission_started();
//! metrics.scan_completed(120, 1);
//! let snapshot = metrics.snapshot();
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter metrics (monotonically increasing)
#[derive(Debug, Default)]
pub struct TraceMetrics {
    submissions_total: AtomicU64,
    submissions_rejected: AtomicU64,
    scoring_failures: AtomicU64,
    ledger_appends: AtomicU64,
    ledger_failures: AtomicU64,
    mappings_indexed: AtomicU64,
    indexing_failures: AtomicU64,
    price_updates: AtomicU64,
    no_match_lookups: AtomicU64,
    scans_total: AtomicU64,
    records_scanned: AtomicU64,
    records_skipped: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submissions_total: u64,
    pub submissions_rejected: u64,
    pub scoring_failures: u64,
    pub ledger_appends: u64,
    pub ledger_failures: u64,
    pub mappings_indexed: u64,
    pub indexing_failures: u64,
    pub price_updates: u64,
    pub no_match_lookups: u64,
    pub scans_total: u64,
    pub records_scanned: u64,
    pub records_skipped: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl TraceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submission_started(&self) {
        bump(&self.submissions_total);
    }

    pub fn submission_rejected(&self) {
        bump(&self.submissions_rejected);
    }

    pub fn scoring_failed(&self) {
        bump(&self.scoring_failures);
    }

    pub fn ledger_appended(&self) {
        bump(&self.ledger_appends);
    }

    pub fn ledger_failed(&self) {
        bump(&self.ledger_failures);
    }

    pub fn mapping_indexed(&self) {
        bump(&self.mappings_indexed);
    }

    pub fn indexing_failed(&self) {
        bump(&self.indexing_failures);
    }

    pub fn price_updated(&self) {
        bump(&self.price_updates);
    }

    pub fn no_match(&self) {
        bump(&self.no_match_lookups);
    }

    /// Record one finished ledger scan
    pub fn scan_completed(&self, scanned: u64, skipped: u64) {
        bump(&self.scans_total);
        self.records_scanned.fetch_add(scanned, Ordering::Relaxed);
        self.records_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            submissions_total: load(&self.submissions_total),
            submissions_rejected: load(&self.submissions_rejected),
            scoring_failures: load(&self.scoring_failures),
            ledger_appends: load(&self.ledger_appends),
            ledger_failures: load(&self.ledger_failures),
            mappings_indexed: load(&self.mappings_indexed),
            indexing_failures: load(&self.indexing_failures),
            price_updates: load(&self.price_updates),
            no_match_lookups: load(&self.no_match_lookups),
            scans_total: load(&self.scans_total),
            records_scanned: load(&self.records_scanned),
            records_skipped: load(&self.records_skipped),
        }
    }
}
