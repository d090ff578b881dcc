//! Reconciliation Engine
//!
//! The ledger has no secondary indexes, so every filter list and every
//! field-based lookup is a bounded full scan of ids `1..=count()`.
//!
//! Scans are not snapshot-isolated. A record appended mid-scan may or may
//! not be seen, and an id that cannot be read (`NotFound` or a transient
//! error) is skipped and counted; it never aborts the scan and is never
//! treated as a negative match.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::MatchPolicy;
use crate::error::{TraceError, TraceResult};
use crate::ledger::{LedgerBackend, LedgerClient};
use crate::metrics::TraceMetrics;
use crate::types::{collate, is_blank, normalize_field, FieldKey, LedgerRecord, ProductId};

/// Outcome counters of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Ids visited
    pub scanned: u64,
    /// Records accepted by the filter
    pub matched: u64,
    /// Ids that could not be read
    pub skipped: u64,
}

/// Partial selection in the commodity → state → district → market cascade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub commodity: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
}

/// Which list a selection resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLevel {
    Commodity,
    State,
    District,
    Market,
}

/// Next list of choices for a selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub level: FilterLevel,
    pub values: Vec<String>,
}

/// Deduplicates by normalised key, keeping the first spelling seen
#[derive(Default)]
struct DistinctValues {
    seen: HashMap<String, String>,
}

impl DistinctValues {
    fn push(&mut self, value: &str) {
        if is_blank(value) {
            return;
        }
        self.seen
            .entry(normalize_field(value))
            .or_insert_with(|| value.trim().to_string());
    }

    fn into_sorted(self) -> Vec<String> {
        let mut values: Vec<String> = self.seen.into_values().collect();
        values.sort_by(|a, b| collate(a, b));
        values
    }
}

fn require(field: &str, value: &str) -> TraceResult<()> {
    if is_blank(value) {
        return Err(TraceError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

/// Ledger scanning and matching
pub struct ReconcileEngine<B: LedgerBackend> {
    ledger: Arc<LedgerClient<B>>,
    policy: MatchPolicy,
    metrics: Arc<TraceMetrics>,
}

impl<B: LedgerBackend> ReconcileEngine<B> {
    /// Create an engine over a ledger client
    pub fn new(ledger: Arc<LedgerClient<B>>, policy: MatchPolicy) -> Self {
        Self {
            ledger,
            policy,
            metrics: Arc::new(TraceMetrics::new()),
        }
    }

    /// Share a metrics collector
    pub fn with_metrics(mut self, metrics: Arc<TraceMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Tie-break policy used by [`Self::match_fields`]
    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Visit every readable record in ascending id order.
    ///
    /// `visit` returns `Break` to stop early and reports whether the record
    /// matched through the `bool`.
    async fn scan<F>(&self, mut visit: F) -> TraceResult<ScanStats>
    where
        F: FnMut(LedgerRecord) -> ControlFlow<bool, bool>,
    {
        let count = self.ledger.count().await?;
        let mut stats = ScanStats::default();

        for id in 1..=count {
            stats.scanned += 1;
            let record = match self.ledger.get(id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping product {} during scan: {}", id, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            match visit(record) {
                ControlFlow::Continue(matched) => {
                    if matched {
                        stats.matched += 1;
                    }
                }
                ControlFlow::Break(matched) => {
                    if matched {
                        stats.matched += 1;
                    }
                    break;
                }
            }
        }

        debug!(
            "Scan finished: scanned={} matched={} skipped={} (count={})",
            stats.scanned, stats.matched, stats.skipped, count
        );
        self.metrics.scan_completed(stats.scanned, stats.skipped);
        Ok(stats)
    }

    /// Collect one field from every record accepted by `filter`
    async fn distinct<P, V>(&self, filter: P, value: V) -> TraceResult<Vec<String>>
    where
        P: Fn(&LedgerRecord) -> bool,
        V: Fn(&LedgerRecord) -> &str,
    {
        let mut values = DistinctValues::default();
        self.scan(|record| {
            let matched = filter(&record);
            if matched {
                values.push(value(&record));
            }
            ControlFlow::Continue(matched)
        })
        .await?;
        Ok(values.into_sorted())
    }

    /// Every commodity on the ledger
    pub async fn commodities(&self) -> TraceResult<Vec<String>> {
        self.distinct(|_| true, |r| r.name.as_str()).await
    }

    /// States selling `commodity`
    pub async fn states_for(&self, commodity: &str) -> TraceResult<Vec<String>> {
        require("commodity", commodity)?;
        let commodity = normalize_field(commodity);
        self.distinct(
            |r| normalize_field(&r.name) == commodity,
            |r| r.region.state.as_str(),
        )
        .await
    }

    /// Districts of `state` selling `commodity`
    pub async fn districts_for(&self, commodity: &str, state: &str) -> TraceResult<Vec<String>> {
        require("commodity", commodity)?;
        require("state", state)?;
        let commodity = normalize_field(commodity);
        let state = normalize_field(state);
        self.distinct(
            |r| normalize_field(&r.name) == commodity && normalize_field(&r.region.state) == state,
            |r| r.region.district.as_str(),
        )
        .await
    }

    /// Markets of `district` selling `commodity`
    pub async fn markets_for(
        &self,
        commodity: &str,
        state: &str,
        district: &str,
    ) -> TraceResult<Vec<String>> {
        require("commodity", commodity)?;
        require("state", state)?;
        require("district", district)?;
        let commodity = normalize_field(commodity);
        let state = normalize_field(state);
        let district = normalize_field(district);
        self.distinct(
            |r| {
                normalize_field(&r.name) == commodity
                    && normalize_field(&r.region.state) == state
                    && normalize_field(&r.region.district) == district
            },
            |r| r.region.market.as_str(),
        )
        .await
    }

    /// Next filter list for a partial selection
    pub async fn options_for(&self, selection: &FilterSelection) -> TraceResult<FilterOptions> {
        let chosen = |v: &Option<String>| v.as_deref().filter(|s| !is_blank(s)).map(str::to_string);

        match (
            chosen(&selection.commodity),
            chosen(&selection.state),
            chosen(&selection.district),
        ) {
            (None, _, _) => Ok(FilterOptions {
                level: FilterLevel::Commodity,
                values: self.commodities().await?,
            }),
            (Some(c), None, _) => Ok(FilterOptions {
                level: FilterLevel::State,
                values: self.states_for(&c).await?,
            }),
            (Some(c), Some(s), None) => Ok(FilterOptions {
                level: FilterLevel::District,
                values: self.districts_for(&c, &s).await?,
            }),
            (Some(c), Some(s), Some(d)) => Ok(FilterOptions {
                level: FilterLevel::Market,
                values: self.markets_for(&c, &s, &d).await?,
            }),
        }
    }

    /// Every record matching all four fields, ascending by id
    pub async fn records_for(
        &self,
        commodity: &str,
        state: &str,
        district: &str,
        market: &str,
    ) -> TraceResult<Vec<LedgerRecord>> {
        let key = Self::match_key(commodity, state, district, market)?;
        let mut found = Vec::new();
        self.scan(|record| {
            let matched = record.field_key() == key;
            if matched {
                found.push(record);
            }
            ControlFlow::Continue(matched)
        })
        .await?;
        Ok(found)
    }

    /// Resolve four descriptive fields to a single ledger id.
    ///
    /// With [`MatchPolicy::FirstCreated`] the scan stops at the first hit;
    /// with [`MatchPolicy::MostRecent`] it runs to the end and keeps the last.
    pub async fn match_fields(
        &self,
        commodity: &str,
        state: &str,
        district: &str,
        market: &str,
    ) -> TraceResult<ProductId> {
        let key = Self::match_key(commodity, state, district, market)?;
        let policy = self.policy;
        let mut hit: Option<ProductId> = None;

        let stats = self
            .scan(|record| {
                if record.field_key() != key {
                    return ControlFlow::Continue(false);
                }
                hit = Some(record.id);
                match policy {
                    MatchPolicy::FirstCreated => ControlFlow::Break(true),
                    MatchPolicy::MostRecent => ControlFlow::Continue(true),
                }
            })
            .await?;

        match hit {
            Some(id) => {
                debug!("Matched {} to product {} ({:?})", key, id, policy);
                Ok(id)
            }
            None => {
                debug!(
                    "No product matches {} ({} scanned, {} skipped)",
                    key, stats.scanned, stats.skipped
                );
                self.metrics.no_match();
                Err(TraceError::NoMatch {
                    commodity: key.commodity,
                    state: key.state,
                    district: key.district,
                    market: key.market,
                })
            }
        }
    }

    fn match_key(commodity: &str, state: &str, district: &str, market: &str) -> TraceResult<FieldKey> {
        require("commodity", commodity)?;
        require("state", state)?;
        require("district", district)?;
        require("market", market)?;
        Ok(FieldKey::new(commodity, state, district, market))
    }
}
