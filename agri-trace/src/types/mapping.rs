//! Mapping Entry
//!
//! Off-chain record linking a ledger id to metadata that does not belong on
//! the ledger: the append receipt, the scannable-code URL and the outcome of
//! price verification. Entries are written once and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::RecordId;
use super::scoring::{ScoringResponse, ScoringStatus};

/// Verification verdict recorded alongside a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Accept,
    Reject,
    #[default]
    Unset,
}

/// Price verification metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Verification {
    pub status: VerificationStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub market_modal_price: f64,
}

impl Verification {
    /// Build from a scoring verdict. `error` responses carry no verdict.
    pub fn from_scoring(response: &ScoringResponse) -> Self {
        let status = match response.status {
            ScoringStatus::Accept => VerificationStatus::Accept,
            ScoringStatus::Reject => VerificationStatus::Reject,
            ScoringStatus::Error => VerificationStatus::Unset,
        };
        Self {
            status,
            reason: response.reason.clone(),
            market_modal_price: response.market_modal_price.unwrap_or_default(),
        }
    }
}

/// One row of the mapping index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Opaque id generated by the index
    pub record_id: RecordId,
    /// Decimal string form of the ledger id (unique)
    pub ledger_id: String,
    /// Proof-of-append reference from the ledger
    pub receipt_ref: String,
    /// Address a scannable code resolves to
    pub code_url: String,
    /// Verification outcome, if one was recorded
    pub verification: Option<Verification>,
    pub created_at: DateTime<Utc>,
}

impl MappingEntry {
    pub fn verification_status(&self) -> VerificationStatus {
        self.verification
            .as_ref()
            .map(|v| v.status)
            .unwrap_or_default()
    }
}

/// Parse a ledger id key; it must be the canonical decimal form of a
/// positive integer, so one id has exactly one key.
pub fn parse_ledger_id(ledger_id: &str) -> Option<u64> {
    if ledger_id.is_empty() || !ledger_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    ledger_id
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0 && id.to_string() == ledger_id)
}
