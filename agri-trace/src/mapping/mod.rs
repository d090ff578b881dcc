//! Mapping Index
//!
//! Off-chain key-value index correlating ledger ids with auxiliary
//! metadata. The index is the only component with durable local state.
//!
//! # Guarantees
//!
//! - At most one entry per ledger id. `create` is a single atomic
//!   check-and-insert in every backend, so concurrent creates for the same
//!   id have exactly one winner.
//! - Entries are write-once; there is no update or delete path.
//! - Every entry is reachable by ledger id and by its generated record id.

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MappingConfig;
use crate::error::{TraceError, TraceResult};
use crate::types::{parse_ledger_id, MappingEntry, Verification, VerificationStatus};

pub use self::memory::MemoryMappingStore;
pub use self::sled::SledMappingStore;

/// Mapping storage backend
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Insert `entry` unless its ledger id is already present.
    ///
    /// Must fail with `DuplicateMapping` when the key exists; the check and
    /// the insert are one indivisible operation.
    async fn insert_unique(&self, entry: &MappingEntry) -> TraceResult<()>;

    /// Look up by ledger id
    async fn get_by_ledger_id(&self, ledger_id: &str) -> TraceResult<Option<MappingEntry>>;

    /// Look up by generated record id
    async fn get_by_record_id(&self, record_id: &str) -> TraceResult<Option<MappingEntry>>;

    /// All entries, in no particular order
    async fn list(&self) -> TraceResult<Vec<MappingEntry>>;

    /// Entry counts
    async fn stats(&self) -> TraceResult<MappingStats>;
}

/// Mapping index statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub total: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Entries without a verdict (no verification or `unset`)
    pub unset: u64,
}

impl MappingStats {
    /// Count a collection of entries
    pub fn tally<'a>(entries: impl IntoIterator<Item = &'a MappingEntry>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.total += 1;
            match entry.verification_status() {
                VerificationStatus::Accept => stats.accepted += 1,
                VerificationStatus::Reject => stats.rejected += 1,
                VerificationStatus::Unset => stats.unset += 1,
            }
        }
        stats
    }
}

/// Store selected at runtime from [`MappingConfig`]
pub enum MappingBackend {
    Memory(MemoryMappingStore),
    Sled(SledMappingStore),
}

impl MappingBackend {
    /// In-memory when `data_dir` is empty, sled otherwise
    pub fn from_config(config: &MappingConfig) -> TraceResult<Self> {
        if config.is_in_memory() {
            debug!("Using in-memory mapping store");
            Ok(Self::Memory(MemoryMappingStore::new()))
        } else {
            info!("Opening mapping store at {}", config.data_dir);
            Ok(Self::Sled(SledMappingStore::new(config)?))
        }
    }
}

#[async_trait]
impl MappingStore for MappingBackend {
    async fn insert_unique(&self, entry: &MappingEntry) -> TraceResult<()> {
        match self {
            Self::Memory(s) => s.insert_unique(entry).await,
            Self::Sled(s) => s.insert_unique(entry).await,
        }
    }

    async fn get_by_ledger_id(&self, ledger_id: &str) -> TraceResult<Option<MappingEntry>> {
        match self {
            Self::Memory(s) => s.get_by_ledger_id(ledger_id).await,
            Self::Sled(s) => s.get_by_ledger_id(ledger_id).await,
        }
    }

    async fn get_by_record_id(&self, record_id: &str) -> TraceResult<Option<MappingEntry>> {
        match self {
            Self::Memory(s) => s.get_by_record_id(record_id).await,
            Self::Sled(s) => s.get_by_record_id(record_id).await,
        }
    }

    async fn list(&self) -> TraceResult<Vec<MappingEntry>> {
        match self {
            Self::Memory(s) => s.list().await,
            Self::Sled(s) => s.list().await,
        }
    }

    async fn stats(&self) -> TraceResult<MappingStats> {
        match self {
            Self::Memory(s) => s.stats().await,
            Self::Sled(s) => s.stats().await,
        }
    }
}

fn require_ledger_id(ledger_id: &str) -> TraceResult<u64> {
    parse_ledger_id(ledger_id).ok_or_else(|| {
        TraceError::InvalidInput(format!(
            "ledger id must be a positive decimal integer, got {:?}",
            ledger_id
        ))
    })
}

/// Mapping index over a storage backend
pub struct MappingIndex<S: MappingStore> {
    store: Arc<S>,
}

impl<S: MappingStore> Clone for MappingIndex<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: MappingStore> MappingIndex<S> {
    /// Create a new index over `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create the single entry for `ledger_id`
    pub async fn create(
        &self,
        ledger_id: &str,
        receipt_ref: &str,
        code_url: &str,
        verification: Option<Verification>,
    ) -> TraceResult<MappingEntry> {
        require_ledger_id(ledger_id)?;

        let entry = MappingEntry {
            record_id: uuid::Uuid::new_v4().to_string(),
            ledger_id: ledger_id.to_string(),
            receipt_ref: receipt_ref.to_string(),
            code_url: code_url.to_string(),
            verification,
            created_at: Utc::now(),
        };

        match self.store.insert_unique(&entry).await {
            Ok(()) => {
                info!(
                    "Indexed ledger id {} as record {}",
                    entry.ledger_id, entry.record_id
                );
                Ok(entry)
            }
            Err(e) => {
                warn!("Failed to index ledger id {}: {}", ledger_id, e);
                Err(e)
            }
        }
    }

    /// Entry for `ledger_id`
    pub async fn get(&self, ledger_id: &str) -> TraceResult<MappingEntry> {
        require_ledger_id(ledger_id)?;
        self.store
            .get_by_ledger_id(ledger_id)
            .await?
            .ok_or_else(|| TraceError::NotFound(format!("mapping for ledger id {}", ledger_id)))
    }

    /// Entry for a generated record id
    pub async fn get_by_record(&self, record_id: &str) -> TraceResult<MappingEntry> {
        self.store
            .get_by_record_id(record_id)
            .await?
            .ok_or_else(|| TraceError::NotFound(format!("mapping record {}", record_id)))
    }

    /// Every entry, ascending by ledger id
    pub async fn list(&self) -> TraceResult<Vec<MappingEntry>> {
        let mut entries = self.store.list().await?;
        entries.sort_by_key(|e| parse_ledger_id(&e.ledger_id).unwrap_or(u64::MAX));
        Ok(entries)
    }

    pub async fn stats(&self) -> TraceResult<MappingStats> {
        self.store.stats().await
    }
}
