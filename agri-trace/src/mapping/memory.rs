//! In-memory mapping store
//!
//! Both maps live behind one lock, so the uniqueness check and the insert
//! happen under a single write guard.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{MappingStats, MappingStore};
use crate::error::{TraceError, TraceResult};
use crate::types::{MappingEntry, RecordId};

#[derive(Debug, Default)]
struct Maps {
    /// ledger id -> entry
    entries: HashMap<String, MappingEntry>,
    /// record id -> ledger id
    by_record: HashMap<RecordId, String>,
}

/// In-memory mapping store
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    maps: RwLock<Maps>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.maps.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn insert_unique(&self, entry: &MappingEntry) -> TraceResult<()> {
        let mut maps = self.maps.write().await;
        if maps.entries.contains_key(&entry.ledger_id) {
            return Err(TraceError::DuplicateMapping(entry.ledger_id.clone()));
        }
        maps.by_record
            .insert(entry.record_id.clone(), entry.ledger_id.clone());
        maps.entries.insert(entry.ledger_id.clone(), entry.clone());
        Ok(())
    }

    async fn get_by_ledger_id(&self, ledger_id: &str) -> TraceResult<Option<MappingEntry>> {
        Ok(self.maps.read().await.entries.get(ledger_id).cloned())
    }

    async fn get_by_record_id(&self, record_id: &str) -> TraceResult<Option<MappingEntry>> {
        let maps = self.maps.read().await;
        Ok(maps
            .by_record
            .get(record_id)
            .and_then(|ledger_id| maps.entries.get(ledger_id))
            .cloned())
    }

    async fn list(&self) -> TraceResult<Vec<MappingEntry>> {
        Ok(self.maps.read().await.entries.values().cloned().collect())
    }

    async fn stats(&self) -> TraceResult<MappingStats> {
        Ok(MappingStats::tally(self.maps.read().await.entries.values()))
    }
}
