//! Sled mapping store
//!
//! Durable mapping index on the sled embedded database. Entries are stored
//! as JSON in `entries` keyed by ledger id; `by_record` maps record ids back
//! to ledger ids. Inserts run as one transaction over both trees.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
};
use std::path::Path;
use tracing::debug;

use super::{MappingStats, MappingStore};
use crate::config::MappingConfig;
use crate::error::{TraceError, TraceResult};
use crate::types::MappingEntry;

/// Tree names
const ENTRIES_TREE: &str = "entries";
const BY_RECORD_TREE: &str = "by_record";

/// Sled-backed mapping store
#[derive(Debug, Clone)]
pub struct SledMappingStore {
    db: sled::Db,
    entries: sled::Tree,
    by_record: sled::Tree,
    flush_on_write: bool,
}

impl SledMappingStore {
    /// Open the store described by `config`
    pub fn new(config: &MappingConfig) -> TraceResult<Self> {
        let mut store = Self::open(&config.data_dir)?;
        store.flush_on_write = config.flush_on_write;
        Ok(store)
    }

    /// Open or create a store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> TraceResult<Self> {
        let db = sled::open(path)
            .map_err(|e| TraceError::Storage(format!("Failed to open sled db: {}", e)))?;
        let entries = db
            .open_tree(ENTRIES_TREE)
            .map_err(|e| TraceError::Storage(format!("Failed to open entries tree: {}", e)))?;
        let by_record = db
            .open_tree(BY_RECORD_TREE)
            .map_err(|e| TraceError::Storage(format!("Failed to open by_record tree: {}", e)))?;

        Ok(Self {
            db,
            entries,
            by_record,
            flush_on_write: false,
        })
    }

    /// Flush to disk
    pub fn flush(&self) -> TraceResult<()> {
        self.db
            .flush()
            .map_err(|e| TraceError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    fn serialize<T: Serialize>(value: &T) -> TraceResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| TraceError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> TraceResult<T> {
        serde_json::from_slice(bytes).map_err(|e| TraceError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl MappingStore for SledMappingStore {
    async fn insert_unique(&self, entry: &MappingEntry) -> TraceResult<()> {
        let key = entry.ledger_id.as_bytes();
        let record_key = entry.record_id.as_bytes();
        let value = Self::serialize(entry)?;

        let result = (&self.entries, &self.by_record).transaction(
            |(entries, by_record)| -> ConflictableTransactionResult<(), ()> {
                if entries.get(key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(()));
                }
                entries.insert(key, value.as_slice())?;
                by_record.insert(record_key, key)?;
                Ok(())
            },
        );

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(())) => {
                return Err(TraceError::DuplicateMapping(entry.ledger_id.clone()));
            }
            Err(TransactionError::Storage(e)) => {
                return Err(TraceError::Storage(format!("Failed to insert mapping: {}", e)));
            }
        }

        if self.flush_on_write {
            self.flush()?;
        }
        debug!("Stored mapping {} -> {}", entry.ledger_id, entry.record_id);
        Ok(())
    }

    async fn get_by_ledger_id(&self, ledger_id: &str) -> TraceResult<Option<MappingEntry>> {
        match self.entries.get(ledger_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_by_record_id(&self, record_id: &str) -> TraceResult<Option<MappingEntry>> {
        let ledger_id = match self.by_record.get(record_id.as_bytes())? {
            Some(ledger_id) => ledger_id,
            None => return Ok(None),
        };
        match self.entries.get(&ledger_id)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> TraceResult<Vec<MappingEntry>> {
        let mut result = Vec::new();
        for item in self.entries.iter() {
            let (_, value) = item?;
            result.push(Self::deserialize(&value)?);
        }
        Ok(result)
    }

    async fn stats(&self) -> TraceResult<MappingStats> {
        let entries = self.list().await?;
        Ok(MappingStats::tally(&entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Verification, VerificationStatus};
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn entry(ledger_id: &str, record_id: &str) -> MappingEntry {
        MappingEntry {
            record_id: record_id.to_string(),
            ledger_id: ledger_id.to_string(),
            receipt_ref: format!("0x{:0>64}", ledger_id),
            code_url: format!("http://localhost:5173/product/{}", ledger_id),
            verification: Some(Verification {
                status: VerificationStatus::Accept,
                reason: "ok".to_string(),
                market_modal_price: 1000.0,
            }),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sled_insert_and_lookup() {
        let dir = tempdir().unwrap();
        let store = SledMappingStore::open(dir.path()).unwrap();

        store.insert_unique(&entry("1", "r1")).await.unwrap();
        let by_id = store.get_by_ledger_id("1").await.unwrap().unwrap();
        let by_record = store.get_by_record_id("r1").await.unwrap().unwrap();
        assert_eq!(by_id, by_record);
        assert_eq!(by_id.verification_status(), VerificationStatus::Accept);
        assert!(store.get_by_ledger_id("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_duplicate_aborts_transaction() {
        let dir = tempdir().unwrap();
        let store = SledMappingStore::open(dir.path()).unwrap();

        store.insert_unique(&entry("5", "r1")).await.unwrap();
        let err = store.insert_unique(&entry("5", "r2")).await.unwrap_err();
        assert!(matches!(err, TraceError::DuplicateMapping(_)));
        assert!(store.get_by_record_id("r2").await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_sled_persistence() {
        let dir = tempdir().unwrap();

        {
            let store = SledMappingStore::open(dir.path()).unwrap();
            store.insert_unique(&entry("9", "r9")).await.unwrap();
            store.flush().unwrap();
        }

        {
            let store = SledMappingStore::open(dir.path()).unwrap();
            assert_eq!(store.list().await.unwrap().len(), 1);
            assert!(matches!(
                store.insert_unique(&entry("9", "other")).await,
                Err(TraceError::DuplicateMapping(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_sled_concurrent_inserts_one_winner() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SledMappingStore::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_unique(&entry("3", &format!("r{}", i))).await
            }));
        }

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
        assert_eq!(store.stats().await.unwrap().total, 1);
    }
}
