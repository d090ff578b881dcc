//! In-memory ledger backend
//!
//! Sequential, append-only product ledger held in memory, mainly for tests
//! and development. Ids start at 1. Individual ids can be marked unreadable
//! and the whole ledger can be taken offline to exercise failure paths.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::LedgerBackend;
use crate::error::{TraceError, TraceResult};
use crate::types::{AppendReceipt, LedgerRecord, NewProduct, ProductId};

/// In-memory ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    /// Records, index = id - 1
    records: RwLock<Vec<LedgerRecord>>,
    /// Ids whose reads fail with a transient error
    unreadable: RwLock<HashSet<ProductId>>,
    /// Every call fails with `LedgerUnavailable` while set
    offline: AtomicBool,
    /// Transaction counter mixed into receipt refs
    nonce: AtomicU64,
    append_calls: AtomicU64,
    update_calls: AtomicU64,
    read_calls: AtomicU64,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reads of `id` fail as if the ledger could not produce the record
    pub async fn mark_unreadable(&self, id: ProductId) {
        self.unreadable.write().await.insert(id);
    }

    /// Make `id` readable again
    pub async fn mark_readable(&self, id: ProductId) {
        self.unreadable.write().await.remove(&id);
    }

    /// Toggle outage mode
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `add_product` calls received (including refused ones)
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_price` calls received
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_product` calls received
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record
    pub async fn records(&self) -> Vec<LedgerRecord> {
        self.records.read().await.clone()
    }

    fn check_online(&self) -> TraceResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TraceError::LedgerUnavailable("memory ledger is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn receipt_ref(&self, parts: &[&str]) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(nonce.to_be_bytes());
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

fn refuse_price(value: f64) -> TraceResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TraceError::LedgerRejected(format!("invalid price {}", value)));
    }
    Ok(())
}

#[async_trait]
impl LedgerBackend for MemoryLedger {
    async fn add_product(&self, caller: &str, product: &NewProduct) -> TraceResult<AppendReceipt> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        refuse_price(product.base_price)?;

        let mut records = self.records.write().await;
        let id = records.len() as ProductId + 1;
        records.push(LedgerRecord {
            id,
            name: product.name.clone(),
            base_price: product.base_price,
            region: product.region.clone(),
            originator: caller.to_string(),
            price_trail: Vec::new(),
            handlers: Vec::new(),
        });

        let receipt_ref = self.receipt_ref(&[
            "addProduct",
            caller,
            &id.to_string(),
            &product.name,
            &product.base_price.to_string(),
        ]);
        Ok(AppendReceipt { id, receipt_ref })
    }

    async fn update_price(&self, caller: &str, id: ProductId, new_price: f64) -> TraceResult<String> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        refuse_price(new_price)?;

        let mut records = self.records.write().await;
        let index = (id as usize)
            .checked_sub(1)
            .ok_or_else(|| TraceError::NotFound(format!("product {}", id)))?;
        let record = records
            .get_mut(index)
            .ok_or_else(|| TraceError::NotFound(format!("product {}", id)))?;

        record.price_trail.push(new_price);
        record.handlers.push(caller.to_string());

        Ok(self.receipt_ref(&["updatePrice", caller, &id.to_string(), &new_price.to_string()]))
    }

    async fn get_product(&self, id: ProductId) -> TraceResult<LedgerRecord> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        if self.unreadable.read().await.contains(&id) {
            return Err(TraceError::LedgerUnavailable(format!(
                "product {} could not be read",
                id
            )));
        }

        let records = self.records.read().await;
        (id as usize)
            .checked_sub(1)
            .and_then(|index| records.get(index))
            .cloned()
            .ok_or_else(|| TraceError::NotFound(format!("product {}", id)))
    }

    async fn product_count(&self) -> TraceResult<u64> {
        self.check_online()?;
        Ok(self.records.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Region;

    fn rice() -> NewProduct {
        NewProduct::new("Rice", 2100.0, Region::new("Punjab", "Ludhiana", "Khanna"))
    }

    #[tokio::test]
    async fn test_sequential_ids_from_one() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.product_count().await.unwrap(), 0);

        let a = ledger.add_product("0xa", &rice()).await.unwrap();
        let b = ledger.add_product("0xa", &rice()).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.receipt_ref.starts_with("0x"));
        assert_eq!(a.receipt_ref.len(), 66);
        assert_eq!(ledger.product_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_ids() {
        let ledger = MemoryLedger::new();
        ledger.add_product("0xa", &rice()).await.unwrap();
        ledger.mark_unreadable(1).await;

        assert!(matches!(
            ledger.get_product(1).await,
            Err(TraceError::LedgerUnavailable(_))
        ));

        ledger.mark_readable(1).await;
        assert!(ledger.get_product(1).await.is_ok());
        assert_eq!(ledger.read_calls(), 2);
    }

    #[tokio::test]
    async fn test_ledger_refuses_negative_price() {
        let ledger = MemoryLedger::new();
        let mut product = rice();
        product.base_price = -1.0;
        assert!(matches!(
            ledger.add_product("0xa", &product).await,
            Err(TraceError::LedgerRejected(_))
        ));
        assert_eq!(ledger.product_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_mode() {
        let ledger = MemoryLedger::new();
        ledger.set_offline(true);
        assert!(matches!(
            ledger.add_product("0xa", &rice()).await,
            Err(TraceError::LedgerUnavailable(_))
        ));
        assert_eq!(ledger.append_calls(), 1);
        ledger.set_offline(false);
        assert!(ledger.add_product("0xa", &rice()).await.is_ok());
    }
}
