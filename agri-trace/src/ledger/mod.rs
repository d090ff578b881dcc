//! Ledger Client
//!
//! Typed accessor over the external append-only product ledger. The ledger
//! natively supports only four calls, mirrored by [`LedgerBackend`]:
//!
//! ```text
//! addProduct(name, basePrice, state, district, market) -> id
//! updatePrice(id, newPrice)                            -> extends priceTrail/handlers
//! getProduct(id)                                       -> record
//! productCount()                                       -> highest id
//! ```
//!
//! [`LedgerClient`] wraps a backend with an explicit open/close lifecycle
//! and client-side validation. It never caches: every read is a fresh
//! round-trip.

pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{TraceError, TraceResult};
use crate::types::{is_blank, AppendReceipt, LedgerRecord, NewProduct, ProductId};

pub use memory::MemoryLedger;
pub use rpc::RpcLedger;

/// Raw ledger operations
///
/// Implementations report `NotFound` for a missing id, `LedgerUnavailable`
/// for transport failures and `LedgerRejected` when the ledger refuses a
/// write.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Append a new product, attributed to `caller`
    async fn add_product(&self, caller: &str, product: &NewProduct) -> TraceResult<AppendReceipt>;

    /// Append one price point (and `caller` as its handler); returns the receipt ref
    async fn update_price(&self, caller: &str, id: ProductId, new_price: f64) -> TraceResult<String>;

    /// Read one product
    async fn get_product(&self, id: ProductId) -> TraceResult<LedgerRecord>;

    /// Highest assigned id (0 when empty)
    async fn product_count(&self) -> TraceResult<u64>;
}

/// Reject prices the ledger cannot store.
pub fn validate_price(field: &str, value: f64) -> TraceResult<()> {
    if !value.is_finite() {
        return Err(TraceError::InvalidInput(format!(
            "{} must be a finite number, got {}",
            field, value
        )));
    }
    if value < 0.0 {
        return Err(TraceError::InvalidInput(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }
    Ok(())
}

fn validate_text(field: &str, value: &str) -> TraceResult<()> {
    if is_blank(value) {
        return Err(TraceError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Ledger client
pub struct LedgerClient<B: LedgerBackend> {
    /// Backend transport
    backend: Arc<B>,
    /// Identity the client transacts as
    account: String,
    /// Lifecycle flag
    open: AtomicBool,
    /// Highest id this client has seen returned from an append
    last_appended: AtomicU64,
}

impl<B: LedgerBackend> LedgerClient<B> {
    /// Open a client over `backend`, probing the ledger first
    pub async fn open(backend: Arc<B>, account: impl Into<String>) -> TraceResult<Self> {
        let account = account.into();
        let count = backend.product_count().await.map_err(|e| match e {
            TraceError::LedgerUnavailable(msg) => {
                TraceError::LedgerUnavailable(format!("Failed to reach ledger: {}", msg))
            }
            other => other,
        })?;

        info!("Ledger client opened as {} ({} products)", account, count);

        Ok(Self {
            backend,
            account,
            open: AtomicBool::new(true),
            last_appended: AtomicU64::new(0),
        })
    }

    /// Close the client; later calls fail with `LedgerUnavailable`
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("Ledger client closed");
        }
    }

    /// Whether `close` has not been called yet
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Account identity used for appends and price updates
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Underlying backend
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn ensure_open(&self) -> TraceResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TraceError::LedgerUnavailable("ledger client is closed".to_string()))
        }
    }

    /// Append a new product record
    pub async fn append(&self, product: &NewProduct) -> TraceResult<AppendReceipt> {
        validate_text("name", &product.name)?;
        validate_text("state", &product.region.state)?;
        validate_text("district", &product.region.district)?;
        validate_text("market", &product.region.market)?;
        validate_price("base price", product.base_price)?;
        self.ensure_open()?;

        let receipt = self.backend.add_product(&self.account, product).await?;

        let previous = self.last_appended.fetch_max(receipt.id, Ordering::SeqCst);
        if receipt.id <= previous {
            warn!(
                "Ledger returned non-increasing id {} (previous append was {})",
                receipt.id, previous
            );
        }

        info!(
            "Appended product {} '{}' receipt={}",
            receipt.id, product.name, receipt.receipt_ref
        );
        Ok(receipt)
    }

    /// Append a price point to an existing product
    pub async fn update_price(&self, id: ProductId, new_price: f64) -> TraceResult<String> {
        validate_price("new price", new_price)?;
        if id == 0 {
            return Err(TraceError::NotFound(format!("product {}", id)));
        }
        self.ensure_open()?;

        let receipt_ref = self.backend.update_price(&self.account, id, new_price).await?;
        info!("Updated price of product {} to {} receipt={}", id, new_price, receipt_ref);
        Ok(receipt_ref)
    }

    /// Read one product
    pub async fn get(&self, id: ProductId) -> TraceResult<LedgerRecord> {
        if id == 0 {
            return Err(TraceError::NotFound("product 0".to_string()));
        }
        self.ensure_open()?;

        let record = self.backend.get_product(id).await?;
        if record.id != id {
            return Err(TraceError::Serialization(format!(
                "ledger answered id {} for request {}",
                record.id, id
            )));
        }
        if !record.is_aligned() {
            return Err(TraceError::Serialization(format!(
                "product {} has {} prices but {} handlers",
                id,
                record.price_trail.len(),
                record.handlers.len()
            )));
        }
        debug!("Read product {}", id);
        Ok(record)
    }

    /// Highest assigned id (0 when empty)
    pub async fn count(&self) -> TraceResult<u64> {
        self.ensure_open()?;
        self.backend.product_count().await
    }
}
