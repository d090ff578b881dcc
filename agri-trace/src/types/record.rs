//! Ledger Record
//!
//! Typed view of a product stored on the append-only ledger. Records are
//! immutable once appended except for the tail of their price trail.

use serde::{Deserialize, Serialize};

use super::common::{FieldKey, Identity, ProductId};

/// Where a commodity is sold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub state: String,
    pub district: String,
    pub market: String,
}

impl Region {
    pub fn new(state: impl Into<String>, district: impl Into<String>, market: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            district: district.into(),
            market: market.into(),
        }
    }
}

/// Fields supplied when appending a new product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    /// Commodity / crop label
    pub name: String,
    /// Base price set by the producer
    pub base_price: f64,
    /// Selling region
    pub region: Region,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, base_price: f64, region: Region) -> Self {
        Self {
            name: name.into(),
            base_price,
            region,
        }
    }
}

/// A product as read back from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Ledger-assigned id
    pub id: ProductId,
    /// Commodity / crop label
    pub name: String,
    /// Base price set by the producer
    pub base_price: f64,
    /// Selling region
    pub region: Region,
    /// Account that created the record
    pub originator: Identity,
    /// Price amendments, oldest first
    pub price_trail: Vec<f64>,
    /// `handlers[i]` submitted `price_trail[i]`
    pub handlers: Vec<Identity>,
}

impl LedgerRecord {
    /// Price trail and handler list have the same length
    pub fn is_aligned(&self) -> bool {
        self.price_trail.len() == self.handlers.len()
    }

    /// Latest amended price, or the base price if never amended
    pub fn current_price(&self) -> f64 {
        self.price_trail.last().copied().unwrap_or(self.base_price)
    }

    /// Price history as `(price, handler)` pairs
    pub fn price_history(&self) -> impl Iterator<Item = (f64, &str)> + '_ {
        self.price_trail
            .iter()
            .copied()
            .zip(self.handlers.iter().map(String::as_str))
    }

    /// Normalised descriptive key of this record
    pub fn field_key(&self) -> FieldKey {
        FieldKey::new(
            &self.name,
            &self.region.state,
            &self.region.district,
            &self.region.market,
        )
    }
}

/// Proof that an append reached the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// Id assigned to the new record
    pub id: ProductId,
    /// Opaque reference to the ledger transaction
    pub receipt_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LedgerRecord {
        LedgerRecord {
            id: 1,
            name: "Wheat".to_string(),
            base_price: 1500.0,
            region: Region::new("Karnataka", "Bangalore", "Ramanagara"),
            originator: "0xfarmer".to_string(),
            price_trail: vec![],
            handlers: vec![],
        }
    }

    #[test]
    fn test_current_price_falls_back_to_base() {
        let mut record = sample();
        assert_eq!(record.current_price(), 1500.0);

        record.price_trail.push(1600.0);
        record.handlers.push("0xvendor".to_string());
        assert_eq!(record.current_price(), 1600.0);
        assert!(record.is_aligned());

        let history: Vec<_> = record.price_history().collect();
        assert_eq!(history, vec![(1600.0, "0xvendor")]);
    }

    #[test]
    fn test_field_key_is_normalised() {
        let key = sample().field_key();
        assert_eq!(key, FieldKey::new("wheat", "karnataka", "bangalore", "ramanagara"));
    }
}
