//! Shared primitives: identifiers and free-text field normalisation.

use icu_collator::{Collator, CollatorOptions};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ledger-assigned product id (1-based, sequential, never reused)
pub type ProductId = u64;

/// Opaque identifier generated by the mapping index for each entry
pub type RecordId = String;

/// Identity of a ledger account (originator or handler)
pub type Identity = String;

/// Canonical form of a free-text field: trimmed and lowercased.
pub fn normalize_field(value: &str) -> String {
    value.trim().to_lowercase()
}

/// True when the value is empty after trimming.
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

thread_local! {
    /// Root-locale Unicode collator
    static COLLATOR: Option<Collator> =
        Collator::try_new(&Default::default(), CollatorOptions::new()).ok();
}

/// Display ordering for filter lists.
///
/// Unicode collation, so "Éclair" sorts between "apple" and "Zucchini" and
/// case only decides between otherwise equal values. Ties fall back to the
/// raw strings to keep the order total.
pub fn collate(a: &str, b: &str) -> Ordering {
    COLLATOR
        .with(|collator| match collator {
            Some(collator) => collator.compare(a, b),
            None => normalize_field(a).cmp(&normalize_field(b)),
        })
        .then_with(|| a.cmp(b))
}

/// The four descriptive fields used to locate a product, normalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    pub commodity: String,
    pub state: String,
    pub district: String,
    pub market: String,
}

impl FieldKey {
    pub fn new(commodity: &str, state: &str, district: &str, market: &str) -> Self {
        Self {
            commodity: normalize_field(commodity),
            state: normalize_field(state),
            district: normalize_field(district),
            market: normalize_field(market),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.commodity, self.state, self.district, self.market
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_field() {
        assert_eq!(normalize_field("  Karnataka "), "karnataka");
        assert_eq!(normalize_field("\tWHEAT\n"), "wheat");
        assert!(is_blank("   "));
        assert!(!is_blank(" x "));
    }

    #[test]
    fn test_collate_orders_case_insensitively() {
        let mut values = vec!["banana", "Apple", "apple", "Cherry"];
        values.sort_by(|a, b| collate(a, b));
        assert_eq!(values, vec!["apple", "Apple", "banana", "Cherry"]);
    }

    #[test]
    fn test_collate_places_accented_letters_with_base_letter() {
        let mut values = vec!["Zucchini", "Éclair", "apple", "eggplant", "Ölkürbis", "okra"];
        values.sort_by(|a, b| collate(a, b));
        assert_eq!(
            values,
            vec!["apple", "Éclair", "eggplant", "okra", "Ölkürbis", "Zucchini"]
        );
    }

    #[test]
    fn test_field_key_equality() {
        let a = FieldKey::new("wheat", " Karnataka", "bangalore", "Ramanagara");
        let b = FieldKey::new("Wheat", "Karnataka", "Bangalore ", "ramanagara");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "wheat/karnataka/bangalore/ramanagara");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[A-Za-zÀ-ÖØ-öø-ÿ ]{0,24}") {
            let once = normalize_field(&s);
            prop_assert_eq!(normalize_field(&once), once.clone());
        }

        #[test]
        fn padding_does_not_change_key(s in "[A-Za-z]{1,12}", pad in "[ \t]{0,4}") {
            let padded = format!("{pad}{s}{pad}");
            prop_assert_eq!(normalize_field(&padded), normalize_field(&s));
        }
    }
}
