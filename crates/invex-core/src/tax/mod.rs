//! Tax categories and their rates.

mod totals;

pub use totals::{round_money, ItemTax, Totals, TotalsCalculator};

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{InvexError, Result};
use crate::models::config::RateUnit;

/// Read-only mapping from category name to tax rate (as a fraction).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxTable {
    rates: BTreeMap<String, Decimal>,
}

#[derive(Deserialize)]
struct RateValue(#[serde(with = "rust_decimal::serde::arbitrary_precision")] Decimal);

impl TaxTable {
    /// Create an empty table; every category is taxed at 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a table from fractional rates, rejecting rates outside 0..=1.
    pub fn from_rates(rates: impl IntoIterator<Item = (String, Decimal)>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (category, rate) in rates {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(InvexError::Config(format!(
                    "tax rate for '{}' must be between 0 and 1, got {}",
                    category, rate
                )));
            }
            table.insert(category, rate);
        }
        Ok(Self { rates: table })
    }

    /// Parse a JSON object of `category -> rate`.
    pub fn from_json(content: &str, unit: RateUnit) -> Result<Self> {
        let raw: BTreeMap<String, RateValue> = serde_json::from_str(content)
            .map_err(|e| InvexError::Config(format!("invalid tax rate file: {}", e)))?;

        let divisor = match unit {
            RateUnit::Fraction => Decimal::ONE,
            RateUnit::Percent => Decimal::ONE_HUNDRED,
        };

        Self::from_rates(raw.into_iter().map(|(category, rate)| (category, rate.0 / divisor)))
    }

    /// Load the table from a JSON file.
    pub fn from_file(path: &Path, unit: RateUnit) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_json(&content, unit)?;
        debug!("Loaded {} tax categories from {}", table.len(), path.display());
        Ok(table)
    }

    /// Load the table, treating a missing file as an empty table.
    pub fn from_file_or_empty(path: &Path, unit: RateUnit) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Tax rate file {} not found, all categories will be taxed at 0",
                path.display()
            );
            return Ok(Self::empty());
        }
        Self::from_file(path, unit)
    }

    /// Rate for `category`; unknown categories are taxed at 0.
    pub fn rate(&self, category: &str) -> Decimal {
        self.rates.get(category).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.rates.contains_key(category)
    }

    /// Known category names, sorted.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_unknown_category_rate_is_zero() {
        let table = TaxTable::from_json(r#"{"food": 0.05}"#, RateUnit::Fraction).unwrap();
        assert_eq!(table.rate("food"), Decimal::from_str("0.05").unwrap());
        assert_eq!(table.rate("unknown"), Decimal::ZERO);
        assert!(!table.contains("unknown"));
    }

    #[test]
    fn test_percent_rates_are_scaled() {
        let table =
            TaxTable::from_json(r#"{"alcohol": 12.5, "books": 0}"#, RateUnit::Percent).unwrap();
        assert_eq!(table.rate("alcohol"), Decimal::from_str("0.125").unwrap());
        assert_eq!(table.rate("books"), Decimal::ZERO);
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        let err = TaxTable::from_json(r#"{"food": 8}"#, RateUnit::Fraction).unwrap_err();
        assert!(matches!(err, InvexError::Config(_)));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let err = TaxTable::from_json(r#"{"food": "cheap"}"#, RateUnit::Fraction).unwrap_err();
        assert!(matches!(err, InvexError::Config(_)));
    }

    #[test]
    fn test_categories_sorted() {
        let table = TaxTable::from_json(
            r#"{"tools": 0.07, "food": 0.05, "electronics": 0.1}"#,
            RateUnit::Fraction,
        )
        .unwrap();
        let categories: Vec<&str> = table.categories().collect();
        assert_eq!(categories, vec!["electronics", "food", "tools"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let table =
            TaxTable::from_file_or_empty(Path::new("/nonexistent/tax.json"), RateUnit::Fraction)
                .unwrap();
        assert!(table.is_empty());
    }
}
