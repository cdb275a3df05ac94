//! Tax-aware invoice totals.

use rust_decimal::{Decimal, RoundingStrategy};

use super::TaxTable;
use crate::error::ValidationError;
use crate::models::invoice::LineItem;

/// Round a monetary amount to 2 decimal places, half away from zero.
///
/// The result always carries a scale of 2 so it serializes as e.g. `35.00`.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Tax computed for a single line item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemTax {
    /// Rate applied (0 for unknown categories).
    pub rate: Decimal,
    /// Unrounded tax amount.
    pub tax: Decimal,
    /// Unrounded line total including tax.
    pub total_with_tax: Decimal,
}

impl ItemTax {
    /// Rate as a percentage, e.g. `8` for 0.08.
    pub fn rate_percent(&self) -> Decimal {
        (self.rate * Decimal::ONE_HUNDRED).normalize()
    }

    pub fn tax_rounded(&self) -> Decimal {
        round_money(self.tax)
    }

    pub fn total_with_tax_rounded(&self) -> Decimal {
        round_money(self.total_with_tax)
    }
}

/// Unrounded totals for a set of line items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub pre_tax: Decimal,
    pub tax: Decimal,
    pub post_tax: Decimal,
    /// Per-item tax, in line item order.
    pub items: Vec<ItemTax>,
}

impl Totals {
    pub fn pre_tax_rounded(&self) -> Decimal {
        round_money(self.pre_tax)
    }

    pub fn tax_rounded(&self) -> Decimal {
        round_money(self.tax)
    }

    pub fn post_tax_rounded(&self) -> Decimal {
        round_money(self.post_tax)
    }
}

/// Computes totals against a tax table.
pub struct TotalsCalculator<'a> {
    table: &'a TaxTable,
}

impl<'a> TotalsCalculator<'a> {
    pub fn new(table: &'a TaxTable) -> Self {
        Self { table }
    }

    /// Tax for one line item at `index`.
    pub fn item_tax(&self, index: usize, item: &LineItem) -> Result<ItemTax, ValidationError> {
        let rate = self.table.rate(&item.category);
        let tax = item
            .total_price
            .checked_mul(rate)
            .ok_or_else(|| overflow(index, "total_price", "tax"))?;
        let total_with_tax = item
            .total_price
            .checked_add(tax)
            .ok_or_else(|| overflow(index, "total_price", "line total with tax"))?;
        Ok(ItemTax {
            rate,
            tax,
            total_with_tax,
        })
    }

    /// Sum line totals and taxes. Nothing is rounded here.
    ///
    /// Fails when an amount is too large for the running totals.
    pub fn compute(&self, items: &[LineItem]) -> Result<Totals, ValidationError> {
        let mut totals = Totals {
            items: Vec::with_capacity(items.len()),
            ..Totals::default()
        };

        for (index, item) in items.iter().enumerate() {
            let item_tax = self.item_tax(index, item)?;
            totals.pre_tax = totals
                .pre_tax
                .checked_add(item.total_price)
                .ok_or_else(|| overflow(index, "total_price", "pre-tax total"))?;
            totals.tax = totals
                .tax
                .checked_add(item_tax.tax)
                .ok_or_else(|| overflow(index, "total_price", "tax total"))?;
            totals.items.push(item_tax);
        }

        totals.post_tax = totals
            .pre_tax
            .checked_add(totals.tax)
            .ok_or_else(|| overflow(items.len().saturating_sub(1), "total_price", "post-tax total"))?;
        Ok(totals)
    }
}

fn overflow(index: usize, field: &'static str, what: &str) -> ValidationError {
    ValidationError {
        index,
        field,
        reason: format!("is too large: {} overflows", what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(total: &str, category: &str) -> LineItem {
        LineItem {
            description: String::new(),
            quantity: Decimal::ONE,
            unit_price: dec(total),
            total_price: dec(total),
            category: category.to_string(),
        }
    }

    fn table() -> TaxTable {
        TaxTable::from_rates([
            ("food".to_string(), dec("0.05")),
            ("electronics".to_string(), dec("0.10")),
        ])
        .unwrap()
    }

    #[test]
    fn test_mixed_categories() {
        let table = table();
        let items = vec![
            item("10.00", "food"),
            item("20.00", "electronics"),
            item("5.00", "unknown"),
        ];
        let totals = TotalsCalculator::new(&table).compute(&items).unwrap();

        assert_eq!(totals.pre_tax_rounded(), dec("35.00"));
        assert_eq!(totals.tax_rounded(), dec("2.50"));
        assert_eq!(totals.post_tax_rounded(), dec("37.50"));
        assert_eq!(totals.items[2].tax, Decimal::ZERO);
        assert_eq!(totals.items[1].total_with_tax, dec("22.00"));
    }

    #[test]
    fn test_unknown_categories_contribute_no_tax() {
        let table = table();
        let items = vec![item("12.34", "mystery"), item("0.99", ""), item("100", "uncategorized")];
        let totals = TotalsCalculator::new(&table).compute(&items).unwrap();

        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.pre_tax, totals.post_tax);
    }

    #[test]
    fn test_pre_tax_equals_sum_of_line_totals() {
        let table = table();
        let items: Vec<LineItem> = (1..=40)
            .map(|i| item(&format!("{}.{:02}", i * 3, (i * 7) % 100), if i % 2 == 0 { "food" } else { "electronics" }))
            .collect();
        let expected: Decimal = items.iter().map(|i| i.total_price).sum();
        let totals = TotalsCalculator::new(&table).compute(&items).unwrap();

        assert!((totals.pre_tax_rounded() - expected).abs() <= dec("0.01"));
        assert!((totals.pre_tax_rounded() + totals.tax_rounded() - totals.post_tax_rounded()).abs() <= dec("0.01"));
    }

    #[test]
    fn test_rounding_happens_once() {
        // Three items each taxed 0.333; rounding per item would give 0.99.
        let table = TaxTable::from_rates([("svc".to_string(), dec("0.0333"))]).unwrap();
        let items = vec![item("10.00", "svc"), item("10.00", "svc"), item("10.00", "svc")];
        let totals = TotalsCalculator::new(&table).compute(&items).unwrap();

        assert_eq!(totals.tax, dec("0.999"));
        assert_eq!(totals.tax_rounded(), dec("1.00"));
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(dec("0.005")).to_string(), "0.01");
        assert_eq!(round_money(dec("35")).to_string(), "35.00");
        assert_eq!(round_money(dec("2.5000")).to_string(), "2.50");
    }

    #[test]
    fn test_empty_invoice() {
        let table = table();
        let totals = TotalsCalculator::new(&table).compute(&[]).unwrap();
        assert_eq!(totals.post_tax_rounded().to_string(), "0.00");
    }

    #[test]
    fn test_overflowing_totals_are_rejected() {
        let table = table();
        let huge = Decimal::from_str("50000000000000000000000000000").unwrap();
        let items = vec![
            LineItem {
                total_price: huge,
                unit_price: huge,
                ..item("0", "unknown")
            },
            LineItem {
                total_price: huge,
                unit_price: huge,
                ..item("0", "unknown")
            },
        ];

        let err = TotalsCalculator::new(&table).compute(&items).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.field, "total_price");
    }

    #[test]
    fn test_line_total_with_tax_overflow_is_rejected() {
        let table = table();
        let items = vec![LineItem {
            total_price: Decimal::MAX,
            unit_price: Decimal::MAX,
            ..item("0", "food")
        }];

        let err = TotalsCalculator::new(&table).compute(&items).unwrap_err();
        assert_eq!(err.index, 0);
    }
}
