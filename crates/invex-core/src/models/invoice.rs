//! Invoice records as produced by the pipeline and persisted by the store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::tax::{round_money, TaxTable, Totals, TotalsCalculator};

/// Category assigned to line items the vocabulary does not know.
pub const UNCATEGORIZED: &str = "uncategorized";

/// A single billable entry on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product/service description.
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub description: String,

    /// Quantity (positive).
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub quantity: Decimal,

    /// Unit price (non-negative).
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub unit_price: Decimal,

    /// Line total (non-negative), expected to be close to quantity * unit price.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_price: Decimal,

    /// Tax category key.
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub category: String,
}

impl LineItem {
    /// Difference between the stated line total and quantity * unit price,
    /// or `None` if the product is out of range.
    pub fn total_mismatch(&self) -> Option<Decimal> {
        let expected = self.quantity.checked_mul(self.unit_price)?;
        self.total_price.checked_sub(expected).map(|d| d.abs())
    }
}

/// Token counters reported by the structured-extraction oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Parsed invoice before totals are computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftInvoice {
    /// Invoice number as reported by the oracle, empty if absent.
    pub invoice_id: String,
    /// Line items in document order.
    pub line_items: Vec<LineItem>,
    /// Free-form remarks found on the invoice.
    pub special_notes: Vec<String>,
    /// Oracle token usage for this document.
    pub usage: TokenUsage,
}

/// One processed document with derived totals.
///
/// Totals are only set by [`InvoiceRecord::new`], which computes them from the
/// line items and the tax table; the record is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(rename = "invoiceID", default, deserialize_with = "super::null_as_default")]
    invoice_id: String,

    #[serde(rename = "Filename")]
    filename: String,

    #[serde(rename = "AIPromptTokens", default, deserialize_with = "super::null_as_default")]
    prompt_tokens: u64,

    #[serde(rename = "AICompletionTokens", default, deserialize_with = "super::null_as_default")]
    completion_tokens: u64,

    #[serde(rename = "ProcessingDateTime")]
    processed_at: DateTime<Utc>,

    #[serde(rename = "PreTaxTotal", with = "rust_decimal::serde::arbitrary_precision")]
    pre_tax_total: Decimal,

    #[serde(rename = "TaxTotal", with = "rust_decimal::serde::arbitrary_precision")]
    tax_total: Decimal,

    #[serde(rename = "PostTaxTotal", with = "rust_decimal::serde::arbitrary_precision")]
    post_tax_total: Decimal,

    #[serde(rename = "LineItems", default)]
    line_items: Vec<LineItem>,

    #[serde(rename = "SpecialNotes", default, deserialize_with = "super::null_as_default")]
    special_notes: Vec<String>,
}

impl InvoiceRecord {
    /// Build a record from a parsed draft, computing totals against `tax_table`.
    pub fn new(
        draft: DraftInvoice,
        filename: impl Into<String>,
        tax_table: &TaxTable,
        processed_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let totals = TotalsCalculator::new(tax_table).compute(&draft.line_items)?;
        Ok(Self::with_totals(draft, filename.into(), &totals, processed_at))
    }

    fn with_totals(
        draft: DraftInvoice,
        filename: String,
        totals: &Totals,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            invoice_id: draft.invoice_id,
            filename,
            prompt_tokens: draft.usage.prompt_tokens,
            completion_tokens: draft.usage.completion_tokens,
            processed_at,
            pre_tax_total: totals.pre_tax_rounded(),
            tax_total: totals.tax_rounded(),
            post_tax_total: totals.post_tax_rounded(),
            line_items: draft.line_items,
            special_notes: draft.special_notes,
        }
    }

    pub fn invoice_id(&self) -> &str {
        &self.invoice_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn special_notes(&self) -> &[String] {
        &self.special_notes
    }

    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
        }
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    pub fn pre_tax_total(&self) -> Decimal {
        self.pre_tax_total
    }

    pub fn tax_total(&self) -> Decimal {
        self.tax_total
    }

    pub fn post_tax_total(&self) -> Decimal {
        self.post_tax_total
    }

    /// Whether any line item carries `category`.
    pub fn has_category(&self, category: &str) -> bool {
        self.line_items.iter().any(|item| item.category == category)
    }

    /// Check the stored totals against the line items.
    ///
    /// Tax depends on the rates in force when the record was created, so only
    /// the pre-tax sum and the post-tax identity are checked.
    pub fn verify_totals(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let tolerance = Decimal::new(1, 2);

        let sum = self
            .line_items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.total_price));
        match sum.map(round_money) {
            Some(sum) => {
                if differs(sum, self.pre_tax_total, tolerance) {
                    issues.push(format!(
                        "line item total ({}) differs from PreTaxTotal ({})",
                        sum, self.pre_tax_total
                    ));
                }
            }
            None => issues.push("line item totals overflow".to_string()),
        }

        match self.pre_tax_total.checked_add(self.tax_total) {
            Some(expected) => {
                if differs(expected, self.post_tax_total, tolerance) {
                    issues.push(format!(
                        "PreTaxTotal + TaxTotal ({}) differs from PostTaxTotal ({})",
                        expected, self.post_tax_total
                    ));
                }
            }
            None => issues.push("PreTaxTotal + TaxTotal overflows".to_string()),
        }

        issues
    }
}

fn differs(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.checked_sub(b).is_none_or(|d| d.abs() > tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(total: &str, category: &str) -> LineItem {
        LineItem {
            description: format!("{category} item"),
            quantity: Decimal::ONE,
            unit_price: dec(total),
            total_price: dec(total),
            category: category.to_string(),
        }
    }

    fn sample_record() -> InvoiceRecord {
        let table = TaxTable::from_rates([
            ("food".to_string(), dec("0.05")),
            ("electronics".to_string(), dec("0.10")),
        ])
        .unwrap();
        let draft = DraftInvoice {
            invoice_id: "INV-001".to_string(),
            line_items: vec![
                item("10.00", "food"),
                item("20.00", "electronics"),
                item("5.00", "unknown"),
            ],
            special_notes: vec!["Net 30".to_string()],
            usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 45,
            },
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        InvoiceRecord::new(draft, "alpha.pdf", &table, at).unwrap()
    }

    #[test]
    fn test_record_totals() {
        let record = sample_record();
        assert_eq!(record.pre_tax_total(), dec("35.00"));
        assert_eq!(record.tax_total(), dec("2.50"));
        assert_eq!(record.post_tax_total(), dec("37.50"));
        assert!(record.verify_totals().is_empty());
    }

    #[test]
    fn test_record_serialized_field_names() {
        let record = sample_record();
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"invoiceID\":\"INV-001\""));
        assert!(json.contains("\"Filename\":\"alpha.pdf\""));
        assert!(json.contains("\"AIPromptTokens\":120"));
        assert!(json.contains("\"PreTaxTotal\":35.00"));
        assert!(json.contains("\"TaxTotal\":2.50"));
        assert!(json.contains("\"PostTaxTotal\":37.50"));
        assert!(json.contains("\"ProcessingDateTime\":\"2024-03-01T12:30:00Z\""));
        assert!(json.contains("\"total_price\":10.00"));

        let back: InvoiceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_null_invoice_id_reads_as_empty() {
        let json = r#"{
            "invoiceID": null,
            "Filename": "scan.pdf",
            "AIPromptTokens": null,
            "AICompletionTokens": 3,
            "ProcessingDateTime": "2024-03-01T12:30:00Z",
            "PreTaxTotal": 0,
            "TaxTotal": 0,
            "PostTaxTotal": 0,
            "LineItems": [],
            "SpecialNotes": null
        }"#;
        let record: InvoiceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.invoice_id(), "");
        assert_eq!(record.usage().prompt_tokens, 0);
        assert!(record.special_notes().is_empty());
    }

    #[test]
    fn test_total_mismatch() {
        let mut line = item("10.00", "food");
        line.quantity = dec("3");
        line.unit_price = dec("3.33");
        assert_eq!(line.total_mismatch(), Some(dec("0.01")));

        line.quantity = dec("10000000000000000");
        line.unit_price = dec("10000000000000000");
        assert_eq!(line.total_mismatch(), None);
    }

    #[test]
    fn test_verify_totals_reports_overflow() {
        let json = r#"{
            "invoiceID": "BIG-1",
            "Filename": "big.pdf",
            "ProcessingDateTime": "2024-03-01T12:30:00Z",
            "PreTaxTotal": 50000000000000000000000000000,
            "TaxTotal": 50000000000000000000000000000,
            "PostTaxTotal": 0,
            "LineItems": [
                {"description": "a", "quantity": 1, "unit_price": 1, "total_price": 50000000000000000000000000000, "category": "x"},
                {"description": "b", "quantity": 1, "unit_price": 1, "total_price": 50000000000000000000000000000, "category": "x"}
            ],
            "SpecialNotes": []
        }"#;
        let record: InvoiceRecord = serde_json::from_str(json).unwrap();

        let issues = record.verify_totals();
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|issue| issue.contains("overflow")));
    }
}
