//! Turns extracted text into a validated draft invoice via the oracle.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::oracle::{ExtractionOracle, OracleRequest};
use super::schema::{invoice_schema, OracleInvoice, OracleLineItem};
use crate::error::{ParseError, Result, ValidationError};
use crate::models::config::UnknownCategoryPolicy;
use crate::models::invoice::{DraftInvoice, LineItem, UNCATEGORIZED};
use crate::tax::{TaxTable, TotalsCalculator};

/// Structured parser: oracle call plus schema and boundary validation.
pub struct StructuredParser {
    oracle: Arc<dyn ExtractionOracle>,
    policy: UnknownCategoryPolicy,
    max_input_chars: usize,
}

impl StructuredParser {
    /// Create a parser with default settings.
    pub fn new(oracle: Arc<dyn ExtractionOracle>) -> Self {
        Self {
            oracle,
            policy: UnknownCategoryPolicy::default(),
            max_input_chars: 12_000,
        }
    }

    /// Set the unknown category policy.
    pub fn with_policy(mut self, policy: UnknownCategoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the input truncation limit (in characters).
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Category keys offered to the oracle.
    fn vocabulary(&self, tax_table: &TaxTable) -> Vec<String> {
        let mut categories: Vec<String> = tax_table.categories().map(str::to_string).collect();
        if self.policy == UnknownCategoryPolicy::Uncategorized
            && !categories.is_empty()
            && !tax_table.contains(UNCATEGORIZED)
        {
            categories.push(UNCATEGORIZED.to_string());
        }
        categories
    }

    /// Parse invoice text into a draft invoice.
    pub async fn parse(&self, text: &str, tax_table: &TaxTable) -> Result<DraftInvoice> {
        if text.trim().is_empty() {
            return Err(ParseError::EmptyText.into());
        }

        let text = truncate_chars(text, self.max_input_chars);
        let categories = self.vocabulary(tax_table);
        let schema = invoice_schema(&categories);

        let response = self
            .oracle
            .extract(OracleRequest {
                text,
                schema: &schema,
                categories: &categories,
            })
            .await?;

        let json = extract_json_object(&response.content)?;
        let parsed: OracleInvoice =
            serde_json::from_str(json).map_err(|e| ParseError::Schema(e.to_string()))?;

        let line_items = parsed
            .line_items
            .into_iter()
            .enumerate()
            .map(|(index, item)| self.line_item(index, item, tax_table))
            .collect::<Result<Vec<_>>>()?;

        // Reject drafts whose totals cannot be represented.
        TotalsCalculator::new(tax_table).compute(&line_items)?;

        info!(
            invoice_id = %parsed.invoice_id,
            line_items = line_items.len(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Parsed invoice"
        );

        Ok(DraftInvoice {
            invoice_id: parsed.invoice_id.trim().to_string(),
            line_items,
            special_notes: parsed.special_notes,
            usage: response.usage,
        })
    }

    fn line_item(&self, index: usize, item: OracleLineItem, tax_table: &TaxTable) -> Result<LineItem> {
        validate_amounts(index, &item)?;

        let category = match item.category.map(|c| c.trim().to_string()) {
            Some(c) if tax_table.contains(&c) || c == UNCATEGORIZED => c,
            other => {
                let category = other.unwrap_or_default();
                match self.policy {
                    UnknownCategoryPolicy::Reject => {
                        return Err(ParseError::UnknownCategory { index, category }.into());
                    }
                    UnknownCategoryPolicy::Uncategorized => {
                        warn!(
                            "Line item {} has unknown category '{}', marking {}",
                            index, category, UNCATEGORIZED
                        );
                        UNCATEGORIZED.to_string()
                    }
                }
            }
        };

        let line = LineItem {
            description: item.description.trim().to_string(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            category,
        };

        if line.total_mismatch().is_some_and(|d| d > Decimal::new(1, 2)) {
            debug!(
                "Line item {} total {} differs from {} x {}",
                index, line.total_price, line.quantity, line.unit_price
            );
        }

        Ok(line)
    }
}

fn validate_amounts(index: usize, item: &OracleLineItem) -> std::result::Result<(), ValidationError> {
    if item.quantity <= Decimal::ZERO {
        return Err(ValidationError {
            index,
            field: "quantity",
            reason: format!("must be positive, got {}", item.quantity),
        });
    }
    for (field, value) in [("unit_price", item.unit_price), ("total_price", item.total_price)] {
        if value < Decimal::ZERO {
            return Err(ValidationError {
                index,
                field,
                reason: format!("must not be negative, got {}", value),
            });
        }
    }
    if item.quantity.checked_mul(item.unit_price).is_none() {
        return Err(ValidationError {
            index,
            field: "unit_price",
            reason: format!("{} x {} is out of range", item.quantity, item.unit_price),
        });
    }
    Ok(())
}

/// Truncate to at most `max_chars` characters, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => {
            debug!("Truncating invoice text to {} chars", max_chars);
            &text[..end]
        }
        None => text,
    }
}

/// The outermost JSON object in a response that may carry fences or chatter.
fn extract_json_object(content: &str) -> std::result::Result<&str, ParseError> {
    let start = content
        .find('{')
        .ok_or_else(|| ParseError::Schema("no JSON object in response".to_string()))?;
    let end = content
        .rfind('}')
        .ok_or_else(|| ParseError::Schema("no JSON object in response".to_string()))?;
    if end <= start {
        return Err(ParseError::Schema("malformed JSON in response".to_string()));
    }
    Ok(&content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvexError;
    use crate::invoice::oracle::OracleResponse;
    use crate::models::invoice::TokenUsage;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// Oracle returning canned content and recording what it was asked.
    struct CannedOracle {
        content: String,
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CannedOracle {
        fn new(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: content.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExtractionOracle for CannedOracle {
        async fn extract(
            &self,
            request: OracleRequest<'_>,
        ) -> std::result::Result<OracleResponse, ParseError> {
            self.seen
                .lock()
                .unwrap()
                .push((request.text.to_string(), request.categories.to_vec()));
            Ok(OracleResponse {
                content: self.content.clone(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
            })
        }
    }

    struct DownOracle;

    #[async_trait]
    impl ExtractionOracle for DownOracle {
        async fn extract(
            &self,
            _request: OracleRequest<'_>,
        ) -> std::result::Result<OracleResponse, ParseError> {
            Err(ParseError::Unavailable("connection refused".to_string()))
        }
    }

    fn table() -> TaxTable {
        TaxTable::from_rates([
            ("food".to_string(), Decimal::from_str("0.05").unwrap()),
            ("electronics".to_string(), Decimal::from_str("0.10").unwrap()),
        ])
        .unwrap()
    }

    const GOOD: &str = r#"{
        "invoiceID": "INV-7",
        "LineItems": [
            {"description": "Apples", "quantity": 2, "unit_price": 5.00, "total_price": 10.00, "category": "food"},
            {"description": "Cable", "quantity": 1, "unit_price": 20.00, "total_price": 20.00, "category": "gadgets"}
        ],
        "SpecialNotes": ["Deliver to back door"]
    }"#;

    #[tokio::test]
    async fn test_parse_clamps_unknown_category() {
        let oracle = CannedOracle::new(GOOD);
        let parser = StructuredParser::new(oracle.clone());
        let draft = parser.parse("invoice text", &table()).await.unwrap();

        assert_eq!(draft.invoice_id, "INV-7");
        assert_eq!(draft.line_items.len(), 2);
        assert_eq!(draft.line_items[0].category, "food");
        assert_eq!(draft.line_items[1].category, UNCATEGORIZED);
        assert_eq!(draft.line_items[0].total_price, Decimal::from_str("10.00").unwrap());
        assert_eq!(draft.special_notes, vec!["Deliver to back door".to_string()]);
        assert_eq!(draft.usage.prompt_tokens, 100);

        let seen = oracle.seen.lock().unwrap();
        assert_eq!(
            seen[0].1,
            vec!["electronics".to_string(), "food".to_string(), UNCATEGORIZED.to_string()]
        );
    }

    #[tokio::test]
    async fn test_reject_policy() {
        let parser = StructuredParser::new(CannedOracle::new(GOOD))
            .with_policy(UnknownCategoryPolicy::Reject);
        let err = parser.parse("invoice text", &table()).await.unwrap_err();

        assert!(matches!(
            err,
            InvexError::Parse(ParseError::UnknownCategory { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_fenced_response_and_null_id() {
        let content = "Sure!\n```json\n{\"invoiceID\": null, \"LineItems\": [], \"SpecialNotes\": null}\n```";
        let parser = StructuredParser::new(CannedOracle::new(content));
        let draft = parser.parse("invoice text", &table()).await.unwrap();

        assert_eq!(draft.invoice_id, "");
        assert!(draft.line_items.is_empty());
        assert!(draft.special_notes.is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_parse_error() {
        let parser = StructuredParser::new(CannedOracle::new(
            r#"{"invoiceID": "X", "LineItems": [{"description": "a", "quantity": "many"}]}"#,
        ));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();
        assert!(matches!(err, InvexError::Parse(ParseError::Schema(_))));

        let parser = StructuredParser::new(CannedOracle::new("I could not read this invoice."));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();
        assert!(matches!(err, InvexError::Parse(ParseError::Schema(_))));
    }

    #[tokio::test]
    async fn test_negative_total_is_validation_error() {
        let parser = StructuredParser::new(CannedOracle::new(
            r#"{"invoiceID": "X", "LineItems": [
                {"description": "Refund", "quantity": 1, "unit_price": 5, "total_price": -5, "category": "food"}
            ], "SpecialNotes": []}"#,
        ));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();

        match err {
            InvexError::Validation(v) => {
                assert_eq!(v.index, 0);
                assert_eq!(v.field, "total_price");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_quantity_is_validation_error() {
        let parser = StructuredParser::new(CannedOracle::new(
            r#"{"invoiceID": "X", "LineItems": [
                {"description": "Nothing", "quantity": 0, "unit_price": 5, "total_price": 0, "category": "food"}
            ], "SpecialNotes": []}"#,
        ));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();
        assert!(matches!(err, InvexError::Validation(ValidationError { field: "quantity", .. })));
    }

    #[tokio::test]
    async fn test_out_of_range_product_is_validation_error() {
        let parser = StructuredParser::new(CannedOracle::new(
            r#"{"invoiceID": "X", "LineItems": [
                {"description": "Bulk", "quantity": 10000000000000000, "unit_price": 10000000000000000, "total_price": 1, "category": "food"}
            ], "SpecialNotes": []}"#,
        ));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();

        match err {
            InvexError::Validation(v) => {
                assert_eq!(v.index, 0);
                assert_eq!(v.field, "unit_price");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overflowing_invoice_total_is_validation_error() {
        let parser = StructuredParser::new(CannedOracle::new(
            r#"{"invoiceID": "X", "LineItems": [
                {"description": "a", "quantity": 1, "unit_price": 50000000000000000000000000000, "total_price": 50000000000000000000000000000, "category": "food"},
                {"description": "b", "quantity": 1, "unit_price": 50000000000000000000000000000, "total_price": 50000000000000000000000000000, "category": "food"}
            ], "SpecialNotes": []}"#,
        ));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();

        assert!(matches!(err, InvexError::Validation(ValidationError { index: 1, .. })));
    }

    #[tokio::test]
    async fn test_empty_text_skips_oracle() {
        let oracle = CannedOracle::new(GOOD);
        let parser = StructuredParser::new(oracle.clone());
        let err = parser.parse("  \n ", &table()).await.unwrap_err();

        assert!(matches!(err, InvexError::Parse(ParseError::EmptyText)));
        assert!(oracle.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_surfaces() {
        let parser = StructuredParser::new(Arc::new(DownOracle));
        let err = parser.parse("invoice text", &table()).await.unwrap_err();
        assert!(matches!(err, InvexError::Parse(ParseError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_input_truncated() {
        let oracle = CannedOracle::new(GOOD);
        let parser = StructuredParser::new(oracle.clone()).with_max_input_chars(5);
        parser.parse("ąęśćźżół", &table()).await.unwrap();

        assert_eq!(oracle.seen.lock().unwrap()[0].0, "ąęśćź");
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("x {\"a\": {}} y").unwrap(), "{\"a\": {}}");
        assert!(extract_json_object("} {").is_err());
    }
}
