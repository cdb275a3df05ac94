//! The fixed schema oracle responses must conform to.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

/// JSON schema sent to the oracle, with `category` constrained to `categories`.
pub fn invoice_schema(categories: &[String]) -> Value {
    let category = if categories.is_empty() {
        json!({ "type": "string" })
    } else {
        json!({ "type": "string", "enum": categories })
    };

    json!({
        "type": "object",
        "properties": {
            "invoiceID": {
                "type": ["string", "null"],
                "description": "invoice number or ID"
            },
            "LineItems": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "description": { "type": "string" },
                        "quantity": { "type": "number" },
                        "unit_price": { "type": "number" },
                        "total_price": { "type": "number" },
                        "category": category
                    },
                    "required": ["description", "quantity", "unit_price", "total_price", "category"],
                    "additionalProperties": false
                }
            },
            "SpecialNotes": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["invoiceID", "LineItems", "SpecialNotes"],
        "additionalProperties": false
    })
}

/// Oracle answer, typed. Deserialization failure is a schema violation.
#[derive(Debug, Deserialize)]
pub(crate) struct OracleInvoice {
    #[serde(rename = "invoiceID", default, deserialize_with = "crate::models::null_as_default")]
    pub invoice_id: String,

    #[serde(rename = "LineItems")]
    pub line_items: Vec<OracleLineItem>,

    #[serde(rename = "SpecialNotes", default, deserialize_with = "crate::models::null_as_default")]
    pub special_notes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OracleLineItem {
    #[serde(default, deserialize_with = "crate::models::null_as_default")]
    pub description: String,

    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub quantity: Decimal,

    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub unit_price: Decimal,

    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_price: Decimal,

    #[serde(default)]
    pub category: Option<String>,
}
