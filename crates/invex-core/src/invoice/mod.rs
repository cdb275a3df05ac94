//! Structured invoice extraction from raw text.

mod oracle;
mod parser;
mod schema;

pub use oracle::{ExtractionOracle, OpenAiOracle, OracleRequest, OracleResponse};
pub use parser::StructuredParser;
pub use schema::invoice_schema;
