//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the invex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvexConfig {
    /// PDF text extraction configuration.
    pub pdf: PdfConfig,

    /// OCR fallback configuration.
    pub ocr: OcrConfig,

    /// Structured-extraction oracle configuration.
    pub oracle: OracleConfig,

    /// Tax table configuration.
    pub tax: TaxConfig,

    /// Invoice store configuration.
    pub store: StoreConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Minimum non-whitespace characters for the text layer to be used as-is.
    pub min_text_chars: usize,

    /// Maximum pages to OCR (0 = unlimited).
    pub max_pages: usize,

    /// Upper bound on extraction (text layer + OCR) per document, in seconds.
    pub timeout_secs: u64,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 30,
            max_pages: 0,
            timeout_secs: 300,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Enable the OCR fallback for scanned documents.
    pub enabled: bool,

    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Contrast adjustment applied before recognition (0 disables).
    pub contrast: f32,

    /// Unsharp-mask sigma applied before recognition (0 disables).
    pub sharpen_sigma: f32,

    /// Unsharp-mask threshold.
    pub sharpen_threshold: i32,

    /// Keep `[UNK]` markers for glyphs the recognizer could not map.
    pub keep_unknown_glyphs: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            contrast: 30.0,
            sharpen_sigma: 1.0,
            sharpen_threshold: 2,
            keep_unknown_glyphs: false,
        }
    }
}

impl OcrConfig {
    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.model_dir.join(model_name)
    }
}

/// Structured-extraction oracle (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// API base URL, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Sampling temperature.
    pub temperature: f64,

    /// Extracted text is truncated to this many characters before sending.
    pub max_input_chars: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            temperature: 0.0,
            max_input_chars: 12_000,
        }
    }
}

/// How rates are written in the tax rate file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    /// 0.08 means 8%.
    #[default]
    Fraction,
    /// 8 means 8%.
    Percent,
}

/// What to do when the oracle assigns a category outside the vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    /// Replace with `uncategorized` (taxed at 0).
    #[default]
    Uncategorized,
    /// Fail the document with a parse error.
    Reject,
}

/// Tax table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    /// JSON file mapping category to rate.
    pub rates_path: PathBuf,

    /// Unit of the rates in `rates_path`.
    pub rate_unit: RateUnit,

    /// Handling of categories outside the table.
    pub unknown_category_policy: UnknownCategoryPolicy,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            rates_path: PathBuf::from("tax_rates.json"),
            rate_unit: RateUnit::Fraction,
            unknown_category_policy: UnknownCategoryPolicy::Uncategorized,
        }
    }
}

/// Invoice store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backing JSON file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("storage/invoices.json"),
        }
    }
}

impl InvexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
