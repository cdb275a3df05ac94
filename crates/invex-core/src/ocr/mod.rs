//! OCR fallback for scanned documents.
//!
//! The engine is a black box behind [`OcrEngine`]: an image goes in, text in
//! reading order comes out. The model-backed implementation lives behind the
//! `ocr` feature.

mod preprocessing;
#[cfg(feature = "ocr")]
mod pure_engine;

pub use preprocessing::prepare_for_ocr;
#[cfg(feature = "ocr")]
pub use pure_engine::PureOcrEngine;

use std::sync::Arc;

use image::DynamicImage;
use tracing::warn;

use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Trait for OCR engines.
pub trait OcrEngine: Send + Sync {
    /// Recognize all text in an image, lines in reading order.
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Build the configured OCR engine.
///
/// Returns `Ok(None)` when OCR is disabled or the model files are missing, in
/// which case scanned documents fail with an "OCR unavailable" error.
pub fn create_engine(config: &OcrConfig) -> Result<Option<Arc<dyn OcrEngine>>, OcrError> {
    if !config.enabled {
        return Ok(None);
    }

    let required = [
        config.model_path(&config.detection_model),
        config.model_path(&config.recognition_model),
        config.model_path(&config.dictionary),
    ];
    if let Some(missing) = required.iter().find(|p| !p.exists()) {
        warn!(
            "OCR model file {} not found, scanned documents cannot be processed",
            missing.display()
        );
        return Ok(None);
    }

    #[cfg(feature = "ocr")]
    {
        let engine = PureOcrEngine::from_config(config.clone())?;
        Ok(Some(Arc::new(engine)))
    }

    #[cfg(not(feature = "ocr"))]
    {
        warn!("invex-core built without the `ocr` feature, OCR fallback disabled");
        Ok(None)
    }
}
