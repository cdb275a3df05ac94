//! Image preprocessing for OCR.

use image::{DynamicImage, GenericImageView};
use tracing::trace;

use crate::models::config::OcrConfig;

/// Grayscale, boost contrast and sharpen a page image before recognition.
pub fn prepare_for_ocr(image: &DynamicImage, config: &OcrConfig) -> DynamicImage {
    let (width, height) = image.dimensions();
    trace!("Preparing {}x{} image for OCR", width, height);

    let mut prepared = image.grayscale();

    if config.contrast != 0.0 {
        prepared = prepared.adjust_contrast(config.contrast);
    }

    if config.sharpen_sigma > 0.0 {
        prepared = prepared.unsharpen(config.sharpen_sigma, config.sharpen_threshold);
    }

    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_prepare_keeps_dimensions_and_grayscale() {
        let mut img = GrayImage::new(16, 8);
        for (x, _, px) in img.enumerate_pixels_mut() {
            *px = Luma([if x < 8 { 100 } else { 150 }]);
        }
        let prepared = prepare_for_ocr(&DynamicImage::ImageLuma8(img), &OcrConfig::default());

        assert_eq!(prepared.dimensions(), (16, 8));
        assert!(prepared.as_luma8().is_some());
    }

    #[test]
    fn test_contrast_spreads_values() {
        let mut img = GrayImage::new(4, 1);
        img.put_pixel(0, 0, Luma([100]));
        img.put_pixel(1, 0, Luma([100]));
        img.put_pixel(2, 0, Luma([156]));
        img.put_pixel(3, 0, Luma([156]));
        let config = OcrConfig {
            sharpen_sigma: 0.0,
            ..OcrConfig::default()
        };
        let prepared = prepare_for_ocr(&DynamicImage::ImageLuma8(img), &config);
        let luma = prepared.to_luma8();

        assert!(luma.get_pixel(0, 0)[0] < 100);
        assert!(luma.get_pixel(3, 0)[0] > 156);
    }
}
