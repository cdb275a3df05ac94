//! PDF text extraction using lopdf and pdf-extract, with an OCR fallback.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, info, trace, warn};

use super::{meaningful_chars, ExtractedText, Result, TextExtractor, TextSource};
use crate::error::ExtractionError;
use crate::models::config::{OcrConfig, PdfConfig};
use crate::ocr::{prepare_for_ocr, OcrEngine};

/// A loaded PDF document.
pub struct PdfDocument {
    document: Document,
    raw_data: Vec<u8>,
}

impl PdfDocument {
    /// Parse a PDF from bytes, decrypting documents with an empty password.
    pub fn load(data: &[u8]) -> Result<Self> {
        let mut document =
            Document::load_mem(data).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

        let raw_data = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(ExtractionError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes
            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| ExtractionError::Pdf(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        if document.get_pages().is_empty() {
            return Err(ExtractionError::NoPages);
        }

        debug!("Loaded PDF with {} pages", document.get_pages().len());
        Ok(Self { document, raw_data })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Text layer of a single page (1-indexed). Pages that fail to decode yield `None`.
    pub fn page_text(&self, page: u32) -> Option<String> {
        match self.document.extract_text(&[page]) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("Text layer extraction failed on page {}: {}", page, e);
                None
            }
        }
    }

    /// Whole-document text via pdf-extract, which copes with more font encodings.
    ///
    /// pdf-extract panics on some malformed documents; that is treated as "no text".
    pub fn full_text(&self) -> Option<String> {
        let data = &self.raw_data;
        match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data))) {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                debug!("pdf-extract failed: {}", e);
                None
            }
            Err(_) => {
                warn!("pdf-extract panicked while reading the document");
                None
            }
        }
    }

    /// Raster images drawn on a page (1-indexed), via its XObject resources.
    pub fn page_images(&self, page: u32) -> Vec<DynamicImage> {
        let doc = &self.document;
        let Some(page_id) = doc.get_pages().get(&page).copied() else {
            return Vec::new();
        };

        let mut images = Vec::new();

        if let Some(resources) = self.get_page_resources(doc, page_id) {
            if let Ok(xobjects) = resources.get(b"XObject") {
                if let Ok((_, Object::Dictionary(xobj_dict))) = doc.dereference(xobjects) {
                    for (_name, obj_ref) in xobj_dict.iter() {
                        if let Ok((_, obj)) = doc.dereference(obj_ref) {
                            if let Some(img) = self.try_extract_image_from_object(doc, obj) {
                                images.push(img);
                            }
                        }
                    }
                }
            }
        }

        trace!("Extracted {} images from page {}", images.len(), page);
        images
    }

    /// Every image object in the document, for PDFs whose pages do not
    /// reference their images through resources.
    pub fn all_images(&self) -> Vec<DynamicImage> {
        let doc = &self.document;
        let mut images = Vec::new();
        let mut seen_objects: HashSet<ObjectId> = HashSet::new();

        for (id, object) in doc.objects.iter() {
            if !seen_objects.insert(*id) {
                continue;
            }
            if let Some(img) = self.try_extract_image_from_object(doc, object) {
                images.push(img);
            }
        }

        debug!("Found {} images in document", images.len());
        images
    }

    fn try_extract_image_from_object(&self, doc: &Document, obj: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = obj else {
            return None;
        };
        let dict = &stream.dict;

        let subtype = dict.get(b"Subtype").ok()?;
        if subtype.as_name().ok()? != b"Image" {
            return None;
        }

        let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
        let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

        trace!("Found image object: {}x{}", width, height);

        if let Ok(filter) = dict.get(b"Filter") {
            let filter_name = match filter {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                _ => None,
            };

            match filter_name {
                Some(b"DCTDecode") => {
                    return image::load_from_memory_with_format(
                        &stream.content,
                        image::ImageFormat::Jpeg,
                    )
                    .ok();
                }
                Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                    debug!("Skipping image with unsupported filter");
                    return None;
                }
                _ => {}
            }
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8) as u8;

        create_image_from_raw(&data, width, height, color_space, bits)
    }

    /// Resources dictionary for a page, following `Parent` inheritance.
    fn get_page_resources(&self, doc: &Document, node_id: ObjectId) -> Option<lopdf::Dictionary> {
        let Object::Dictionary(dict) = doc.get_object(node_id).ok()? else {
            return None;
        };

        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
                return Some(res_dict.clone());
            }
        }

        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => self.get_page_resources(doc, *parent_id),
            _ => None,
        }
    }
}

fn create_image_from_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: u8,
) -> Option<DynamicImage> {
    if bits_per_component != 8 {
        trace!("Unsupported bits per component: {}", bits_per_component);
        return None;
    }

    let pixels = (width as usize) * (height as usize);
    let channels = match color_space {
        b"DeviceRGB" | b"RGB" => 3,
        b"DeviceGray" | b"G" => 1,
        _ => return None,
    };

    if data.len() < pixels * channels {
        trace!(
            "Could not decode image: data_len={}, expected={}",
            data.len(),
            pixels * channels
        );
        return None;
    }

    let mut rgba_data = Vec::with_capacity(pixels * 4);
    for chunk in data[..pixels * channels].chunks(channels) {
        match chunk {
            [r, g, b] => rgba_data.extend_from_slice(&[*r, *g, *b, 255]),
            [gray] => rgba_data.extend_from_slice(&[*gray, *gray, *gray, 255]),
            _ => return None,
        }
    }

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba_data).map(DynamicImage::ImageRgba8)
}

/// Extracts text from PDFs: text layer first, OCR of page images otherwise.
pub struct PdfTextExtractor {
    pdf: PdfConfig,
    ocr_config: OcrConfig,
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl PdfTextExtractor {
    /// Create an extractor without OCR; scanned documents fail with `OcrUnavailable`.
    pub fn new(pdf: PdfConfig) -> Self {
        Self {
            pdf,
            ocr_config: OcrConfig::default(),
            ocr: None,
        }
    }

    /// Use `engine` for pages without a usable text layer.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>, config: OcrConfig) -> Self {
        self.ocr = Some(engine);
        self.ocr_config = config;
        self
    }

    fn is_usable(&self, text: &str) -> bool {
        meaningful_chars(text) >= self.pdf.min_text_chars
    }

    fn text_layer(&self, doc: &PdfDocument) -> String {
        let pages: Vec<String> = (1..=doc.page_count())
            .filter_map(|page| doc.page_text(page))
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        pages.join("\n\n")
    }

    fn ocr_pages(&self, doc: &PdfDocument) -> Result<Option<String>> {
        let page_limit = match self.pdf.max_pages {
            0 => doc.page_count(),
            n => doc.page_count().min(n as u32),
        };

        let mut page_images: Vec<(u32, Vec<DynamicImage>)> = (1..=page_limit)
            .map(|page| (page, doc.page_images(page)))
            .filter(|(_, images)| !images.is_empty())
            .collect();

        if page_images.is_empty() {
            let loose = doc.all_images();
            if loose.is_empty() {
                return Ok(None);
            }
            page_images.push((1, loose));
        }

        let engine = self.ocr.as_ref().ok_or(ExtractionError::OcrUnavailable)?;

        let mut texts = Vec::new();
        for (page, images) in &page_images {
            for image in images {
                let prepared = prepare_for_ocr(image, &self.ocr_config);
                let text = engine.recognize(&prepared)?;
                if text.trim().is_empty() {
                    debug!("No text recognized in an image on page {}", page);
                } else {
                    texts.push(text);
                }
            }
        }

        info!(
            "OCR recognized text on {} of {} image pages",
            texts.len(),
            page_images.len()
        );
        Ok(Some(texts.join("\n\n")))
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_bytes(&self, data: &[u8]) -> Result<ExtractedText> {
        let doc = PdfDocument::load(data)?;
        let page_count = doc.page_count();

        let layer = self.text_layer(&doc);
        if self.is_usable(&layer) {
            info!(chars = meaningful_chars(&layer), "Embedded text found, skipping OCR");
            return Ok(ExtractedText {
                text: layer,
                source: TextSource::TextLayer,
                page_count,
            });
        }

        let layer = match doc.full_text() {
            Some(full) if meaningful_chars(&full) > meaningful_chars(&layer) => full,
            _ => layer,
        };
        if self.is_usable(&layer) {
            info!(chars = meaningful_chars(&layer), "Embedded text found via pdf-extract");
            return Ok(ExtractedText {
                text: layer.trim().to_string(),
                source: TextSource::TextLayer,
                page_count,
            });
        }

        info!(
            chars = meaningful_chars(&layer),
            "Text layer too short, performing OCR"
        );

        match self.ocr_pages(&doc)? {
            Some(ocr_text) if !ocr_text.trim().is_empty() => Ok(ExtractedText {
                text: ocr_text,
                source: TextSource::Ocr,
                page_count,
            }),
            ocr_result => {
                if meaningful_chars(&layer) > 0 {
                    // Short but real text layer beats nothing.
                    Ok(ExtractedText {
                        text: layer.trim().to_string(),
                        source: TextSource::TextLayer,
                        page_count,
                    })
                } else if ocr_result.is_some() {
                    Err(ExtractionError::NoText)
                } else {
                    Ok(ExtractedText {
                        text: String::new(),
                        source: TextSource::Blank,
                        page_count,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use lopdf::{dictionary, Stream};

    struct FixedOcr(&'static str);

    impl OcrEngine for FixedOcr {
        fn recognize(&self, _image: &DynamicImage) -> std::result::Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    /// Build a PDF with `pages` empty pages, optionally drawing a gray image on each.
    fn build_pdf(pages: usize, with_image: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            };
            if with_image {
                let image = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => 4,
                        "Height" => 2,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    vec![0, 255, 0, 255, 255, 0, 255, 0],
                );
                let image_id = doc.add_object(image);
                page.set(
                    "Resources",
                    dictionary! { "XObject" => dictionary! { "Im1" => image_id } },
                );
            }
            kids.push(doc.add_object(page).into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let extractor = PdfTextExtractor::new(PdfConfig::default());
        let err = extractor.extract_bytes(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }

    #[test]
    fn test_blank_document_is_distinguished() {
        let extractor = PdfTextExtractor::new(PdfConfig::default());
        let result = extractor.extract_bytes(&build_pdf(2, false)).unwrap();

        assert!(result.is_blank());
        assert_eq!(result.page_count, 2);
        assert!(result.text.is_empty());
    }

    #[test]
    fn test_scanned_document_without_ocr_engine() {
        let extractor = PdfTextExtractor::new(PdfConfig::default());
        let err = extractor.extract_bytes(&build_pdf(1, true)).unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable));
    }

    #[test]
    fn test_scanned_document_uses_ocr_in_page_order() {
        let extractor = PdfTextExtractor::new(PdfConfig::default())
            .with_ocr(Arc::new(FixedOcr("INVOICE 42")), OcrConfig::default());
        let result = extractor.extract_bytes(&build_pdf(2, true)).unwrap();

        assert_eq!(result.source, TextSource::Ocr);
        assert_eq!(result.text, "INVOICE 42\n\nINVOICE 42");
    }

    #[test]
    fn test_ocr_with_no_text_is_an_error() {
        let extractor = PdfTextExtractor::new(PdfConfig::default())
            .with_ocr(Arc::new(FixedOcr("   ")), OcrConfig::default());
        let err = extractor.extract_bytes(&build_pdf(1, true)).unwrap_err();
        assert!(matches!(err, ExtractionError::NoText));
    }

    #[test]
    fn test_max_pages_limits_ocr() {
        let pdf = PdfConfig {
            max_pages: 1,
            ..PdfConfig::default()
        };
        let extractor = PdfTextExtractor::new(pdf)
            .with_ocr(Arc::new(FixedOcr("page")), OcrConfig::default());
        let result = extractor.extract_bytes(&build_pdf(3, true)).unwrap();
        assert_eq!(result.text, "page");
    }

    #[test]
    fn test_raw_gray_image_decoding() {
        let img = create_image_from_raw(&[10, 20, 30, 40], 2, 2, b"DeviceGray", 8).unwrap();
        assert_eq!(img.to_rgba8().get_pixel(1, 1).0, [40, 40, 40, 255]);
        assert!(create_image_from_raw(&[10, 20], 2, 2, b"DeviceGray", 8).is_none());
        assert!(create_image_from_raw(&[10, 20, 30, 40], 2, 2, b"DeviceCMYK", 8).is_none());
    }
}
