//! Text extraction for uploaded files.

pub mod image;
pub mod pdf;

use crate::models::ImageToText;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use self::image::{ImageText, describe_image, extract_image};
pub use self::pdf::extract_pdf;

/// Errors raised while turning an upload into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The PDF parser rejected the document.
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    /// The image could not be decoded or re-encoded.
    #[error("Failed to decode image: {0}")]
    Image(#[from] ::image::ImageError),
    /// A text upload was not valid UTF-8.
    #[error("Text file is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Neither the content type nor the extension maps to a supported kind.
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    /// A blocking extraction task failed to complete.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Supported upload categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// PDF document.
    Pdf,
    /// Raster image (JPEG, PNG, GIF).
    Image,
    /// Plain text.
    Text,
}

/// How the text of an image upload was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrProvenance {
    /// An OCR model produced the text.
    Model(String),
    /// Every OCR model missed and the image was described instead.
    Heuristic,
}

/// Result of extracting one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    /// Extracted text.
    pub text: String,
    /// Category the upload was classified as.
    pub kind: FileKind,
    /// OCR provenance, only set for images.
    pub ocr: Option<OcrProvenance>,
}

/// Decide the upload category from its content type, falling back to the filename extension.
pub fn classify(content_type: Option<&str>, filename: &str) -> Result<FileKind, ExtractionError> {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match essence.as_deref() {
        Some("application/pdf") => Ok(FileKind::Pdf),
        Some("image/jpeg" | "image/jpg" | "image/png" | "image/gif") => Ok(FileKind::Image),
        Some(other) if other.starts_with("text/") => Ok(FileKind::Text),
        None | Some("application/octet-stream") => classify_extension(filename),
        Some(other) => Err(ExtractionError::UnsupportedType(other.to_string())),
    }
}

fn classify_extension(filename: &str) -> Result<FileKind, ExtractionError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(FileKind::Pdf),
        "jpg" | "jpeg" | "png" | "gif" => Ok(FileKind::Image),
        "txt" | "md" | "markdown" | "text" | "csv" | "log" => Ok(FileKind::Text),
        _ => Err(ExtractionError::UnsupportedType(format!(
            "cannot determine type of '{filename}'"
        ))),
    }
}

/// Decode a plain-text upload.
pub fn extract_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    Ok(String::from_utf8(bytes)?)
}

/// Dispatches uploads to the extractor for their kind.
pub struct DocumentExtractor {
    ocr: Option<Arc<dyn ImageToText>>,
    ocr_models: Vec<String>,
}

impl DocumentExtractor {
    /// Build an extractor; without an OCR backend images are always described heuristically.
    pub fn new(ocr: Option<Arc<dyn ImageToText>>, ocr_models: Vec<String>) -> Self {
        Self { ocr, ocr_models }
    }

    /// Extract the text of an upload already classified as `kind`.
    pub async fn extract(
        &self,
        kind: FileKind,
        bytes: Vec<u8>,
    ) -> Result<ExtractedText, ExtractionError> {
        let (text, ocr) = match kind {
            FileKind::Pdf => (extract_pdf(bytes).await?, None),
            FileKind::Text => (extract_text(bytes)?, None),
            FileKind::Image => {
                let image = extract_image(bytes, self.ocr.as_deref(), &self.ocr_models).await?;
                let provenance = match image.model {
                    Some(model) => OcrProvenance::Model(model),
                    None => OcrProvenance::Heuristic,
                };
                (image.text, Some(provenance))
            }
        };
        Ok(ExtractedText { text, kind, ocr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_decides_the_kind() {
        assert_eq!(
            classify(Some("application/pdf"), "scan.bin").expect("pdf"),
            FileKind::Pdf
        );
        assert_eq!(
            classify(Some("image/jpg"), "photo").expect("image"),
            FileKind::Image
        );
        assert_eq!(
            classify(Some("text/markdown; charset=utf-8"), "notes").expect("text"),
            FileKind::Text
        );
    }

    #[test]
    fn octet_stream_falls_back_to_extension() {
        assert_eq!(
            classify(Some("application/octet-stream"), "report.PDF").expect("pdf"),
            FileKind::Pdf
        );
        assert_eq!(classify(None, "logo.png").expect("image"), FileKind::Image);
        assert_eq!(classify(None, "data.csv").expect("text"), FileKind::Text);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(matches!(
            classify(Some("application/zip"), "archive.zip"),
            Err(ExtractionError::UnsupportedType(_))
        ));
        assert!(matches!(
            classify(None, "binary"),
            Err(ExtractionError::UnsupportedType(_))
        ));
        assert!(matches!(
            classify(Some("image/tiff"), "scan.tiff"),
            Err(ExtractionError::UnsupportedType(_))
        ));
    }

    #[test]
    fn text_must_be_utf8() {
        assert_eq!(
            extract_text("Привет, мир".as_bytes().to_vec()).expect("utf8"),
            "Привет, мир"
        );
        assert!(matches!(
            extract_text(vec![0xff, 0xfe, 0x00]),
            Err(ExtractionError::InvalidUtf8(_))
        ));
    }

    #[tokio::test]
    async fn images_without_ocr_backend_are_described() {
        let image = ::image::RgbImage::from_pixel(8, 8, ::image::Rgb([255, 255, 255]));
        let mut png = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png, ::image::ImageFormat::Png)
            .expect("encode");

        let extractor = DocumentExtractor::new(None, vec!["printed".into()]);
        let extracted = extractor
            .extract(FileKind::Image, png.into_inner())
            .await
            .expect("extracted");

        assert_eq!(extracted.kind, FileKind::Image);
        assert_eq!(extracted.ocr, Some(OcrProvenance::Heuristic));
        assert!(extracted.text.contains("Bright image"));
    }

    #[tokio::test]
    async fn text_uploads_have_no_ocr_provenance() {
        let extractor = DocumentExtractor::new(None, Vec::new());
        let extracted = extractor
            .extract(FileKind::Text, b"hello".to_vec())
            .await
            .expect("extracted");
        assert_eq!(extracted.text, "hello");
        assert!(extracted.ocr.is_none());
    }
}
