//! PDF text extraction.

use super::ExtractionError;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Extract the text layer of a PDF document.
///
/// Parsing runs on the blocking pool. The parser is known to panic on some malformed inputs, so
/// panics are caught and reported as extraction failures.
pub async fn extract_pdf(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    let size = bytes.len();
    let text = tokio::task::spawn_blocking(move || {
        catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes)))
            .map_err(|_| ExtractionError::Pdf("PDF parser panicked".into()))?
            .map_err(|error| ExtractionError::Pdf(error.to_string()))
    })
    .await
    .map_err(|error| ExtractionError::Task(error.to_string()))??;

    let text = text.trim().to_string();
    tracing::debug!(bytes = size, chars = text.chars().count(), "Extracted PDF text");
    Ok(text)
}

/// Single-page PDF with `text` drawn in Helvetica, with a valid cross-reference table.
#[cfg(test)]
pub(crate) fn single_page_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", index + 1).as_bytes());
    }

    let xref_offset = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        xref.push_str(&format!("{offset:010} 00000 n \n"));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_layer_is_extracted_and_trimmed() {
        let text = extract_pdf(single_page_pdf("Invoice 42 paid"))
            .await
            .expect("valid pdf");

        assert!(text.contains("Invoice"), "unexpected text: {text:?}");
        assert!(text.contains("paid"), "unexpected text: {text:?}");
        assert_eq!(text, text.trim());
    }

    #[tokio::test]
    async fn garbage_bytes_are_rejected() {
        let error = extract_pdf(b"definitely not a pdf".to_vec())
            .await
            .expect_err("invalid pdf");
        assert!(matches!(error, ExtractionError::Pdf(_)));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let error = extract_pdf(Vec::new()).await.expect_err("empty pdf");
        assert!(matches!(error, ExtractionError::Pdf(_)));
    }
}
