//! Helpers for normalizing client supplied values.

use crate::extraction::FileKind;
use std::path::Path;

const DEFAULT_FILENAME: &str = "upload";

/// Sanitize arbitrary string input by trimming whitespace and dropping empties.
pub fn sanitize_string(value: Option<&str>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Reduce a client filename to its final path component.
///
/// Browsers on some platforms send full paths; both separators are stripped. Blank names become
/// `upload`.
pub fn sanitize_filename(value: &str) -> String {
    let last = value
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        last.to_string()
    }
}

/// Normalize a content type to its lowercase essence, without parameters.
pub fn sanitize_content_type(value: Option<&str>) -> Option<String> {
    sanitize_string(value.and_then(|raw| raw.split(';').next()))
        .map(|essence| essence.to_ascii_lowercase())
}

/// Content type recorded for a document: the client's unless it is missing or generic.
pub fn effective_file_type(content_type: Option<&str>, filename: &str, kind: FileKind) -> String {
    match sanitize_content_type(content_type) {
        Some(essence) if essence != "application/octet-stream" => essence,
        _ => inferred_file_type(filename, kind),
    }
}

fn inferred_file_type(filename: &str, kind: FileKind) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match (kind, extension.as_str()) {
        (FileKind::Pdf, _) => "application/pdf".into(),
        (FileKind::Image, "jpg" | "jpeg") => "image/jpeg".into(),
        (FileKind::Image, "gif") => "image/gif".into(),
        (FileKind::Image, _) => "image/png".into(),
        (FileKind::Text, "md" | "markdown") => "text/markdown".into(),
        (FileKind::Text, "csv") => "text/csv".into(),
        (FileKind::Text, _) => "text/plain".into(),
    }
}
