//! PDF adapter built on lopdf.
//!
//! PDFs rarely ship a usable structural tree, so the adapter extracts the
//! text layer page by page and detects chapter boundaries heuristically:
//! short title-case or all-caps lines and numbered chapter headings.

use super::{DocumentAdapter, StructuredDocument, TocEntry, has_extension};
use crate::error::ExtractionError;
use lopdf::{Document, Object};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Numbered heading patterns ("Chapter 7", "PART IV", "Section 2").
static NUMBERED_HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(chapter|part|section|book)\s+([0-9]+|[ivxlcdm]+)\b")
        .expect("Invalid NUMBERED_HEADING_REGEX")
});

/// Longest line still considered a heading candidate.
const MAX_HEADING_LEN: usize = 80;

/// PDF document adapter.
pub struct PdfAdapter;

impl DocumentAdapter for PdfAdapter {
    fn name(&self) -> &'static str {
        "PDF"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, "pdf")
    }

    fn load(&self, path: &Path) -> Result<StructuredDocument, ExtractionError> {
        let doc = Document::load(path)
            .map_err(|e| ExtractionError::Unreadable(format!("failed to load PDF: {e}")))?;

        let mut text = String::new();
        for (page_num, _page_id) in doc.get_pages() {
            // Pages with broken content streams are skipped rather than
            // sinking the whole document
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }

        let file_stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string();
        let title = info_string(&doc, b"Title").unwrap_or(file_stem);
        let author = info_string(&doc, b"Author").unwrap_or_else(|| "Unknown".to_string());

        let entries = split_chapters(&text, &title);

        Ok(StructuredDocument {
            title,
            author,
            entries,
        })
    }
}

/// Reads a text field from the trailer's Info dictionary.
fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let info = match info {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let dict = info.as_dict().ok()?;

    match dict.get(key).ok()? {
        Object::String(bytes, _) => pdf_string(bytes).filter(|s| !s.trim().is_empty()),
        _ => None,
    }
}

/// Decodes a PDF text string (UTF-16BE with BOM, or byte string).
fn pdf_string(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&utf16).ok()
    } else {
        Some(String::from_utf8_lossy(bytes).to_string())
    }
}

/// Splits extracted text into flat top-level entries at detected headings.
///
/// A document with no detectable headings becomes a single entry covering
/// the whole text, titled after the document.
fn split_chapters(text: &str, document_title: &str) -> Vec<TocEntry> {
    let mut entries: Vec<TocEntry> = Vec::new();
    let mut current_title: Option<String> = None;
    let mut buffer = String::new();
    let mut saw_heading = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if looks_like_heading(trimmed) {
            // Text before the first heading is front matter
            flush(current_title.take(), &mut buffer, &mut entries, "Front matter");
            saw_heading = true;
            current_title = Some(trimmed.to_string());
        } else {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }

    // A document with no headings at all is just the document itself
    let fallback = if saw_heading {
        "Front matter"
    } else {
        document_title
    };
    flush(current_title.take(), &mut buffer, &mut entries, fallback);

    entries
}

/// Closes out the buffered segment as an entry, dropping empty segments.
fn flush(
    title: Option<String>,
    buffer: &mut String,
    entries: &mut Vec<TocEntry>,
    fallback_title: &str,
) {
    if buffer.trim().is_empty() {
        buffer.clear();
        return;
    }
    let title = title.unwrap_or_else(|| fallback_title.to_string());
    entries.push(TocEntry::leaf(title, buffer.trim().to_string()));
    buffer.clear();
}

/// Heading heuristic: short line that is a numbered heading or all caps.
fn looks_like_heading(line: &str) -> bool {
    if line.is_empty() || line.len() > MAX_HEADING_LEN {
        return false;
    }
    if line.ends_with('.') || line.ends_with(',') || line.ends_with(';') {
        return false;
    }
    NUMBERED_HEADING_REGEX.is_match(line) || is_all_caps(line)
}

/// True when every letter is uppercase and the line has enough of them
/// to not be an initialism or page furniture.
fn is_all_caps(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 4 && letters.iter().all(|c| c.is_uppercase())
}
