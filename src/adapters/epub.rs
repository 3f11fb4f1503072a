//! EPUB adapter built on rbook.
//!
//! Walks the spine in reading order and rebuilds the structural tree from
//! the headings inside each document, so nested sections survive even when
//! the package's navigation document is sparse.

use super::{DocumentAdapter, StructuredDocument, TocEntry, has_extension};
use crate::error::ExtractionError;
use rbook::Epub;
use rbook::prelude::*;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::path::Path;

/// A heading-delimited run of text inside one spine document.
struct Section {
    level: u8,
    title: String,
    text: String,
}

/// EPUB document adapter.
pub struct EpubAdapter;

impl DocumentAdapter for EpubAdapter {
    fn name(&self) -> &'static str {
        "EPUB"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, "epub")
    }

    fn load(&self, path: &Path) -> Result<StructuredDocument, ExtractionError> {
        let epub = Epub::options()
            .strict(false)
            .open(path)
            .map_err(|e| ExtractionError::Unreadable(format!("failed to open EPUB: {e}")))?;

        let title = epub
            .metadata()
            .title()
            .map(|t| t.value().to_string())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let author = epub
            .metadata()
            .creators()
            .next()
            .map(|c| c.value().to_string())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut entries = Vec::new();
        let mut reader = epub.reader();
        let mut index = 0usize;

        while let Some(result) = reader.read_next() {
            // A single damaged spine document should not sink the book
            let Ok(data) = result else { continue };
            let html = data.content().to_string();
            if html.trim().is_empty() {
                continue;
            }

            index += 1;
            if let Some(entry) = entry_from_html(&html, index) {
                entries.push(entry);
            }
        }

        Ok(StructuredDocument {
            title,
            author,
            entries,
        })
    }
}

/// Builds one structural entry from a spine document's HTML.
///
/// Returns `None` when the document carries no text at all.
fn entry_from_html(html: &str, index: usize) -> Option<TocEntry> {
    let doc = Html::parse_document(html);
    let (preamble, sections) = split_sections(&doc);

    let fallback_title = document_title(&doc).unwrap_or_else(|| format!("Section {index}"));

    if sections.is_empty() {
        let text = clean_text(&preamble);
        if text.is_empty() {
            return None;
        }
        return Some(TocEntry::leaf(fallback_title, text));
    }

    let mut roots = nest_sections(sections);
    let preamble = clean_text(&preamble);

    // A document that opens with its own single heading IS that entry;
    // otherwise the headings nest under the document
    if preamble.is_empty() && roots.len() == 1 {
        return Some(roots.remove(0));
    }

    Some(TocEntry {
        title: fallback_title,
        text: preamble,
        children: roots,
    })
}

/// The `<title>` element's text, if present and non-empty.
fn document_title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = doc
        .select(&selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))?;
    (!title.is_empty()).then_some(title)
}

/// Walks the document in reading order, cutting a new section at every
/// heading element. Text before the first heading lands in the preamble.
fn split_sections(doc: &Html) -> (String, Vec<Section>) {
    let mut preamble = String::new();
    let mut sections: Vec<Section> = Vec::new();

    for node in doc.root_element().descendants() {
        match node.value() {
            Node::Element(element) => {
                if let Some(level) = heading_level(element.name()) {
                    let title = ElementRef::wrap(node)
                        .map(|e| collapse_whitespace(&e.text().collect::<String>()))
                        .unwrap_or_default();
                    sections.push(Section {
                        level,
                        title: if title.is_empty() {
                            "Untitled section".to_string()
                        } else {
                            title
                        },
                        text: String::new(),
                    });
                }
            }
            Node::Text(text) => {
                // Heading text was already consumed as a title; scripts,
                // styles and the head carry no content
                let skip = node.ancestors().any(|ancestor| {
                    ancestor.value().as_element().is_some_and(|element| {
                        heading_level(element.name()).is_some()
                            || matches!(element.name(), "script" | "style" | "head" | "title")
                    })
                });
                if skip {
                    continue;
                }

                let target = match sections.last_mut() {
                    Some(section) => &mut section.text,
                    None => &mut preamble,
                };
                append_text(target, text);
            }
            _ => {}
        }
    }

    (preamble, sections)
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Folds the flat heading sequence into a tree by heading level.
fn nest_sections(sections: Vec<Section>) -> Vec<TocEntry> {
    let mut roots: Vec<TocEntry> = Vec::new();
    let mut stack: Vec<(u8, TocEntry)> = Vec::new();

    for section in sections {
        let entry = TocEntry::leaf(section.title, clean_text(&section.text));

        while stack
            .last()
            .is_some_and(|(level, _)| *level >= section.level)
        {
            let (_, finished) = stack.pop().expect("stack is non-empty");
            attach(finished, &mut stack, &mut roots);
        }

        stack.push((section.level, entry));
    }

    while let Some((_, finished)) = stack.pop() {
        attach(finished, &mut stack, &mut roots);
    }

    roots
}

fn attach(entry: TocEntry, stack: &mut [(u8, TocEntry)], roots: &mut Vec<TocEntry>) {
    match stack.last_mut() {
        Some((_, parent)) => parent.children.push(entry),
        None => roots.push(entry),
    }
}

/// Appends a text node, guarding against words jamming together across tags.
fn append_text(buffer: &mut String, text: &str) {
    if text.trim().is_empty() {
        // Preserve at most a separating newline
        if !buffer.is_empty() && !buffer.ends_with('\n') {
            buffer.push('\n');
        }
        return;
    }
    if !buffer.is_empty()
        && !buffer.ends_with(char::is_whitespace)
        && !text.starts_with(char::is_whitespace)
    {
        buffer.push(' ');
    }
    buffer.push_str(text);
}

/// Trims lines and collapses blank-line runs.
fn clean_text(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !previous_blank && !lines.is_empty() {
                lines.push("");
            }
            previous_blank = true;
        } else {
            lines.push(trimmed);
            previous_blank = false;
        }
    }

    while lines.last() == Some(&"") {
        lines.pop();
    }

    lines.join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
