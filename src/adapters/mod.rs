//! Document structure adapters for supported container formats.
//!
//! This module defines the interface that all adapters must implement,
//! along with the navigable tree shape the chapter extractor consumes.
//! Container parsing stays behind this boundary; the rest of the crate
//! only ever sees a `StructuredDocument`.

mod epub;
mod pdf;

pub use epub::EpubAdapter;
pub use pdf::PdfAdapter;

use crate::error::ExtractionError;
use std::path::Path;

/// A loaded document: metadata plus a navigable entry tree.
#[derive(Debug, Clone)]
pub struct StructuredDocument {
    /// The document's title.
    pub title: String,

    /// The document's author.
    pub author: String,

    /// Top-level structural entries in reading order.
    pub entries: Vec<TocEntry>,
}

/// One structural entry: a title, its exclusive text, and nested entries.
#[derive(Debug, Clone)]
pub struct TocEntry {
    /// Entry title.
    pub title: String,

    /// Text belonging to this entry, exclusive of children.
    pub text: String,

    /// Nested entries in reading order.
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// Creates an entry with no children.
    pub fn leaf(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }
}

/// Trait for document structure adapters.
///
/// Each adapter handles a specific container format (EPUB, PDF) and
/// returns the same navigable shape.
pub trait DocumentAdapter {
    /// Returns the human-readable name of this adapter.
    fn name(&self) -> &'static str;

    /// Checks if this adapter can handle the given file, by extension.
    fn supports(&self, path: &Path) -> bool;

    /// Loads the file and returns its structure tree.
    fn load(&self, path: &Path) -> Result<StructuredDocument, ExtractionError>;
}

/// Registry of available adapters.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn DocumentAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// Creates a new registry with all available adapters.
    pub fn new() -> Self {
        let adapters: Vec<Box<dyn DocumentAdapter>> =
            vec![Box::new(EpubAdapter), Box::new(PdfAdapter)];

        Self { adapters }
    }

    /// Finds an adapter that can handle the given file.
    pub fn find_for_path(&self, path: &Path) -> Option<&dyn DocumentAdapter> {
        self.adapters
            .iter()
            .find(|a| a.supports(path))
            .map(|a| a.as_ref())
    }
}

/// Case-insensitive extension check shared by the adapters.
pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
