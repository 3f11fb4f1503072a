//! Benkyo - turn EPUB and PDF books into study artifacts.
//!
//! This library provides functionality for:
//! - Extracting chapters from EPUB and PDF documents with depth and
//!   essentiality controls
//! - Driving a generative backend (Gemini or OpenAI-compatible) per chapter
//!   to produce summaries, mind maps, quizzes and flashcards
//! - Caching generated artifacts so nothing is paid for twice
//! - Exporting results to JSON, CSV, HTML, Markdown, PDF and PNG

pub mod adapters;
pub mod artifact;
pub mod cache;
pub mod config;
pub mod console;
pub mod error;
pub mod export;
pub mod extractor;
pub mod generator;
pub mod pipeline;
pub mod prompts;

// Re-export commonly used types
pub use adapters::{AdapterRegistry, DocumentAdapter, StructuredDocument, TocEntry};
pub use artifact::{
    Artifact, BookResult, BookType, ChapterResult, Flashcard, MindMap, MindMapArrow, MindMapNode,
    ProcessingMode, QuizQuestion,
};
pub use cache::ContentCache;
pub use config::Config;
pub use console::Console;
pub use error::{CacheError, ConfigError, ExportError, ExtractionError, GenerationError};
pub use extractor::{ChapterUnit, ExtractOptions, extract};
pub use generator::{Backend, Generator, HttpBackend};
pub use pipeline::{BookIdentity, process_book};
