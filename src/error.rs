//! Error types for the Benkyo pipeline.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Error type for chapter extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The document could not be opened or its structure read
    #[error("Failed to read document: {0}")]
    Unreadable(String),

    /// The document yielded no usable text
    #[error("Document contains no usable text")]
    EmptyDocument,

    /// No adapter is registered for this file type
    #[error("Unsupported document type: {0}")]
    UnsupportedDocument(String),

    /// Filesystem access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for AI generation operations.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// HTTP request to the backend failed
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status
    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Backend returned empty or whitespace-only text
    #[error("Backend returned an empty response")]
    EmptyResponse,

    /// Structured-data parse failed even after fenced-block repair
    #[error("{mode} response is not valid structured data: {message}")]
    Format { mode: String, message: String },

    /// A generation step failed; wraps the underlying error with the step name
    #[error("{stage} generation failed: {message}")]
    Stage { stage: String, message: String },
}

impl GenerationError {
    /// Wraps an error with the name of the generation step that produced it,
    /// preserving the underlying message.
    pub fn stage(stage: &str, source: GenerationError) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            message: source.to_string(),
        }
    }
}

/// Error type for the content cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to read or write the cache file
    #[error("Failed to access cache file: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file contents could not be parsed
    #[error("Failed to parse cache file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error type for export operations.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The requested format is not recognized for the given mode
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// There is nothing to serialize
    #[error("No data to export")]
    Empty,

    /// Failed to write the output file
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the data
    #[error("Failed to serialize export data: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No external renderer is installed for raster output
    #[error("Renderer not found: install {0} to export this format")]
    RendererMissing(String),

    /// The external renderer ran but failed
    #[error("Renderer failed: {0}")]
    Renderer(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Missing required configuration value
    #[error("Missing required config value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
