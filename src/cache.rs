//! Content cache for generated study artifacts.
//!
//! Maps `(document name, chapter id, processing mode)` to a previously
//! produced artifact so the AI layer is never invoked twice for the same
//! work. One pretty-printed JSON file per document, loaded lazily and
//! written through on every mutation. Entries never expire on their own;
//! invalidation is always explicit.

use crate::artifact::{Artifact, ProcessingMode};
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A cached artifact with its creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub artifact: Artifact,
    pub created_at: DateTime<Utc>,
}

/// On-disk shape of one document's cache file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DocumentCache {
    entries: HashMap<String, CacheEntry>,
}

/// Session-local artifact cache backed by per-document JSON files.
pub struct ContentCache {
    cache_dir: PathBuf,
    documents: HashMap<String, DocumentCache>,
}

impl ContentCache {
    /// Creates a cache rooted at the given directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            documents: HashMap::new(),
        }
    }

    /// Returns the cached artifact for the exact key, if any.
    pub fn get(
        &mut self,
        document_name: &str,
        chapter_id: &str,
        mode: ProcessingMode,
    ) -> Option<&Artifact> {
        let key = entry_key(chapter_id, mode);
        self.document(document_name)
            .entries
            .get(&key)
            .map(|entry| &entry.artifact)
    }

    /// Stores an artifact, silently overwriting any previous entry for the key.
    pub fn put(
        &mut self,
        document_name: &str,
        chapter_id: &str,
        mode: ProcessingMode,
        artifact: Artifact,
    ) -> Result<(), CacheError> {
        let key = entry_key(chapter_id, mode);
        self.document(document_name).entries.insert(
            key,
            CacheEntry {
                artifact,
                created_at: Utc::now(),
            },
        );
        self.save(document_name)
    }

    /// Removes a single entry. Returns true if an entry existed.
    pub fn clear(
        &mut self,
        document_name: &str,
        chapter_id: &str,
        mode: ProcessingMode,
    ) -> Result<bool, CacheError> {
        let key = entry_key(chapter_id, mode);
        let existed = self.document(document_name).entries.remove(&key).is_some();
        if existed {
            self.save(document_name)?;
        }
        Ok(existed)
    }

    /// Removes every entry for a document, including its cache file.
    pub fn clear_all(&mut self, document_name: &str) -> Result<(), CacheError> {
        self.documents.remove(document_name);
        let path = self.document_path(document_name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Returns the document's cache, loading it from disk on first touch.
    fn document(&mut self, document_name: &str) -> &mut DocumentCache {
        if !self.documents.contains_key(document_name) {
            let loaded = self.load(document_name);
            self.documents.insert(document_name.to_string(), loaded);
        }
        self.documents
            .get_mut(document_name)
            .expect("document cache was just inserted")
    }

    /// Loads a document cache file. A missing or corrupt file is an empty
    /// cache, not an error: the worst case is regeneration.
    fn load(&self, document_name: &str) -> DocumentCache {
        let path = self.document_path(document_name);
        if !path.exists() {
            return DocumentCache::default();
        }
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Writes a document's cache file.
    fn save(&self, document_name: &str) -> Result<(), CacheError> {
        let Some(document) = self.documents.get(document_name) else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.cache_dir)?;
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(self.document_path(document_name), content)?;
        Ok(())
    }

    fn document_path(&self, document_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", sanitize_file_name(document_name)))
    }

    /// The directory this cache writes into.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Exact composite key; no partial matching.
fn entry_key(chapter_id: &str, mode: ProcessingMode) -> String {
    format!("{chapter_id}::{mode}")
}

/// Keeps document names safe as file names.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect()
}
