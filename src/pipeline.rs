//! Sequential per-chapter processing flow.
//!
//! Chapters are processed one at a time in reading order; each backend
//! call is awaited to completion before the next chapter starts, so
//! progress always reflects a strict prefix of completed chapters. The
//! first failure aborts the run and discards the accumulator; cache
//! writes already committed stay committed.

use crate::artifact::{BookResult, ChapterResult};
use crate::cache::ContentCache;
use crate::config::{ApiConfig, ProcessingConfig};
use crate::console::Console;
use crate::error::GenerationError;
use crate::extractor::ChapterUnit;
use crate::generator::{Backend, Generator};

/// Identity of the book being processed.
#[derive(Debug, Clone, Copy)]
pub struct BookIdentity<'a> {
    /// The source file's name; part of every cache key.
    pub document_name: &'a str,
    pub title: &'a str,
    pub author: &'a str,
}

/// Processes the selected chapters and folds them into a book result.
///
/// The cache is consulted before every generation and written after every
/// success; a hit returns the stored artifact byte-for-byte.
pub async fn process_book<B: Backend>(
    generator: &Generator<B>,
    api: &ApiConfig,
    processing: &ProcessingConfig,
    book: BookIdentity<'_>,
    chapters: &[ChapterUnit],
    cache: &mut ContentCache,
    console: &Console,
) -> Result<BookResult, GenerationError> {
    let total = chapters.len();
    let mut results: Vec<ChapterResult> = Vec::with_capacity(total);

    for (index, unit) in chapters.iter().enumerate() {
        console.step(&format!(
            "Processing chapter {}/{}: {}",
            index + 1,
            total,
            unit.title
        ));

        let cached = cache
            .get(book.document_name, &unit.id, processing.mode)
            .cloned();

        let artifact = match cached {
            Some(artifact) => {
                console.info("Using cached result");
                artifact
            }
            None => {
                let artifact = generator.process(api, processing, unit).await?;
                // Losing a cache write only costs a regeneration later;
                // it must not abort a run that is otherwise succeeding
                if let Err(e) = cache.put(
                    book.document_name,
                    &unit.id,
                    processing.mode,
                    artifact.clone(),
                ) {
                    console.warning(&format!("Failed to persist cache entry: {e}"));
                }
                artifact
            }
        };

        results.push(ChapterResult::from_unit(unit, artifact));
    }

    Ok(BookResult {
        title: book.title.to_string(),
        author: book.author.to_string(),
        chapters: results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, ProcessingMode};
    use crate::error::GenerationError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Replays canned responses, counting how often it is invoked.
    #[derive(Default)]
    struct ScriptedBackend {
        responses: Mutex<VecDeque<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn with_responses(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn generate(
            &self,
            _api: &ApiConfig,
            _prompt: &str,
            _language: &str,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(GenerationError::EmptyResponse)
        }
    }

    fn chapter(id: &str, title: &str, order: usize) -> ChapterUnit {
        ChapterUnit {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("Content of {title}."),
            depth: 0,
            order,
        }
    }

    fn book() -> BookIdentity<'static> {
        BookIdentity {
            document_name: "book.epub",
            title: "A Book",
            author: "An Author",
        }
    }

    fn quiz_response() -> &'static str {
        r#"{"questions":[{"question":"Q?","options":["a","b","c","d"],"correctAnswerIndex":0,"answerLocation":"loc"}]}"#
    }

    #[tokio::test]
    async fn test_three_chapter_quiz_run() {
        let dir = TempDir::new().unwrap();
        let mut cache = ContentCache::new(dir.path());
        let console = Console::with_colors(false);

        let backend =
            ScriptedBackend::with_responses(&[quiz_response(), quiz_response(), quiz_response()]);
        let generator = Generator::with_backend(backend);

        let chapters = vec![
            chapter("c1", "One", 0),
            chapter("c2", "Two", 1),
            chapter("c3", "Three", 2),
        ];

        let mut processing = ProcessingConfig::default();
        processing.mode = ProcessingMode::Quiz;

        let result = process_book(
            &generator,
            &ApiConfig::default(),
            &processing,
            book(),
            &chapters,
            &mut cache,
            &console,
        )
        .await
        .unwrap();

        assert_eq!(result.chapters.len(), 3);
        for (index, chapter) in result.chapters.iter().enumerate() {
            assert!(chapter.processed);
            assert_eq!(chapter.order, index);
            let quiz = chapter.quiz.as_ref().unwrap();
            assert!(!quiz.is_empty());
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let dir = TempDir::new().unwrap();
        let mut cache = ContentCache::new(dir.path());
        let console = Console::with_colors(false);

        let cached = Artifact::Flashcard(vec![crate::artifact::Flashcard {
            front: "F".to_string(),
            back: "B".to_string(),
            answer_location: "L".to_string(),
        }]);
        cache
            .put("book.epub", "c1", ProcessingMode::Flashcard, cached.clone())
            .unwrap();

        let backend = ScriptedBackend::with_responses(&[]);
        let generator = Generator::with_backend(backend);

        let mut processing = ProcessingConfig::default();
        processing.mode = ProcessingMode::Flashcard;

        let result = process_book(
            &generator,
            &ApiConfig::default(),
            &processing,
            book(),
            &[chapter("c1", "One", 0)],
            &mut cache,
            &console,
        )
        .await
        .unwrap();

        // The backend was never invoked and the artifact is unchanged
        assert_eq!(generator_calls(&generator), 0);
        let cards = result.chapters[0].flashcards.as_ref().unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "F");
    }

    #[tokio::test]
    async fn test_first_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let mut cache = ContentCache::new(dir.path());
        let console = Console::with_colors(false);

        // First chapter succeeds, second returns unparseable text
        let backend = ScriptedBackend::with_responses(&[quiz_response(), "not json"]);
        let generator = Generator::with_backend(backend);

        let chapters = vec![
            chapter("c1", "One", 0),
            chapter("c2", "Two", 1),
            chapter("c3", "Three", 2),
        ];

        let mut processing = ProcessingConfig::default();
        processing.mode = ProcessingMode::Quiz;

        let err = process_book(
            &generator,
            &ApiConfig::default(),
            &processing,
            book(),
            &chapters,
            &mut cache,
            &console,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("quiz generation failed"));
        // The third chapter was never attempted
        assert_eq!(generator_calls(&generator), 2);
        // The first chapter's successful write survives the abort
        assert!(
            cache
                .get("book.epub", "c1", ProcessingMode::Quiz)
                .is_some()
        );
        assert!(
            cache
                .get("book.epub", "c3", ProcessingMode::Quiz)
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_successful_run_populates_cache() {
        let dir = TempDir::new().unwrap();
        let mut cache = ContentCache::new(dir.path());
        let console = Console::with_colors(false);

        let backend = ScriptedBackend::with_responses(&["A summary."]);
        let generator = Generator::with_backend(backend);

        let mut processing = ProcessingConfig::default();
        processing.mode = ProcessingMode::Summary;

        process_book(
            &generator,
            &ApiConfig::default(),
            &processing,
            book(),
            &[chapter("c1", "One", 0)],
            &mut cache,
            &console,
        )
        .await
        .unwrap();

        assert_eq!(
            cache.get("book.epub", "c1", ProcessingMode::Summary),
            Some(&Artifact::Summary("A summary.".to_string()))
        );
    }

    fn generator_calls(generator: &Generator<ScriptedBackend>) -> usize {
        generator.backend_ref().call_count()
    }
}
