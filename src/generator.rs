//! AI orchestration layer.
//!
//! Builds mode-specific prompts, drives a configured backend provider and
//! coerces its free-text responses into strict structured data. Backends
//! routinely wrap JSON in explanatory prose or code fences despite
//! instructions, so every structured mode shares one two-stage repair:
//! parse the raw text, else parse the first fenced block, else fail.

use crate::artifact::{
    Artifact, Flashcard, MindMap, MindMapArrow, ProcessingMode, QuizQuestion,
};
use crate::config::{ApiConfig, GenerationConfig, ProcessingConfig, Provider};
use crate::error::GenerationError;
use crate::extractor::ChapterUnit;
use crate::prompts;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// First fenced code block, regardless of declared language tag.
static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").expect("Invalid CODE_FENCE_REGEX")
});

/// The one capability the orchestrator needs from a provider.
///
/// The API record is passed on every call, so configuration edits take
/// effect between calls without rebuilding anything.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Sends a prompt and returns the backend's raw text. The output-language
    /// directive is appended last, after the whole prompt, so custom
    /// instructions cannot override it.
    async fn generate(
        &self,
        api: &ApiConfig,
        prompt: &str,
        language: &str,
    ) -> Result<String, GenerationError>;
}

/// HTTP backend dispatching on the configured provider shape.
pub struct HttpBackend {
    client: Client,
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBackend {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Google REST shape: one combined prompt string plus a temperature.
    async fn generate_gemini(
        &self,
        api: &ApiConfig,
        prompt: &str,
        language: &str,
    ) -> Result<String, GenerationError> {
        let final_prompt = format!(
            "{prompt}\n\n**{}**",
            prompts::language_instruction(language)
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: final_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: api.effective_temperature(),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            api.endpoint_base(),
            api.effective_model(),
            api.key
        );

        let response = self.client.post(&url).json(&request).send().await?;
        let response = check_status(response).await?;

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(GenerationError::Http)?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        Ok(text)
    }

    /// Chat-completions shape: a message list over a synchronous
    /// request/response call, text taken from the first choice.
    async fn generate_chat(
        &self,
        api: &ApiConfig,
        prompt: &str,
        language: &str,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: api.effective_model().to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!(
                    "{prompt}\n\n{}",
                    prompts::language_instruction(language)
                ),
            }],
            temperature: api.effective_temperature(),
        };

        let url = format!("{}/chat/completions", api.endpoint_base());
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api.key))
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(GenerationError::Http)?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(text)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn generate(
        &self,
        api: &ApiConfig,
        prompt: &str,
        language: &str,
    ) -> Result<String, GenerationError> {
        match api.provider {
            Provider::Gemini => self.generate_gemini(api, prompt, language).await,
            Provider::OpenAi => self.generate_chat(api, prompt, language).await,
        }
    }
}

/// Maps a non-success status to an API error with the body preserved.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenerationError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Api { status, body });
    }
    Ok(response)
}

/// Request body for the Google generateContent API.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Request body for the chat completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Wire wrapper the quiz prompt asks for.
#[derive(Debug, Deserialize)]
struct QuizPayload {
    questions: Vec<QuizQuestion>,
}

/// Wire wrapper the flashcard prompt asks for.
#[derive(Debug, Deserialize)]
struct FlashcardPayload {
    flashcards: Vec<Flashcard>,
}

/// Wire wrapper the arrow prompt asks for.
#[derive(Debug, Deserialize)]
struct ArrowsPayload {
    arrows: Vec<MindMapArrow>,
}

/// Two-stage structured parse: raw text, else first fenced block, else fail.
pub fn parse_structured<T: DeserializeOwned>(raw: &str, mode: &str) -> Result<T, GenerationError> {
    let trimmed = raw.trim();

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(direct_error) => {
            if let Some(captures) = CODE_FENCE_REGEX.captures(trimmed)
                && let Some(inner) = captures.get(1)
            {
                return serde_json::from_str(inner.as_str().trim()).map_err(|e| {
                    GenerationError::Format {
                        mode: mode.to_string(),
                        message: e.to_string(),
                    }
                });
            }
            Err(GenerationError::Format {
                mode: mode.to_string(),
                message: direct_error.to_string(),
            })
        }
    }
}

/// Orchestrates per-chapter generation over any backend.
pub struct Generator<B = HttpBackend> {
    backend: B,
    delay_between_requests_sec: f64,
}

impl Generator<HttpBackend> {
    /// Creates a generator talking HTTP to the configured provider.
    pub fn new(generation: &GenerationConfig) -> Self {
        Self {
            backend: HttpBackend::new(),
            delay_between_requests_sec: generation.delay_between_requests_sec,
        }
    }
}

impl<B: Backend> Generator<B> {
    /// Creates a generator over a custom backend (used by tests).
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            delay_between_requests_sec: 0.0,
        }
    }

    /// Test-only access to the underlying backend.
    #[cfg(test)]
    pub(crate) fn backend_ref(&self) -> &B {
        &self.backend
    }

    async fn generate(
        &self,
        api: &ApiConfig,
        prompt: &str,
        language: &str,
    ) -> Result<String, GenerationError> {
        if self.delay_between_requests_sec > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(self.delay_between_requests_sec)).await;
        }
        self.backend.generate(api, prompt, language).await
    }

    /// Produces the artifact for one chapter in the configured mode.
    pub async fn process(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        unit: &ChapterUnit,
    ) -> Result<Artifact, GenerationError> {
        match processing.mode {
            ProcessingMode::Summary => self
                .summarize(api, processing, &unit.title, &unit.content)
                .await
                .map(Artifact::Summary),
            ProcessingMode::Mindmap => self
                .generate_mind_map(api, processing, &unit.content)
                .await
                .map(Artifact::Mindmap),
            ProcessingMode::Quiz => self
                .generate_quiz(api, processing, &unit.title, &unit.content)
                .await
                .map(Artifact::Quiz),
            ProcessingMode::Flashcard => self
                .generate_flashcards(api, processing, &unit.title, &unit.content)
                .await
                .map(Artifact::Flashcard),
        }
    }

    /// Summarizes one chapter. Fails on empty or whitespace-only prose.
    pub async fn summarize(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        title: &str,
        content: &str,
    ) -> Result<String, GenerationError> {
        let prompt = prompts::apply_custom_instructions(
            prompts::summary_prompt(title, content, processing.book_type),
            &processing.custom_instructions,
        );

        let summary = self
            .generate(api, &prompt, &processing.output_language)
            .await
            .map_err(|e| GenerationError::stage("summary", e))?;

        let trimmed = summary.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::stage(
                "summary",
                GenerationError::EmptyResponse,
            ));
        }

        Ok(trimmed.to_string())
    }

    /// Generates a mind map for one chapter.
    pub async fn generate_mind_map(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        content: &str,
    ) -> Result<MindMap, GenerationError> {
        let prompt = prompts::apply_custom_instructions(
            prompts::mind_map_prompt(content),
            &processing.custom_instructions,
        );

        let raw = self
            .generate(api, &prompt, &processing.output_language)
            .await
            .map_err(|e| GenerationError::stage("mind map", e))?;

        if raw.trim().is_empty() {
            return Err(GenerationError::stage(
                "mind map",
                GenerationError::EmptyResponse,
            ));
        }

        parse_structured(&raw, "mindmap").map_err(|e| GenerationError::stage("mind map", e))
    }

    /// Generates a quiz for one chapter. The prompt asks for 5 questions;
    /// whatever count the backend returns is passed through unchanged.
    pub async fn generate_quiz(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        title: &str,
        content: &str,
    ) -> Result<Vec<QuizQuestion>, GenerationError> {
        let prompt = prompts::apply_custom_instructions(
            prompts::quiz_prompt(title, content),
            &processing.custom_instructions,
        );

        let raw = self
            .generate(api, &prompt, &processing.output_language)
            .await
            .map_err(|e| GenerationError::stage("quiz", e))?;

        let payload: QuizPayload =
            parse_structured(&raw, "quiz").map_err(|e| GenerationError::stage("quiz", e))?;

        Ok(payload.questions)
    }

    /// Generates flashcards for one chapter; count passed through unchanged.
    pub async fn generate_flashcards(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        title: &str,
        content: &str,
    ) -> Result<Vec<Flashcard>, GenerationError> {
        let prompt = prompts::apply_custom_instructions(
            prompts::flashcard_prompt(title, content),
            &processing.custom_instructions,
        );

        let raw = self
            .generate(api, &prompt, &processing.output_language)
            .await
            .map_err(|e| GenerationError::stage("flashcard", e))?;

        let payload: FlashcardPayload = parse_structured(&raw, "flashcard")
            .map_err(|e| GenerationError::stage("flashcard", e))?;

        Ok(payload.flashcards)
    }

    /// Generates one mind map covering every selected chapter of the book.
    pub async fn generate_combined_mind_map(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        book_title: &str,
        chapters: &[ChapterUnit],
    ) -> Result<MindMap, GenerationError> {
        let prompt = prompts::apply_custom_instructions(
            prompts::combined_mind_map_prompt(book_title, chapters),
            &processing.custom_instructions,
        );

        let raw = self
            .generate(api, &prompt, &processing.output_language)
            .await
            .map_err(|e| GenerationError::stage("combined mind map", e))?;

        if raw.trim().is_empty() {
            return Err(GenerationError::stage(
                "combined mind map",
                GenerationError::EmptyResponse,
            ));
        }

        parse_structured(&raw, "mindmap")
            .map_err(|e| GenerationError::stage("combined mind map", e))
    }

    /// Generates cross-branch relation arrows for an existing mind map.
    pub async fn generate_mind_map_arrows(
        &self,
        api: &ApiConfig,
        processing: &ProcessingConfig,
        mind_map: &MindMap,
    ) -> Result<Vec<MindMapArrow>, GenerationError> {
        let mind_map_json = serde_json::to_string_pretty(mind_map).map_err(|e| {
            GenerationError::Format {
                mode: "arrows".to_string(),
                message: e.to_string(),
            }
        })?;
        let prompt = prompts::mind_map_arrow_prompt(&mind_map_json);

        let raw = self
            .generate(api, &prompt, &processing.output_language)
            .await
            .map_err(|e| GenerationError::stage("mind map arrow", e))?;

        let payload: ArrowsPayload = parse_structured(&raw, "arrows")
            .map_err(|e| GenerationError::stage("mind map arrow", e))?;

        Ok(payload.arrows)
    }

    /// Fires a trivial prompt to verify the configured backend responds.
    pub async fn test_connection(&self, api: &ApiConfig) -> bool {
        match self
            .generate(api, &prompts::test_connection_prompt(), "English")
            .await
        {
            Ok(text) => text.contains("Connection successful") || text.contains("successful"),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned responses and records what it was asked.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        responses: Mutex<VecDeque<String>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) last_request: Mutex<Option<(String, String)>>,
    }

    impl ScriptedBackend {
        pub(crate) fn with_responses(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn generate(
            &self,
            _api: &ApiConfig,
            prompt: &str,
            language: &str,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some((prompt.to_string(), language.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(GenerationError::EmptyResponse)
        }
    }

    fn api() -> ApiConfig {
        ApiConfig::default()
    }

    fn processing() -> ProcessingConfig {
        ProcessingConfig::default()
    }

    const QUIZ_JSON: &str = r#"{"questions":[{"question":"Q1?","options":["a","b","c","d"],"correctAnswerIndex":2,"answerLocation":"loc"}]}"#;

    #[test]
    fn test_parse_structured_direct() {
        let map: MindMap =
            parse_structured(r#"{"nodeData":{"id":"r","topic":"t"}}"#, "mindmap").unwrap();
        assert_eq!(map.node_data.topic, "t");
    }

    #[test]
    fn test_parse_structured_recovers_fenced_block() {
        let raw = format!(
            "Sure! Here is the quiz you asked for:\n```json\n{QUIZ_JSON}\n```\nLet me know if you need more."
        );
        let payload: QuizPayload = parse_structured(&raw, "quiz").unwrap();
        assert_eq!(payload.questions.len(), 1);
        assert_eq!(payload.questions[0].correct_answer_index, 2);
    }

    #[test]
    fn test_parse_structured_fence_without_language_tag() {
        let raw = format!("```\n{QUIZ_JSON}\n```");
        let payload: QuizPayload = parse_structured(&raw, "quiz").unwrap();
        assert_eq!(payload.questions.len(), 1);
    }

    #[test]
    fn test_parse_structured_fails_with_mode_name() {
        let err = parse_structured::<MindMap>("not json, no fence", "mindmap").unwrap_err();
        match err {
            GenerationError::Format { mode, .. } => assert_eq!(mode, "mindmap"),
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_structured_fails_when_fence_is_also_invalid() {
        let raw = "intro\n```json\n{broken\n```";
        assert!(matches!(
            parse_structured::<MindMap>(raw, "mindmap"),
            Err(GenerationError::Format { .. })
        ));
    }

    #[tokio::test]
    async fn test_summarize_empty_response_is_error() {
        let generator = Generator::with_backend(ScriptedBackend::with_responses(&[""]));
        let err = generator
            .summarize(&api(), &processing(), "T", "C")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("summary generation failed"));
    }

    #[tokio::test]
    async fn test_summarize_trims_response() {
        let generator =
            Generator::with_backend(ScriptedBackend::with_responses(&["  A fine summary.  \n"]));
        let summary = generator
            .summarize(&api(), &processing(), "T", "C")
            .await
            .unwrap();
        assert_eq!(summary, "A fine summary.");
    }

    #[tokio::test]
    async fn test_quiz_count_passed_through() {
        // Prompt asks for 5; backend returned 1 and that is what we keep
        let generator = Generator::with_backend(ScriptedBackend::with_responses(&[QUIZ_JSON]));
        let questions = generator
            .generate_quiz(&api(), &processing(), "T", "C")
            .await
            .unwrap();

        assert_eq!(questions.len(), 1);
        assert!(questions.iter().all(QuizQuestion::is_valid));
    }

    #[tokio::test]
    async fn test_mind_map_fence_repair_end_to_end() {
        let raw = "Here you go:\n```json\n{\"nodeData\":{\"id\":\"r\",\"topic\":\"Root\"}}\n```";
        let generator = Generator::with_backend(ScriptedBackend::with_responses(&[raw]));
        let map = generator
            .generate_mind_map(&api(), &processing(), "content")
            .await
            .unwrap();
        assert_eq!(map.node_data.topic, "Root");
    }

    #[tokio::test]
    async fn test_custom_instructions_and_language_reach_backend() {
        let backend = ScriptedBackend::with_responses(&["ok"]);
        let generator = Generator::with_backend(backend);

        let mut options = processing();
        options.custom_instructions = " focus on key dates ".to_string();
        options.output_language = "French".to_string();

        let _ = generator.summarize(&api(), &options, "T", "C").await;

        let request = generator.backend.last_request.lock().unwrap().clone().unwrap();
        assert!(request.0.contains("Additional instructions: focus on key dates"));
        assert_eq!(request.1, "French");
    }

    #[tokio::test]
    async fn test_flashcards_parse() {
        let raw = r#"{"flashcards":[{"front":"F","back":"B","answerLocation":"L"}]}"#;
        let generator = Generator::with_backend(ScriptedBackend::with_responses(&[raw]));
        let cards = generator
            .generate_flashcards(&api(), &processing(), "T", "C")
            .await
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, "F");
    }

    #[tokio::test]
    async fn test_arrows_parse() {
        let map: MindMap =
            serde_json::from_str(r#"{"nodeData":{"id":"r","topic":"t"}}"#).unwrap();
        let raw = r#"{"arrows":[{"label":"causes","from":"a","to":"b"}]}"#;
        let generator = Generator::with_backend(ScriptedBackend::with_responses(&[raw]));
        let arrows = generator
            .generate_mind_map_arrows(&api(), &processing(), &map)
            .await
            .unwrap();
        assert_eq!(arrows.len(), 1);
        assert_eq!(arrows[0].label, "causes");
    }

    #[tokio::test]
    async fn test_connection_check() {
        let generator =
            Generator::with_backend(ScriptedBackend::with_responses(&["Connection successful"]));
        assert!(generator.test_connection(&api()).await);

        let generator = Generator::with_backend(ScriptedBackend::with_responses(&[]));
        assert!(!generator.test_connection(&api()).await);
    }
}
