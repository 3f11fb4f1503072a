//! Core data model for study artifacts.
//!
//! Every shape that crosses the backend boundary serializes with camelCase
//! field names, matching the JSON the prompts ask the model to produce.

use crate::extractor::ChapterUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of study artifact a processing run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Summary,
    #[default]
    Mindmap,
    Quiz,
    Flashcard,
}

impl ProcessingMode {
    /// Stable lowercase name, used in cache keys and prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Mindmap => "mindmap",
            Self::Quiz => "quiz",
            Self::Flashcard => "flashcard",
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "mindmap" => Ok(Self::Mindmap),
            "quiz" => Ok(Self::Quiz),
            "flashcard" => Ok(Self::Flashcard),
            other => Err(format!(
                "unknown processing mode '{other}' (expected summary, mindmap, quiz or flashcard)"
            )),
        }
    }
}

/// Whether the book is narrative or expository; selects the summary template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BookType {
    Fiction,
    #[default]
    NonFiction,
}

/// A single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    /// Verbatim excerpt from the chapter that contains the answer.
    pub answer_location: String,
}

impl QuizQuestion {
    /// True when `correct_answer_index` points at a real option.
    pub fn is_valid(&self) -> bool {
        self.correct_answer_index < self.options.len()
    }
}

/// A two-sided study card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    pub answer_location: String,
}

/// A rooted tree of labeled nodes, in the mind-elixir wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMap {
    pub node_data: MindMapNode,
}

/// One node of a mind map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MindMapNode {
    pub id: String,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MindMapNode>,
}

impl MindMapNode {
    /// Total node count of the subtree rooted here.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(MindMapNode::size).sum::<usize>()
    }
}

/// A cross-branch relation arrow between two mind-map nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMapArrow {
    pub label: String,
    pub from: String,
    pub to: String,
}

/// The artifact produced for one chapter in one processing mode.
///
/// Tagged so cache files stay readable and self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Artifact {
    Summary(String),
    Mindmap(MindMap),
    Quiz(Vec<QuizQuestion>),
    Flashcard(Vec<Flashcard>),
}

impl Artifact {
    /// The processing mode this artifact belongs to.
    pub fn mode(&self) -> ProcessingMode {
        match self {
            Self::Summary(_) => ProcessingMode::Summary,
            Self::Mindmap(_) => ProcessingMode::Mindmap,
            Self::Quiz(_) => ProcessingMode::Quiz,
            Self::Flashcard(_) => ProcessingMode::Flashcard,
        }
    }
}

/// A chapter unit augmented with the artifact produced for it.
///
/// Exactly one artifact field is populated, matching the run's mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterResult {
    pub id: String,
    pub title: String,
    pub content: String,
    pub depth: u32,
    pub order: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mind_map: Option<MindMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizQuestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flashcards: Option<Vec<Flashcard>>,
    pub processed: bool,
}

impl ChapterResult {
    /// Builds a result from a chapter unit and its generated artifact.
    pub fn from_unit(unit: &ChapterUnit, artifact: Artifact) -> Self {
        let mut result = Self {
            id: unit.id.clone(),
            title: unit.title.clone(),
            content: unit.content.clone(),
            depth: unit.depth,
            order: unit.order,
            summary: None,
            mind_map: None,
            quiz: None,
            flashcards: None,
            processed: true,
        };
        match artifact {
            Artifact::Summary(text) => result.summary = Some(text),
            Artifact::Mindmap(map) => result.mind_map = Some(map),
            Artifact::Quiz(questions) => result.quiz = Some(questions),
            Artifact::Flashcard(cards) => result.flashcards = Some(cards),
        }
        result
    }
}

/// The complete, immutable set of per-chapter artifacts for one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookResult {
    pub title: String,
    pub author: String,
    pub chapters: Vec<ChapterResult>,
}
