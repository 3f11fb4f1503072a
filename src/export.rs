//! Multi-format export of processed study artifacts.
//!
//! Serializes a completed book result into the requested output format and
//! writes it under the output directory. Text formats are produced in
//! process; raster formats (PDF page snapshot, PNG) delegate to an external
//! HTML renderer discovered on PATH.
//!
//! CSV quoting is deliberately naive: every field is wrapped in quotes but
//! embedded quotes are not escaped. Known limitation.

use crate::artifact::{
    BookResult, Flashcard, MindMap, MindMapArrow, ProcessingMode, QuizQuestion,
};
use crate::cache::sanitize_file_name;
use crate::error::ExportError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Formats for the summary/quiz/flashcard modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
    Markdown,
    Pdf,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            "md" | "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Pdf => "pdf",
        })
    }
}

/// A record that knows its CSV header and field rendering.
trait CsvRecord {
    fn headers() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

impl CsvRecord for QuizQuestion {
    fn headers() -> &'static [&'static str] {
        &["question", "options", "correctAnswerIndex", "answerLocation"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.question.clone(),
            self.options.join(","),
            self.correct_answer_index.to_string(),
            self.answer_location.clone(),
        ]
    }
}

impl CsvRecord for Flashcard {
    fn headers() -> &'static [&'static str] {
        &["front", "back", "answerLocation"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.front.clone(),
            self.back.clone(),
            self.answer_location.clone(),
        ]
    }
}

/// One chapter's summary as a flat CSV/JSON row.
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    title: &'a str,
    summary: &'a str,
}

impl CsvRecord for SummaryRow<'_> {
    fn headers() -> &'static [&'static str] {
        &["title", "summary"]
    }

    fn fields(&self) -> Vec<String> {
        vec![self.title.to_string(), self.summary.to_string()]
    }
}

/// Exports a completed book result in the requested format.
///
/// Returns the path of the written file. The mind-map mode resolves the
/// format against its own capability table; everything else goes through
/// [`ExportFormat`].
pub async fn export_book(
    book: &BookResult,
    mode: ProcessingMode,
    format_name: &str,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    match mode {
        ProcessingMode::Mindmap => export_mind_maps(book, format_name, output_dir).await,
        ProcessingMode::Quiz => {
            let format = format_name.parse()?;
            let questions: Vec<&QuizQuestion> = book
                .chapters
                .iter()
                .flat_map(|chapter| chapter.quiz.iter().flatten())
                .collect();
            if questions.is_empty() {
                return Err(ExportError::Empty);
            }

            match format {
                ExportFormat::Json => {
                    write_export(output_dir, &book.title, "json", &pretty_json(&questions)?)
                }
                ExportFormat::Csv => {
                    write_export(output_dir, &book.title, "csv", &csv_document(&questions)?)
                }
                ExportFormat::Html => write_export(
                    output_dir,
                    &book.title,
                    "html",
                    &quiz_html(&book.title, &questions),
                ),
                ExportFormat::Pdf => {
                    rasterize_to(output_dir, &book.title, &quiz_html(&book.title, &questions))
                        .await
                }
                ExportFormat::Markdown => {
                    Err(ExportError::UnsupportedFormat(format_name.to_string()))
                }
            }
        }
        ProcessingMode::Flashcard => {
            let format = format_name.parse()?;
            let cards: Vec<&Flashcard> = book
                .chapters
                .iter()
                .flat_map(|chapter| chapter.flashcards.iter().flatten())
                .collect();
            if cards.is_empty() {
                return Err(ExportError::Empty);
            }

            match format {
                ExportFormat::Json => {
                    write_export(output_dir, &book.title, "json", &pretty_json(&cards)?)
                }
                ExportFormat::Csv => {
                    write_export(output_dir, &book.title, "csv", &csv_document(&cards)?)
                }
                ExportFormat::Html => write_export(
                    output_dir,
                    &book.title,
                    "html",
                    &flashcard_html(&book.title, &cards),
                ),
                ExportFormat::Pdf => {
                    rasterize_to(output_dir, &book.title, &flashcard_html(&book.title, &cards))
                        .await
                }
                ExportFormat::Markdown => {
                    Err(ExportError::UnsupportedFormat(format_name.to_string()))
                }
            }
        }
        ProcessingMode::Summary => {
            let format = format_name.parse()?;
            let rows: Vec<SummaryRow<'_>> = book
                .chapters
                .iter()
                .filter_map(|chapter| {
                    chapter.summary.as_deref().map(|summary| SummaryRow {
                        title: &chapter.title,
                        summary,
                    })
                })
                .collect();
            if rows.is_empty() {
                return Err(ExportError::Empty);
            }

            match format {
                ExportFormat::Json => {
                    write_export(output_dir, &book.title, "json", &pretty_json(&rows)?)
                }
                ExportFormat::Csv => {
                    write_export(output_dir, &book.title, "csv", &csv_document_owned(&rows)?)
                }
                ExportFormat::Markdown => write_export(
                    output_dir,
                    &book.title,
                    "md",
                    &summary_markdown(&rows),
                ),
                ExportFormat::Html => write_export(
                    output_dir,
                    &book.title,
                    "html",
                    &summary_html(&book.title, &rows),
                ),
                ExportFormat::Pdf => {
                    rasterize_to(output_dir, &book.title, &summary_html(&book.title, &rows)).await
                }
            }
        }
    }
}

/// One mind-map export capability: the format name owns its routine.
struct MindMapExport {
    name: &'static str,
    kind: MindMapExportKind,
}

enum MindMapExportKind {
    Json,
    Html,
    Png,
}

/// Capability table for mind-map-native formats, keyed by format name.
static MIND_MAP_EXPORTS: &[MindMapExport] = &[
    MindMapExport {
        name: "json",
        kind: MindMapExportKind::Json,
    },
    MindMapExport {
        name: "html",
        kind: MindMapExportKind::Html,
    },
    MindMapExport {
        name: "png",
        kind: MindMapExportKind::Png,
    },
];

/// Per-chapter mind map, flattened for serialization.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MindMapRow<'a> {
    chapter: &'a str,
    mind_map: &'a MindMap,
}

async fn export_mind_maps(
    book: &BookResult,
    format_name: &str,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    let requested = format_name.to_lowercase();
    let export = MIND_MAP_EXPORTS
        .iter()
        .find(|e| e.name == requested)
        .ok_or_else(|| ExportError::UnsupportedFormat(format_name.to_string()))?;

    let maps: Vec<MindMapRow<'_>> = book
        .chapters
        .iter()
        .filter_map(|chapter| {
            chapter.mind_map.as_ref().map(|map| MindMapRow {
                chapter: &chapter.title,
                mind_map: map,
            })
        })
        .collect();
    if maps.is_empty() {
        return Err(ExportError::Empty);
    }

    match export.kind {
        MindMapExportKind::Json => {
            write_export(output_dir, &book.title, "json", &pretty_json(&maps)?)
        }
        MindMapExportKind::Html => write_export(
            output_dir,
            &book.title,
            "html",
            &mind_map_html(&book.title, &maps),
        ),
        MindMapExportKind::Png => {
            let html = mind_map_html(&book.title, &maps);
            let target = export_path(output_dir, &book.title, "png")?;
            rasterize_html(&html, "wkhtmltoimage", &target).await?;
            Ok(target)
        }
    }
}

/// The book-level combined mind map with its relation arrows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedMindMap<'a> {
    pub mind_map: &'a MindMap,
    pub arrows: &'a [MindMapArrow],
}

/// Writes the combined book mind map as JSON.
pub fn export_combined_mind_map(
    title: &str,
    combined: &CombinedMindMap<'_>,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    write_export(
        output_dir,
        &format!("{title} - combined"),
        "json",
        &pretty_json(combined)?,
    )
}

fn pretty_json<T: Serialize>(data: &T) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// Header from the record's field names; one row per element, each field
/// individually quoted.
fn csv_document<T: CsvRecord>(rows: &[&T]) -> Result<String, ExportError> {
    if rows.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(T::headers().join(","));
    for row in rows {
        let fields: Vec<String> = row
            .fields()
            .into_iter()
            .map(|field| format!("\"{field}\""))
            .collect();
        lines.push(fields.join(","));
    }

    Ok(lines.join("\n"))
}

fn csv_document_owned<T: CsvRecord>(rows: &[T]) -> Result<String, ExportError> {
    let refs: Vec<&T> = rows.iter().collect();
    csv_document(&refs)
}

fn summary_markdown(rows: &[SummaryRow<'_>]) -> String {
    rows.iter()
        .map(|row| format!("## {}\n{}", row.title, row.summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Minimal entity escaping for text interpolated into HTML documents.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn quiz_html(title: &str, questions: &[&QuizQuestion]) -> String {
    let mut questions_html = String::new();
    for (index, question) in questions.iter().enumerate() {
        let options_html: String = question
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let class = if i == question.correct_answer_index {
                    "option correct"
                } else {
                    "option"
                };
                format!("<div class=\"{class}\">{}</div>\n", escape_html(option))
            })
            .collect();

        let answer = question
            .options
            .get(question.correct_answer_index)
            .map(|o| escape_html(o))
            .unwrap_or_default();

        questions_html.push_str(&format!(
            r#"<div class="question">
  <h3>Question {}: {}</h3>
  <div class="options">{options_html}</div>
  <button onclick="this.nextElementSibling.style.display='block'">Show answer</button>
  <div class="answer" style="display:none;">
    <p><strong>Answer:</strong> {answer}</p>
    <p><em>Source: "{}"</em></p>
  </div>
</div>
"#,
            index + 1,
            escape_html(&question.question),
            escape_html(&question.answer_location),
        ));
    }

    format!(
        r#"<html>
<head>
<title>Quiz: {title}</title>
<style>
  body {{ font-family: sans-serif; margin: 2em; }}
  .question {{ margin-bottom: 2em; border-bottom: 1px solid #ccc; padding-bottom: 1em; }}
  .options {{ display: flex; flex-direction: column; gap: 0.5em; margin: 1em 0; }}
  .option {{ padding: 0.5em; border: 1px solid #eee; border-radius: 5px; }}
  .correct {{ background-color: #e0ffe0; }}
  button {{ padding: 0.5em 1em; cursor: pointer; }}
  .answer {{ margin-top: 1em; padding: 1em; background: #f0f0f0; border-radius: 5px; }}
</style>
</head>
<body>
<h1>Quiz: {title}</h1>
{questions_html}</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn flashcard_html(title: &str, cards: &[&Flashcard]) -> String {
    let mut cards_html = String::new();
    for card in cards {
        cards_html.push_str(&format!(
            r#"<div class="flashcard" onclick="this.classList.toggle('flipped')">
  <div class="front"><p>{}</p></div>
  <div class="back">
    <p>{}</p>
    <p><em>Source: "{}"</em></p>
  </div>
</div>
"#,
            escape_html(&card.front),
            escape_html(&card.back),
            escape_html(&card.answer_location),
        ));
    }

    format!(
        r#"<html>
<head>
<title>Flashcards: {title}</title>
<style>
  body {{ font-family: sans-serif; display: flex; flex-wrap: wrap; gap: 1em; padding: 1em; }}
  .flashcard {{ width: 300px; height: 200px; perspective: 1000px; cursor: pointer; position: relative; }}
  .front, .back {{ position: absolute; width: 100%; height: 100%; backface-visibility: hidden; display: flex; flex-direction: column; justify-content: center; align-items: center; padding: 1em; box-sizing: border-box; border: 1px solid #ccc; border-radius: 10px; transition: transform 0.6s; }}
  .front {{ background: #fff; }}
  .back {{ background: #f9f9f9; transform: rotateY(180deg); }}
  .flashcard.flipped .front {{ transform: rotateY(180deg); }}
  .flashcard.flipped .back {{ transform: rotateY(0deg); }}
</style>
</head>
<body>
{cards_html}</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn summary_html(title: &str, rows: &[SummaryRow<'_>]) -> String {
    let chapters_html: String = rows
        .iter()
        .map(|row| {
            format!(
                "<section>\n<h2>{}</h2>\n<p>{}</p>\n</section>\n",
                escape_html(row.title),
                escape_html(row.summary).replace('\n', "<br>\n"),
            )
        })
        .collect();

    format!(
        r#"<html>
<head>
<title>Summary: {title}</title>
<style>
  body {{ font-family: sans-serif; margin: 2em; max-width: 48em; }}
  section {{ margin-bottom: 2em; }}
</style>
</head>
<body>
<h1>{title}</h1>
{chapters_html}</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn mind_map_html(title: &str, maps: &[MindMapRow<'_>]) -> String {
    let mut body = String::new();
    for row in maps {
        body.push_str(&format!("<section>\n<h2>{}</h2>\n", escape_html(row.chapter)));
        body.push_str("<ul>\n");
        render_node(&row.mind_map.node_data, &mut body);
        body.push_str("</ul>\n</section>\n");
    }

    format!(
        r#"<html>
<head>
<title>Mind map: {title}</title>
<style>
  body {{ font-family: sans-serif; margin: 2em; }}
  ul {{ list-style: none; border-left: 1px solid #ccc; padding-left: 1.5em; }}
  li {{ margin: 0.3em 0; }}
</style>
</head>
<body>
<h1>{title}</h1>
{body}</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn render_node(node: &crate::artifact::MindMapNode, out: &mut String) {
    out.push_str(&format!("<li>{}", escape_html(&node.topic)));
    if !node.children.is_empty() {
        out.push_str("\n<ul>\n");
        for child in &node.children {
            render_node(child, out);
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</li>\n");
}

/// Renders HTML with the external renderer and writes the PDF snapshot.
async fn rasterize_to(
    output_dir: &Path,
    title: &str,
    html: &str,
) -> Result<PathBuf, ExportError> {
    let target = export_path(output_dir, title, "pdf")?;
    rasterize_html(html, "wkhtmltopdf", &target).await?;
    Ok(target)
}

/// Writes the HTML to a transient render target, runs the external tool,
/// and removes the target on both success and failure paths.
async fn rasterize_html(html: &str, tool: &str, target: &Path) -> Result<(), ExportError> {
    let binary = which::which(tool).map_err(|_| ExportError::RendererMissing(tool.to_string()))?;

    let temp = std::env::temp_dir().join(format!("benkyo-render-{}.html", std::process::id()));
    std::fs::write(&temp, html)?;

    let result = tokio::process::Command::new(&binary)
        .arg(&temp)
        .arg(target)
        .output()
        .await;

    let _ = std::fs::remove_file(&temp);

    let output = result.map_err(|e| ExportError::Renderer(e.to_string()))?;
    if !output.status.success() {
        return Err(ExportError::Renderer(format!(
            "{tool} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim(),
        )));
    }

    Ok(())
}

fn export_path(output_dir: &Path, title: &str, extension: &str) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(output_dir)?;
    Ok(output_dir.join(format!("{}.{extension}", sanitize_file_name(title))))
}

fn write_export(
    output_dir: &Path,
    title: &str,
    extension: &str,
    content: &str,
) -> Result<PathBuf, ExportError> {
    let path = export_path(output_dir, title, extension)?;
    std::fs::write(&path, content)?;
    Ok(path)
}
