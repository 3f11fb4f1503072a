//! Benkyo CLI - turn an EPUB or PDF book into study artifacts.

use anyhow::{Context, Result};
use benkyo::adapters::AdapterRegistry;
use benkyo::artifact::ProcessingMode;
use benkyo::cache::ContentCache;
use benkyo::config::Config;
use benkyo::console::Console;
use benkyo::export::{self, CombinedMindMap};
use benkyo::extractor::{self, ChapterUnit, ExtractOptions};
use benkyo::generator::Generator;
use benkyo::pipeline::{self, BookIdentity};
use clap::Parser;
use std::path::PathBuf;

/// Turn an EPUB or PDF book into study artifacts with a generative backend.
#[derive(Parser, Debug)]
#[command(name = "benkyo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the book (.epub or .pdf).
    book_path: PathBuf,

    /// Processing mode: summary, mindmap, quiz or flashcard (default from config).
    #[arg(long)]
    mode: Option<String>,

    /// Process from chapter N (1-based).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    start: Option<u32>,

    /// Process up to chapter N (1-based, inclusive).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    end: Option<u32>,

    /// Export format(s); repeatable. Defaults to json.
    #[arg(long = "export", value_name = "FORMAT")]
    export: Vec<String>,

    /// List extracted chapters and exit without generating anything.
    #[arg(long)]
    list: bool,

    /// Clear every cached artifact for this book and exit.
    #[arg(long)]
    clear_cache: bool,

    /// Drop cached entries for the selected chapters before processing.
    #[arg(long)]
    refresh: bool,

    /// In mindmap mode, also generate a combined book mind map with arrows.
    #[arg(long)]
    combined: bool,

    /// Extra instructions appended to every prompt (overrides config).
    #[arg(long)]
    custom_prompt: Option<String>,

    /// Verify the backend connection and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let console = Console::new();

    console.section("Benkyo - Study Artifact Generator");

    // Load configuration
    console.step("Loading configuration...");
    let mut config = Config::load().context("Failed to load configuration")?;

    if let Some(ref mode) = args.mode {
        config.processing.mode = mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("Invalid --mode")?;
    }
    if let Some(ref custom_prompt) = args.custom_prompt {
        config.processing.custom_instructions = custom_prompt.clone();
    }

    let document_name = args
        .book_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid book path: {}", args.book_path.display()))?;

    let mut cache = ContentCache::new(config.cache_dir().context("Failed to resolve cache dir")?);

    if args.clear_cache {
        cache
            .clear_all(&document_name)
            .context("Failed to clear cache")?;
        console.success(&format!("Cleared cached artifacts for {document_name}"));
        return Ok(());
    }

    let needs_backend = !args.list;
    if needs_backend {
        if !config.api.is_configured() {
            let config_path = Config::config_path()?;
            console.warning(&format!(
                "API key not configured. Please edit: {}",
                config_path.display()
            ));
            console.info("Set your Gemini or OpenAI-compatible API key in the config file and run again.");
            return Ok(());
        }
        config.validate().context("Invalid configuration")?;
    }
    console.success("Configuration loaded");

    let generator = Generator::new(&config.generation);

    if args.check {
        console.step("Testing backend connection...");
        if generator.test_connection(&config.api).await {
            console.success("Backend responded");
        } else {
            console.error("Backend did not respond as expected");
            std::process::exit(1);
        }
        return Ok(());
    }

    // Load the document through the matching adapter
    console.step("Reading document structure...");
    let registry = AdapterRegistry::new();
    let adapter = registry.find_for_path(&args.book_path).ok_or_else(|| {
        benkyo::error::ExtractionError::UnsupportedDocument(args.book_path.display().to_string())
    })?;
    console.info(&format!("Using {} adapter", adapter.name()));

    let document = adapter
        .load(&args.book_path)
        .context("Failed to read document")?;
    console.success(&format!(
        "Loaded \"{}\" by {}",
        document.title, document.author
    ));

    // Extract chapters
    console.step("Extracting chapters...");
    let options = ExtractOptions {
        use_smart_detection: config.processing.use_smart_detection,
        skip_non_essential: config.processing.skip_non_essential_chapters,
        max_sub_chapter_depth: config.processing.max_sub_chapter_depth,
    };
    let chapters = extractor::extract(&document, &options).context("Chapter extraction failed")?;
    console.success(&format!("Extracted {} chapters", chapters.len()));

    if args.list {
        for chapter in &chapters {
            let indent = "  ".repeat(chapter.depth as usize);
            console.info(&format!(
                "{:>3}. {}{} ({} chars)",
                chapter.order + 1,
                indent,
                chapter.title,
                chapter.content.chars().count()
            ));
        }
        return Ok(());
    }

    // Select the requested chapter range
    let selected = select_chapters(&chapters, args.start, args.end, &console)?;

    if args.refresh {
        for chapter in selected {
            cache
                .clear(&document_name, &chapter.id, config.processing.mode)
                .context("Failed to refresh cache")?;
        }
        console.info("Dropped cached entries for the selected chapters");
    }

    // Process sequentially; the first failure aborts the run
    console.step(&format!(
        "Generating {} artifacts for {} chapters...",
        config.processing.mode,
        selected.len()
    ));
    let book = BookIdentity {
        document_name: &document_name,
        title: &document.title,
        author: &document.author,
    };
    let result = match pipeline::process_book(
        &generator,
        &config.api,
        &config.processing,
        book,
        selected,
        &mut cache,
        &console,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            console.error(&format!("Processing aborted: {e}"));
            std::process::exit(1);
        }
    };
    console.success("All chapters processed");

    // Optional combined mind map for the whole book
    if args.combined && config.processing.mode == ProcessingMode::Mindmap {
        console.step("Generating combined book mind map...");
        let combined = generator
            .generate_combined_mind_map(
                &config.api,
                &config.processing,
                &document.title,
                selected,
            )
            .await
            .context("Combined mind map generation failed")?;
        let arrows = generator
            .generate_mind_map_arrows(&config.api, &config.processing, &combined)
            .await
            .context("Mind map arrow generation failed")?;

        match export::export_combined_mind_map(
            &document.title,
            &CombinedMindMap {
                mind_map: &combined,
                arrows: &arrows,
            },
            &config.paths.output_directory,
        ) {
            Ok(path) => console.success(&format!("Wrote {}", path.display())),
            Err(e) => console.error(&format!("Combined mind map export failed: {e}")),
        }
    }

    // Export; failures are reported, never crash the session
    let formats = if args.export.is_empty() {
        vec!["json".to_string()]
    } else {
        args.export.clone()
    };

    for format in &formats {
        match export::export_book(
            &result,
            config.processing.mode,
            format,
            &config.paths.output_directory,
        )
        .await
        {
            Ok(path) => console.success(&format!("Exported {format}: {}", path.display())),
            Err(e) => console.error(&format!("Export to {format} failed: {e}")),
        }
    }

    console.section("Done!");
    Ok(())
}

/// Validates the chapter range arguments and returns the selected slice.
fn select_chapters<'a>(
    chapters: &'a [ChapterUnit],
    start: Option<u32>,
    end: Option<u32>,
    console: &Console,
) -> Result<&'a [ChapterUnit]> {
    let total = chapters.len() as u32;

    let start_chapter = start.unwrap_or(1);
    let end_chapter = end.unwrap_or(total);

    if start_chapter > end_chapter {
        anyhow::bail!(
            "Start chapter ({}) cannot be greater than end chapter ({})",
            start_chapter,
            end_chapter
        );
    }

    if end_chapter > total {
        anyhow::bail!(
            "End chapter ({}) exceeds total chapters ({})",
            end_chapter,
            total
        );
    }

    console.info(&format!(
        "Processing chapters {} to {} of {}",
        start_chapter, end_chapter, total
    ));

    Ok(&chapters[(start_chapter - 1) as usize..end_chapter as usize])
}
