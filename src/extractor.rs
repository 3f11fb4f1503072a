//! Chapter extraction from structured documents.
//!
//! Walks the adapter's entry tree and produces an ordered sequence of
//! chapter units with stable identifiers, so cache keys remain valid
//! across repeated extraction runs on the same file.

use crate::adapters::{StructuredDocument, TocEntry};
use crate::error::ExtractionError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Titles that mark a chapter as non-essential wherever it appears.
static NON_ESSENTIAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(acknowledg(e)?ments?|bibliography|copyright|colophon|dedication|index|glossary|appendix|about the author|also by|title page|cover|table of contents|contents|works cited|references|credits|imprint)\b",
    )
    .expect("Invalid NON_ESSENTIAL_REGEX")
});

/// Titles that are non-essential only near the document extremities.
static EXTREMITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(foreword|preface|afterword|epigraph|half title|front matter|notes)\b")
        .expect("Invalid EXTREMITY_REGEX")
});

/// Fraction of the chapter sequence counted as an extremity.
const EXTREMITY_WINDOW: f64 = 0.15;

/// One segment of extracted document text with stable identity and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterUnit {
    /// Stable identifier, derived from depth+title hash and disambiguated
    /// with `order` on collision.
    pub id: String,
    /// Chapter title.
    pub title: String,
    /// Plain extracted text, exclusive of descendant units' content.
    pub content: String,
    /// Nesting level (0 = top-level).
    pub depth: u32,
    /// Position in document reading order, strictly increasing.
    pub order: usize,
}

/// Options controlling how the entry tree is flattened into chapter units.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Descend into nested entries instead of flat top-level extraction.
    pub use_smart_detection: bool,
    /// Drop chapters the non-essential classifier matches.
    pub skip_non_essential: bool,
    /// Extra nesting levels to descend under smart detection (0 = top-level only).
    pub max_sub_chapter_depth: u32,
}

/// A candidate chapter before filtering and id assignment.
struct Candidate {
    title: String,
    content: String,
    depth: u32,
}

/// Extracts an ordered sequence of chapter units from a structured document.
///
/// Fails with an `ExtractionError` when the document yields zero usable
/// text; no partial sequence is returned.
pub fn extract(
    document: &StructuredDocument,
    options: &ExtractOptions,
) -> Result<Vec<ChapterUnit>, ExtractionError> {
    let mut candidates = Vec::new();

    for entry in &document.entries {
        if options.use_smart_detection {
            collect_smart(entry, 0, options.max_sub_chapter_depth, &mut candidates);
        } else {
            candidates.push(Candidate {
                title: entry.title.clone(),
                content: subtree_text(entry),
                depth: 0,
            });
        }
    }

    // Whitespace-only segments carry no usable text
    candidates.retain(|candidate| !candidate.content.trim().is_empty());

    if options.skip_non_essential {
        let total = candidates.len();
        let mut index = 0;
        candidates.retain(|candidate| {
            let keep = !is_non_essential(&candidate.title, index, total);
            index += 1;
            keep
        });
    }

    if candidates.is_empty() {
        return Err(ExtractionError::EmptyDocument);
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    let units = candidates
        .into_iter()
        .enumerate()
        .map(|(order, candidate)| {
            let base = chapter_id(candidate.depth, &candidate.title);
            // Duplicate titles at the same depth get order appended so
            // cache keys never collide
            let id = if seen_ids.contains(&base) {
                format!("{base}-{order}")
            } else {
                base
            };
            seen_ids.insert(id.clone());

            ChapterUnit {
                id,
                title: candidate.title,
                content: candidate.content.trim().to_string(),
                depth: candidate.depth,
                order,
            }
        })
        .collect();

    Ok(units)
}

/// Descends the entry tree up to `max_depth` extra levels.
///
/// Entries at the depth limit (or without children) absorb their whole
/// subtree; entries above it own only their exclusive text so no text
/// appears in two units.
fn collect_smart(entry: &TocEntry, depth: u32, max_depth: u32, out: &mut Vec<Candidate>) {
    if depth >= max_depth || entry.children.is_empty() {
        out.push(Candidate {
            title: entry.title.clone(),
            content: subtree_text(entry),
            depth,
        });
    } else {
        out.push(Candidate {
            title: entry.title.clone(),
            content: entry.text.clone(),
            depth,
        });
        for child in &entry.children {
            collect_smart(child, depth + 1, max_depth, out);
        }
    }
}

/// Concatenates an entry's own text with all descendant text in reading order.
fn subtree_text(entry: &TocEntry) -> String {
    let mut parts = Vec::new();
    push_subtree_text(entry, &mut parts);
    parts.join("\n\n")
}

fn push_subtree_text(entry: &TocEntry, parts: &mut Vec<String>) {
    let own = entry.text.trim();
    if !own.is_empty() {
        parts.push(own.to_string());
    }
    for child in &entry.children {
        push_subtree_text(child, parts);
    }
}

/// Classifies a chapter title as non-essential.
///
/// Strong vocabulary matches anywhere; ambiguous titles only count near
/// the document extremities.
fn is_non_essential(title: &str, index: usize, total: usize) -> bool {
    if NON_ESSENTIAL_REGEX.is_match(title) {
        return true;
    }

    if EXTREMITY_REGEX.is_match(title) {
        let window = ((total as f64) * EXTREMITY_WINDOW).ceil() as usize;
        let window = window.max(1);
        return index < window || index >= total.saturating_sub(window);
    }

    false
}

/// Stable short identifier from nesting level and title.
fn chapter_id(depth: u32, title: &str) -> String {
    let digest = md5::compute(format!("{depth}:{title}"));
    let mut hex = format!("{digest:x}");
    hex.truncate(12);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(title: &str, text: &str) -> TocEntry {
        TocEntry {
            title: title.to_string(),
            text: text.to_string(),
            children: Vec::new(),
        }
    }

    fn node(title: &str, text: &str, children: Vec<TocEntry>) -> TocEntry {
        TocEntry {
            title: title.to_string(),
            text: text.to_string(),
            children,
        }
    }

    fn document(entries: Vec<TocEntry>) -> StructuredDocument {
        StructuredDocument {
            title: "A Book".to_string(),
            author: "An Author".to_string(),
            entries,
        }
    }

    fn nested_document() -> StructuredDocument {
        document(vec![
            node(
                "Chapter 1",
                "Intro text.",
                vec![
                    leaf("Section 1.1", "First section."),
                    leaf("Section 1.2", "Second section."),
                ],
            ),
            leaf("Chapter 2", "Plain chapter."),
        ])
    }

    #[test]
    fn test_baseline_one_unit_per_top_level_entry() {
        let doc = document(vec![
            leaf("Chapter 1", "One."),
            leaf("Chapter 2", "Two."),
            leaf("Chapter 3", "Three."),
        ]);
        let units = extract(&doc, &ExtractOptions::default()).unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].title, "Chapter 1");
        assert_eq!(units[2].title, "Chapter 3");
        assert!(units.iter().all(|u| u.depth == 0));
    }

    #[test]
    fn test_baseline_concatenates_descendant_text() {
        let units = extract(&nested_document(), &ExtractOptions::default()).unwrap();

        assert_eq!(units.len(), 2);
        assert!(units[0].content.contains("Intro text."));
        assert!(units[0].content.contains("First section."));
        assert!(units[0].content.contains("Second section."));
    }

    #[test]
    fn test_order_strictly_increasing_and_ids_unique() {
        let options = ExtractOptions {
            use_smart_detection: true,
            max_sub_chapter_depth: 3,
            ..Default::default()
        };
        let units = extract(&nested_document(), &options).unwrap();

        for pair in units.windows(2) {
            assert!(pair[0].order < pair[1].order);
        }
        let ids: HashSet<&str> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids.len(), units.len());
    }

    #[test]
    fn test_smart_depth_zero_matches_baseline_count() {
        let options = ExtractOptions {
            use_smart_detection: true,
            max_sub_chapter_depth: 0,
            ..Default::default()
        };
        let units = extract(&nested_document(), &options).unwrap();
        assert_eq!(units.len(), 2);
        assert!(units[0].content.contains("First section."));
    }

    #[test]
    fn test_smart_descends_and_excludes_descendant_text() {
        let options = ExtractOptions {
            use_smart_detection: true,
            max_sub_chapter_depth: 1,
            ..Default::default()
        };
        let units = extract(&nested_document(), &options).unwrap();

        assert_eq!(units.len(), 4);
        let parent = units.iter().find(|u| u.title == "Chapter 1").unwrap();
        assert_eq!(parent.depth, 0);
        assert_eq!(parent.content, "Intro text.");
        assert!(!parent.content.contains("First section."));

        let child = units.iter().find(|u| u.title == "Section 1.1").unwrap();
        assert_eq!(child.depth, 1);
        assert_eq!(child.content, "First section.");
    }

    #[test]
    fn test_deeper_limit_never_decreases_unit_count() {
        let doc = document(vec![node(
            "Chapter 1",
            "Top.",
            vec![node(
                "Section 1.1",
                "Mid.",
                vec![leaf("Sub 1.1.1", "Deep.")],
            )],
        )]);

        let mut previous = 0;
        for depth in 0..4 {
            let options = ExtractOptions {
                use_smart_detection: true,
                max_sub_chapter_depth: depth,
                ..Default::default()
            };
            let count = extract(&doc, &options).unwrap().len();
            assert!(count >= previous, "count decreased at depth {depth}");
            previous = count;
        }
    }

    #[test]
    fn test_no_text_overlap_between_units() {
        let options = ExtractOptions {
            use_smart_detection: true,
            max_sub_chapter_depth: 2,
            ..Default::default()
        };
        let units = extract(&nested_document(), &options).unwrap();

        for (i, a) in units.iter().enumerate() {
            for (j, b) in units.iter().enumerate() {
                if i != j {
                    assert!(
                        !a.content.contains(&b.content),
                        "unit '{}' contains text of '{}'",
                        a.title,
                        b.title
                    );
                }
            }
        }
    }

    #[test]
    fn test_whitespace_only_segments_dropped() {
        let doc = document(vec![
            leaf("Blank", "   \n\t "),
            leaf("Chapter 1", "Real text."),
        ]);
        let units = extract(&doc, &ExtractOptions::default()).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].title, "Chapter 1");
        assert_eq!(units[0].order, 0);
    }

    #[test]
    fn test_duplicate_titles_disambiguated_by_order() {
        let doc = document(vec![
            leaf("Notes", "First notes chapter."),
            leaf("Notes", "Second notes chapter."),
        ]);
        let units = extract(&doc, &ExtractOptions::default()).unwrap();

        assert_eq!(units.len(), 2);
        assert_ne!(units[0].id, units[1].id);
        assert!(units[1].id.ends_with("-1"));
    }

    #[test]
    fn test_ids_stable_across_runs() {
        let doc = nested_document();
        let options = ExtractOptions {
            use_smart_detection: true,
            max_sub_chapter_depth: 2,
            ..Default::default()
        };
        let first = extract(&doc, &options).unwrap();
        let second = extract(&doc, &options).unwrap();

        let first_ids: Vec<&str> = first.iter().map(|u| u.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let doc = document(vec![leaf("Blank", "  ")]);
        assert!(matches!(
            extract(&doc, &ExtractOptions::default()),
            Err(ExtractionError::EmptyDocument)
        ));

        let doc = document(Vec::new());
        assert!(extract(&doc, &ExtractOptions::default()).is_err());
    }

    #[test]
    fn test_skip_non_essential_vocabulary() {
        let doc = document(vec![
            leaf("Cover", "Cover art."),
            leaf("Acknowledgments", "Thanks to everyone."),
            leaf("Chapter 1", "Actual content."),
            leaf("Chapter 2", "More content."),
            leaf("Index", "a, 1\nb, 2"),
        ]);
        let options = ExtractOptions {
            skip_non_essential: true,
            ..Default::default()
        };
        let units = extract(&doc, &options).unwrap();

        let titles: Vec<&str> = units.iter().map(|u| u.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1", "Chapter 2"]);
    }

    #[test]
    fn test_extremity_titles_kept_in_document_middle() {
        // "Notes" in the middle of a long book is a real chapter;
        // at the tail it is back matter.
        assert!(!is_non_essential("Notes on a Scandal", 10, 20));
        assert!(is_non_essential("Notes", 19, 20));
        assert!(is_non_essential("Preface", 0, 20));
    }

    #[test]
    fn test_skip_disabled_keeps_everything() {
        let doc = document(vec![
            leaf("Acknowledgments", "Thanks."),
            leaf("Chapter 1", "Content."),
        ]);
        let units = extract(&doc, &ExtractOptions::default()).unwrap();
        assert_eq!(units.len(), 2);
    }
}
