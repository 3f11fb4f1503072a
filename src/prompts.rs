//! Prompt templates for each processing mode.
//!
//! Every builder is deterministic given the same inputs: a fixed template
//! with title/content substituted, an optional custom-instructions directive,
//! and the output-language directive appended last by the backend layer so
//! custom instructions cannot override it.

use crate::artifact::BookType;
use crate::extractor::ChapterUnit;

/// Summary prompt; template depends on the book type.
pub fn summary_prompt(title: &str, content: &str, book_type: BookType) -> String {
    match book_type {
        BookType::Fiction => format!(
            "Please summarize the following chapter of a work of fiction.\n\
             Cover the plot developments, the characters involved, and the \
             chapter's contribution to the overall narrative arc.\n\n\
             Chapter Title: {title}\n\n\
             Chapter Content:\n{content}"
        ),
        BookType::NonFiction => format!(
            "Please summarize the following chapter of a non-fiction book.\n\
             Cover the key arguments, supporting evidence, and conclusions, \
             keeping the author's emphasis.\n\n\
             Chapter Title: {title}\n\n\
             Chapter Content:\n{content}"
        ),
    }
}

/// Mind-map prompt. Asks for the mind-elixir wire shape.
pub fn mind_map_prompt(content: &str) -> String {
    format!(
        "Please generate a mind map for the following chapter content.\n\
         Identify the central topic and branch into the main ideas and their \
         sub-points.\n\n\
         Respond ONLY with JSON in this format:\n\
         {{\n\
           \"nodeData\": {{\n\
             \"id\": \"root\",\n\
             \"topic\": \"...\",\n\
             \"children\": [\n\
               {{ \"id\": \"...\", \"topic\": \"...\", \"children\": [] }}\n\
             ]\n\
           }}\n\
         }}\n\n\
         Chapter content:\n{content}"
    )
}

/// Combined mind-map prompt covering every selected chapter of the book.
pub fn combined_mind_map_prompt(book_title: &str, chapters: &[ChapterUnit]) -> String {
    let chapters_content = chapters
        .iter()
        .map(|chapter| chapter.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n ------------- \n\n");

    format!(
        "{}\nPlease generate a complete mind map for the entire book \
         \"{book_title}\", integrating the content of all chapters.",
        mind_map_prompt(&chapters_content)
    )
}

/// Arrow prompt: cross-branch relations for an existing mind map.
pub fn mind_map_arrow_prompt(mind_map_json: &str) -> String {
    format!(
        "Given the following mind map, identify meaningful relationships \
         between nodes on different branches.\n\
         Respond ONLY with JSON in this format:\n\
         {{ \"arrows\": [ {{ \"label\": \"...\", \"from\": \"<node id>\", \"to\": \"<node id>\" }} ] }}\n\n\
         Current mind map data:\n{mind_map_json}"
    )
}

/// Quiz prompt. Asks for 5 questions; the parsed count is passed through unchanged.
pub fn quiz_prompt(title: &str, content: &str) -> String {
    format!(
        "Please generate a quiz with 5 questions for the following chapter content.\n\
         For each question, provide 4 multiple-choice options, with one correct answer.\n\
         Also, for each question, provide a snippet from the text that contains the answer.\n\n\
         Chapter Title: {title}\n\n\
         Chapter Content:\n{content}\n\n\
         Please respond in the following JSON format:\n\
         {{\n\
           \"questions\": [\n\
             {{\n\
               \"question\": \"...\",\n\
               \"options\": [\"...\", \"...\", \"...\", \"...\"],\n\
               \"correctAnswerIndex\": 0,\n\
               \"answerLocation\": \"...\"\n\
             }}\n\
           ]\n\
         }}"
    )
}

/// Flashcard prompt. Asks for 5 cards; the parsed count is passed through unchanged.
pub fn flashcard_prompt(title: &str, content: &str) -> String {
    format!(
        "Please generate 5 flashcards for the following chapter content.\n\
         For each flashcard, provide a \"front\" (a question or term) and a \
         \"back\" (the answer or definition).\n\
         Also, for each flashcard, provide a snippet from the text that \
         contains the answer for the back.\n\n\
         Chapter Title: {title}\n\n\
         Chapter Content:\n{content}\n\n\
         Please respond in the following JSON format:\n\
         {{\n\
           \"flashcards\": [\n\
             {{\n\
               \"front\": \"...\",\n\
               \"back\": \"...\",\n\
               \"answerLocation\": \"...\"\n\
             }}\n\
           ]\n\
         }}"
    )
}

/// Connectivity check prompt used by `--check`.
pub fn test_connection_prompt() -> String {
    "Reply with exactly: Connection successful".to_string()
}

/// The output-language directive. Appended after everything else.
pub fn language_instruction(language: &str) -> String {
    format!("IMPORTANT: You must respond in {language}.")
}

/// Appends custom instructions as an additional directive when non-empty.
pub fn apply_custom_instructions(prompt: String, custom_instructions: &str) -> String {
    let trimmed = custom_instructions.trim();
    if trimmed.is_empty() {
        prompt
    } else {
        format!("{prompt}\n\nAdditional instructions: {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_deterministic() {
        let a = quiz_prompt("Title", "Content");
        let b = quiz_prompt("Title", "Content");
        assert_eq!(a, b);
        assert!(a.contains("Chapter Title: Title"));
        assert!(a.contains("correctAnswerIndex"));
    }

    #[test]
    fn test_summary_template_varies_by_book_type() {
        let fiction = summary_prompt("T", "C", BookType::Fiction);
        let non_fiction = summary_prompt("T", "C", BookType::NonFiction);
        assert_ne!(fiction, non_fiction);
        assert!(fiction.contains("narrative"));
        assert!(non_fiction.contains("arguments"));
    }

    #[test]
    fn test_custom_instructions_appended_trimmed() {
        let prompt = apply_custom_instructions("Base".to_string(), "  focus on dates  ");
        assert_eq!(prompt, "Base\n\nAdditional instructions: focus on dates");
    }

    #[test]
    fn test_blank_custom_instructions_ignored() {
        let prompt = apply_custom_instructions("Base".to_string(), "   ");
        assert_eq!(prompt, "Base");
    }

    #[test]
    fn test_language_instruction() {
        assert!(language_instruction("French").contains("French"));
    }
}
