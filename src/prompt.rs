use tracing::warn;

use crate::aggregator::SourceDocument;
use crate::schema::ExtractionSchema;

/// Used when the user gives no structuring instruction
pub const DEFAULT_INSTRUCTIONS: &str = "Proceed with the standard analysis.";

pub const INSTRUCTIONS_MARKER: &str = "--- USER INSTRUCTIONS ---";
pub const SOURCE_MARKER: &str = "--- SOURCE TEXT ---";
pub const SOURCE_END_MARKER: &str = "--- END OF TEXT ---";
pub const DOCUMENT_MARKER: &str = "--- CURRENT DOCUMENT ---";
pub const DOCUMENT_END_MARKER: &str = "--- END OF DOCUMENT ---";
pub const INSTRUCTION_MARKER: &str = "--- USER INSTRUCTION ---";
pub const INSTRUCTION_END_MARKER: &str = "--- END OF INSTRUCTION ---";

const ALL_MARKERS: [&str; 7] = [
    INSTRUCTIONS_MARKER,
    SOURCE_MARKER,
    SOURCE_END_MARKER,
    DOCUMENT_MARKER,
    DOCUMENT_END_MARKER,
    INSTRUCTION_MARKER,
    INSTRUCTION_END_MARKER,
];

/// Which task the prompt frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Structuring,
    Editing,
}

/// The material a prompt is built from
#[derive(Debug, Clone, Copy)]
pub enum PromptSource<'a> {
    /// Aggregated input for a structuring run
    Source(&'a SourceDocument),
    /// The full current rendered document for an edit
    Document(&'a str),
}

impl<'a> PromptSource<'a> {
    fn text(&self) -> &'a str {
        match *self {
            PromptSource::Source(source) => source.as_text(),
            PromptSource::Document(document) => document,
        }
    }
}

/// Assembles task prompts; holds no state, so identical inputs give identical text
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        source: PromptSource<'_>,
        instructions: Option<&str>,
        mode: PromptMode,
        schema: Option<&ExtractionSchema>,
    ) -> String {
        let text = source.text();
        if let Some(marker) = colliding_marker(text) {
            warn!("Source text contains the delimiter {:?}; the backend may misread the prompt", marker);
        }

        match mode {
            PromptMode::Structuring => self.structuring(text, instructions, schema),
            PromptMode::Editing => self.editing(text, instructions.unwrap_or_default()),
        }
    }

    /// Shorthand for a structuring run over aggregated input
    pub fn structuring_prompt(
        &self,
        source: &SourceDocument,
        instructions: Option<&str>,
        schema: Option<&ExtractionSchema>,
    ) -> String {
        self.build(PromptSource::Source(source), instructions, PromptMode::Structuring, schema)
    }

    /// Shorthand for an edit of the current document
    pub fn editing_prompt(&self, document: &str, instruction: &str) -> String {
        self.build(PromptSource::Document(document), Some(instruction), PromptMode::Editing, None)
    }

    fn structuring(&self, text: &str, instructions: Option<&str>, schema: Option<&ExtractionSchema>) -> String {
        let instructions = instructions
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTIONS);

        let mut prompt = String::new();
        prompt.push_str("You are an expert data analyst who restructures documents.\n");
        prompt.push_str(&format!(
            "First read the section '{}' to understand the goal of the analysis. \
             Then analyze the section '{}' following those instructions.\n\n",
            INSTRUCTIONS_MARKER.trim_matches(|c| c == '-' || c == ' '),
            SOURCE_MARKER.trim_matches(|c| c == '-' || c == ' ')
        ));
        prompt.push_str("Rules:\n");
        prompt.push_str("- Create a concise title for the document.\n");
        prompt.push_str("- Derive a short summary of the whole content.\n");
        prompt.push_str("- Organize the content into logical sections, each with a heading.\n");
        prompt.push_str("- Highlight key data (figures, dates, names) in bold and list them as key data points.\n");
        prompt.push_str("- When the source contains tables, keep every row; do not drop or merge rows.\n");
        prompt.push_str("- Sheet headings ('## Sheet: ...') are good section candidates.\n");

        match schema {
            Some(schema) => {
                prompt.push_str("\nAnswer with the result as JSON inside a single fenced block that starts with ```json and ends with ```.\n");
                prompt.push_str(&schema.describe());
                prompt.push('\n');
            }
            None => {
                prompt.push_str("- Fill the provided JSON schema strictly and completely.\n");
            }
        }

        prompt.push_str(&format!("\n{}\n{}\n\n", INSTRUCTIONS_MARKER, instructions));
        prompt.push_str(&format!("{}\n{}\n{}\n", SOURCE_MARKER, text.trim_end(), SOURCE_END_MARKER));
        prompt
    }

    fn editing(&self, document: &str, instruction: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "Act as a document editor. Modify the current document according to the user instruction.\n",
        );
        prompt.push_str(
            "You must return the **complete modified document** in Markdown, not a diff, \
             not only the changed part, and not an answer to the instruction.\n\n",
        );
        prompt.push_str(&format!("{}\n{}\n{}\n\n", DOCUMENT_MARKER, document.trim_end(), DOCUMENT_END_MARKER));
        prompt.push_str(&format!("{}\n{}\n{}\n", INSTRUCTION_MARKER, instruction.trim(), INSTRUCTION_END_MARKER));
        prompt
    }
}

/// First delimiter marker that also appears inside `text`
pub fn colliding_marker(text: &str) -> Option<&'static str> {
    ALL_MARKERS.iter().copied().find(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ContentAggregator;
    use crate::config::AggregationPolicy;

    fn source(text: &str) -> SourceDocument {
        ContentAggregator::new(AggregationPolicy::AppendSheets)
            .aggregate(Some(text), &[])
            .unwrap()
    }

    #[test]
    fn test_structuring_prompt_sections_in_order() {
        let doc = source("Q1 revenue rose 10%. Q2 revenue rose 12%.");
        let prompt = PromptBuilder::new().structuring_prompt(&doc, Some("summarize by quarter"), None);

        let instructions_at = prompt.find(INSTRUCTIONS_MARKER).unwrap();
        let user_at = prompt.find("summarize by quarter").unwrap();
        let source_at = prompt.find(SOURCE_MARKER).unwrap();
        let text_at = prompt.find("Q1 revenue rose 10%.").unwrap();
        let end_at = prompt.find(SOURCE_END_MARKER).unwrap();
        assert!(instructions_at < user_at && user_at < source_at && source_at < text_at && text_at < end_at);
        assert!(prompt.contains("keep every row"));
    }

    #[test]
    fn test_blank_instruction_falls_back() {
        let doc = source("text");
        let prompt = PromptBuilder::new().structuring_prompt(&doc, Some("   "), None);
        assert!(prompt.contains(DEFAULT_INSTRUCTIONS));
        let prompt = PromptBuilder::new().structuring_prompt(&doc, None, None);
        assert!(prompt.contains(DEFAULT_INSTRUCTIONS));
    }

    #[test]
    fn test_schema_embeds_delimiter_convention() {
        let doc = source("text");
        let schema = ExtractionSchema::v1();
        let prompt = PromptBuilder::new().structuring_prompt(&doc, None, Some(&schema));
        assert!(prompt.contains("```json"));
        assert!(prompt.contains(&schema.describe()));
    }

    #[test]
    fn test_editing_prompt_carries_whole_document() {
        let document = "# Title\n\n**Summary:** s\n\n## A\n\nBody A\n";
        let prompt = PromptBuilder::new().editing_prompt(document, "make it shorter");
        assert!(prompt.contains(document.trim_end()));
        assert!(prompt.contains("complete modified document"));
        assert!(prompt.find(DOCUMENT_END_MARKER).unwrap() < prompt.find("make it shorter").unwrap());
    }

    #[test]
    fn test_deterministic() {
        let doc = source("same input");
        let builder = PromptBuilder::new();
        assert_eq!(
            builder.structuring_prompt(&doc, Some("x"), None),
            builder.structuring_prompt(&doc, Some("x"), None)
        );
    }

    #[test]
    fn test_marker_collision_detected() {
        assert_eq!(colliding_marker("before --- SOURCE TEXT --- after"), Some(SOURCE_MARKER));
        assert_eq!(colliding_marker("clean text"), None);
    }
}
