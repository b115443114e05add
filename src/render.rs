use std::path::Path;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::error::{StructurerError, StructurerResult};
use crate::schema::StructuredResult;

pub const INITIAL_DOCUMENT: &str = "The structured result will appear here.";
pub const KEY_DATA_HEADING: &str = "Key Data";

const UNTITLED_DOCUMENT: &str = "Untitled document";
const NO_SUMMARY: &str = "No summary available.";
const UNTITLED_SECTION: &str = "Untitled section";
const NO_CONTENT: &str = "No content provided.";
const UNLABELED: &str = "Unlabeled";

/// The Markdown text the user sees and edits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument(String);

impl Default for RenderedDocument {
    fn default() -> Self {
        Self(INITIAL_DOCUMENT.to_string())
    }
}

impl RenderedDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Headings in document order, as (level, text)
    pub fn outline(&self) -> Vec<(usize, String)> {
        let mut outline = Vec::new();
        let mut current: Option<(usize, String)> = None;

        for event in Parser::new_ext(&self.0, Options::empty()) {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    current = Some((heading_depth(level), String::new()));
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some((_, heading)) = current.as_mut() {
                        heading.push_str(&text);
                    }
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(entry) = current.take() {
                        outline.push(entry);
                    }
                }
                _ => {}
            }
        }

        outline
    }

    /// Write as UTF-8 Markdown
    pub async fn export(&self, path: &Path) -> StructurerResult<()> {
        tokio::fs::write(path, self.0.as_bytes())
            .await
            .map_err(|e| StructurerError::file_io(path.to_string_lossy().to_string(), e))
    }
}

impl std::fmt::Display for RenderedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn heading_depth(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    match text.trim() {
        "" => placeholder,
        trimmed => trimmed,
    }
}

/// Heading and label text must stay on one line
fn single_line(text: &str, placeholder: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        placeholder.to_string()
    } else {
        collapsed
    }
}

/// Deterministic StructuredResult -> Markdown layout
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentRenderer;

impl DocumentRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, result: &StructuredResult) -> RenderedDocument {
        let mut parts: Vec<String> = Vec::new();

        parts.push(format!("# {}", single_line(&result.title, UNTITLED_DOCUMENT)));
        parts.push(format!("**Summary:** {}", or_placeholder(&result.summary, NO_SUMMARY)));

        if !result.key_data_points.is_empty() {
            let bullets: Vec<String> = result
                .key_data_points
                .iter()
                .map(|point| {
                    format!(
                        "- **{}:** {}",
                        single_line(&point.label, UNLABELED),
                        point.value.trim()
                    )
                })
                .collect();
            parts.push(format!("## {}\n\n{}", KEY_DATA_HEADING, bullets.join("\n")));
        }

        for section in &result.sections {
            parts.push(format!(
                "## {}\n\n{}",
                single_line(&section.heading, UNTITLED_SECTION),
                or_placeholder(&section.content, NO_CONTENT)
            ));
        }

        let mut markdown = parts.join("\n\n");
        markdown.push('\n');
        RenderedDocument(markdown)
    }
}
