use tracing::{debug, info};

use crate::config::AggregationPolicy;
use crate::error::{StructurerError, StructurerResult};
use crate::tabular::{SheetTable, TableFormatter};

/// Heading marker placed in front of every sheet block
pub const SHEET_MARKER_PREFIX: &str = "## Sheet: ";

/// One labeled piece of source material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    /// Sheet name, empty for pasted text
    pub label: String,
    pub body: String,
}

impl SourceBlock {
    pub fn is_sheet(&self) -> bool {
        !self.label.is_empty()
    }

    fn render(&self) -> String {
        if self.is_sheet() {
            format!("{}{}\n\n{}\n", SHEET_MARKER_PREFIX, self.label, self.body)
        } else {
            format!("{}\n", self.body)
        }
    }
}

/// Ordered, immutable source material for one processing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    blocks: Vec<SourceBlock>,
    text: String,
    fingerprint: String,
}

impl SourceDocument {
    fn new(blocks: Vec<SourceBlock>) -> Self {
        let text = blocks
            .iter()
            .map(SourceBlock::render)
            .collect::<Vec<_>>()
            .join("\n");
        let fingerprint = blake3::hash(text.as_bytes()).to_hex().to_string();
        Self { blocks, text, fingerprint }
    }

    pub fn blocks(&self) -> &[SourceBlock] {
        &self.blocks
    }

    /// The text handed to the prompt builder
    pub fn as_text(&self) -> &str {
        &self.text
    }

    /// blake3 hex digest of the rendered text
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn sheet_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_sheet()).count()
    }
}

/// Builds the SourceDocument from pasted text and normalized sheets
pub struct ContentAggregator {
    policy: AggregationPolicy,
    formatter: TableFormatter,
}

impl ContentAggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self {
            policy,
            formatter: TableFormatter::new(),
        }
    }

    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    pub fn aggregate(
        &self,
        pasted_text: Option<&str>,
        sheets: &[SheetTable],
    ) -> StructurerResult<SourceDocument> {
        let text_block = pasted_text
            .map(normalize_pasted_text)
            .filter(|text| !text.is_empty())
            .map(|body| SourceBlock { label: String::new(), body });

        let sheet_blocks: Vec<SourceBlock> = sheets
            .iter()
            .filter(|sheet| !sheet.is_empty())
            .map(|sheet| SourceBlock {
                label: sheet.name.clone(),
                body: self.formatter.format_table(sheet),
            })
            .collect();

        let blocks: Vec<SourceBlock> = match self.policy {
            AggregationPolicy::AppendSheets => text_block.into_iter().chain(sheet_blocks).collect(),
            AggregationPolicy::SheetsReplaceText if !sheet_blocks.is_empty() => {
                if text_block.is_some() {
                    debug!("Sheet content replaces pasted text");
                }
                sheet_blocks
            }
            AggregationPolicy::SheetsReplaceText => text_block.into_iter().collect(),
        };

        if blocks.is_empty() {
            return Err(StructurerError::EmptyInput);
        }

        let document = SourceDocument::new(blocks);
        info!(
            "Aggregated {} blocks ({} sheets, {} chars)",
            document.blocks().len(),
            document.sheet_count(),
            document.as_text().len()
        );
        Ok(document)
    }
}

fn normalize_pasted_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
