//! One interactive structuring session: inputs, the current document and
//! everything needed to regenerate or edit it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::{ContentAggregator, SourceDocument};
use crate::backend::{generate_with_timeout, GenerationBackend, GenerationRequest};
use crate::config::StructurerConfig;
use crate::edit::{ConversationHistory, EditController, EditState, EditTurn};
use crate::error::{StructurerError, StructurerResult};
use crate::extractor::StructuredExtractor;
use crate::logging::PerformanceTimer;
use crate::prompt::PromptBuilder;
use crate::render::{DocumentRenderer, RenderedDocument};
use crate::tabular::{load_workbook, NormalizationChanges, SheetTable, WorkbookNormalizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionOrigin {
    Structured,
    Manual,
    AiEdit,
}

impl std::fmt::Display for RevisionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RevisionOrigin::Structured => "structured",
            RevisionOrigin::Manual => "manual",
            RevisionOrigin::AiEdit => "ai_edit",
        };
        f.write_str(name)
    }
}

/// A replacement of the rendered document
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: Uuid,
    pub origin: RevisionOrigin,
    pub at: DateTime<Utc>,
    pub bytes: usize,
}

pub struct Session {
    config: StructurerConfig,
    pasted_text: Option<String>,
    workbook_name: Option<String>,
    sheets: Vec<SheetTable>,
    last_fingerprint: Option<String>,
    document: RenderedDocument,
    revisions: Vec<Revision>,
    last_exchange: Vec<EditTurn>,
    edits: EditController,
    extractor: StructuredExtractor,
    prompts: PromptBuilder,
    renderer: DocumentRenderer,
}

impl Session {
    pub fn new(config: StructurerConfig) -> Self {
        let extractor = StructuredExtractor::new(
            config.backend.convention,
            Duration::from_secs(config.backend.timeout_seconds),
        );
        let edits = EditController::new(config.editing.max_history_turns);

        Self {
            config,
            pasted_text: None,
            workbook_name: None,
            sheets: Vec::new(),
            last_fingerprint: None,
            document: RenderedDocument::default(),
            revisions: Vec::new(),
            last_exchange: Vec::new(),
            edits,
            extractor,
            prompts: PromptBuilder::new(),
            renderer: DocumentRenderer::new(),
        }
    }

    pub fn config(&self) -> &StructurerConfig {
        &self.config
    }

    pub fn document(&self) -> &RenderedDocument {
        &self.document
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn sheets(&self) -> &[SheetTable] {
        &self.sheets
    }

    pub fn workbook_name(&self) -> Option<&str> {
        self.workbook_name.as_deref()
    }

    pub fn edit_state(&self) -> EditState {
        self.edits.state()
    }

    pub fn history(&self) -> &ConversationHistory {
        self.edits.history()
    }

    /// Instruction and answer of the last applied AI edit
    pub fn last_exchange(&self) -> &[EditTurn] {
        &self.last_exchange
    }

    pub fn set_pasted_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.pasted_text = (!text.trim().is_empty()).then_some(text);
    }

    /// Replace the loaded workbook; on error the previous sheets are kept
    pub fn load_workbook(&mut self, bytes: &[u8], name: &str) -> StructurerResult<NormalizationChanges> {
        let raw = load_workbook(bytes, name)?;
        let (sheets, changes) = WorkbookNormalizer::new(self.config.ingestion.normalization).normalize(raw);

        info!("Loaded workbook '{}' with {} usable sheets", name, sheets.len());
        self.sheets = sheets;
        self.workbook_name = Some(name.to_string());
        Ok(changes)
    }

    /// Aggregate the current inputs
    pub fn build_source(&self) -> StructurerResult<SourceDocument> {
        ContentAggregator::new(self.config.ingestion.aggregation)
            .aggregate(self.pasted_text.as_deref(), &self.sheets)
    }

    /// Full pipeline run. The document is replaced only on success.
    pub async fn process(
        &mut self,
        backend: &dyn GenerationBackend,
        instructions: Option<&str>,
    ) -> StructurerResult<&RenderedDocument> {
        let source = self.build_source()?;
        match self.last_fingerprint.as_deref() {
            Some(previous) if previous == source.fingerprint() => {
                info!("Input unchanged since the last run ({})", &source.fingerprint()[..12]);
            }
            _ => info!("Processing new input ({})", &source.fingerprint()[..12]),
        }

        let prompt = self
            .prompts
            .structuring_prompt(&source, instructions, self.extractor.prompt_schema());
        let result = self.extractor.extract(backend, &prompt).await?;

        let rendered = self.renderer.render(&result);
        self.last_fingerprint = Some(source.fingerprint().to_string());
        self.replace_document(rendered, RevisionOrigin::Structured);
        Ok(&self.document)
    }

    /// User typed over the document; last writer wins
    pub fn apply_manual_edit(&mut self, text: impl Into<String>) -> StructurerResult<()> {
        if self.edits.state() == EditState::Pending {
            return Err(StructurerError::EditInFlight);
        }
        self.replace_document(RenderedDocument::new(text), RevisionOrigin::Manual);
        Ok(())
    }

    /// One AI edit round trip over the current document.
    ///
    /// Dropping the returned future before it resolves releases the pending
    /// edit; the document and history stay as they were.
    pub async fn submit_edit(
        &mut self,
        backend: &dyn GenerationBackend,
        instruction: &str,
    ) -> StructurerResult<&RenderedDocument> {
        let _timer = PerformanceTimer::start("ai edit");
        let guard = self.edits.begin_guarded(&self.document, instruction)?;
        let request = GenerationRequest::free_form(guard.prompt());
        let timeout = Duration::from_secs(self.config.backend.timeout_seconds);

        let outcome = generate_with_timeout(backend, &request, timeout).await;

        let mut candidate = self.document.clone();
        let exchange = guard.complete(&mut candidate, outcome)?;
        self.last_exchange = exchange;
        self.replace_document(candidate, RevisionOrigin::AiEdit);
        Ok(&self.document)
    }

    fn replace_document(&mut self, document: RenderedDocument, origin: RevisionOrigin) {
        if document == self.document {
            warn!("New {} revision is identical to the current document", origin);
        }
        let revision = Revision {
            id: Uuid::new_v4(),
            origin,
            at: Utc::now(),
            bytes: document.len(),
        };
        info!("Revision {} ({}, {} bytes)", revision.id, origin, revision.bytes);
        self.revisions.push(revision);
        self.document = document;
    }
}
