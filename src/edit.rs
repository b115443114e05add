//! Conversational edit loop over the rendered document.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StructurerError, StructurerResult};
use crate::prompt::PromptBuilder;
use crate::render::RenderedDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditTurn {
    pub role: Role,
    pub content: String,
}

/// Turns of the edit exchange in progress, oldest first
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<EditTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push_back(EditTurn { role, content: content.into() });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> impl Iterator<Item = &EditTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Empty the history, handing back its turns
    pub fn take(&mut self) -> Vec<EditTurn> {
        self.turns.drain(..).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Idle,
    Pending,
}

/// A request that has left Idle and awaits the backend answer
#[derive(Debug)]
pub struct PendingEdit {
    ticket: Uuid,
    instruction: String,
    prompt: String,
}

impl PendingEdit {
    pub fn ticket(&self) -> Uuid {
        self.ticket
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Editing prompt built from the document as it was at submission
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

struct InFlight {
    ticket: Uuid,
    history_snapshot: ConversationHistory,
}

/// Idle/Pending state machine; at most one edit in flight
pub struct EditController {
    history: ConversationHistory,
    in_flight: Option<InFlight>,
    prompts: PromptBuilder,
}

impl EditController {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            history: ConversationHistory::new(max_history_turns),
            in_flight: None,
            prompts: PromptBuilder::new(),
        }
    }

    pub fn state(&self) -> EditState {
        if self.in_flight.is_some() {
            EditState::Pending
        } else {
            EditState::Idle
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Idle -> Pending
    pub fn begin(&mut self, document: &RenderedDocument, instruction: &str) -> StructurerResult<PendingEdit> {
        if self.in_flight.is_some() {
            warn!("Rejected edit instruction while another edit is pending");
            return Err(StructurerError::EditInFlight);
        }

        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StructurerError::EmptyInstruction);
        }

        let ticket = Uuid::new_v4();
        self.in_flight = Some(InFlight {
            ticket,
            history_snapshot: self.history.clone(),
        });
        self.history.push(Role::User, instruction);

        debug!("Edit {} pending: {:?}", ticket, instruction);
        Ok(PendingEdit {
            ticket,
            instruction: instruction.to_string(),
            prompt: self.prompts.editing_prompt(document.as_str(), instruction),
        })
    }

    /// Pending -> Idle. Success replaces the document wholesale and hands
    /// back the finished exchange, leaving history empty; failure leaves both
    /// exactly as they were before `begin`.
    pub fn complete(
        &mut self,
        document: &mut RenderedDocument,
        pending: PendingEdit,
        outcome: StructurerResult<String>,
    ) -> StructurerResult<Vec<EditTurn>> {
        let in_flight = self.take_in_flight(pending.ticket)?;

        let rewritten = outcome.and_then(|raw| {
            let text = unwrap_markdown_fence(&raw);
            if text.trim().is_empty() {
                Err(StructurerError::extraction_format("edit response is empty", raw.as_str()))
            } else {
                Ok(text.to_string())
            }
        });

        match rewritten {
            Ok(text) => {
                self.history.push(Role::Assistant, text.as_str());
                *document = RenderedDocument::new(text);
                // The next edit starts from the new document alone
                let exchange = self.history.take();
                info!("Edit {} applied ({} chars)", pending.ticket, document.len());
                Ok(exchange)
            }
            Err(e) => {
                self.history = in_flight.history_snapshot;
                warn!("Edit {} failed, document unchanged: {}", pending.ticket, e);
                Err(e)
            }
        }
    }

    /// Release a pending edit whose answer will never arrive
    pub fn abandon(&mut self, pending: PendingEdit) -> StructurerResult<()> {
        let in_flight = self.take_in_flight(pending.ticket)?;
        self.history = in_flight.history_snapshot;
        info!("Edit {} abandoned", pending.ticket);
        Ok(())
    }

    /// Like `begin`, but the pending edit is abandoned if the guard is
    /// dropped before `complete`, so a cancelled caller cannot leave the
    /// controller stuck in Pending.
    pub fn begin_guarded(
        &mut self,
        document: &RenderedDocument,
        instruction: &str,
    ) -> StructurerResult<PendingGuard<'_>> {
        let pending = self.begin(document, instruction)?;
        Ok(PendingGuard {
            controller: self,
            pending: Some(pending),
        })
    }

    fn take_in_flight(&mut self, ticket: Uuid) -> StructurerResult<InFlight> {
        match self.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => Ok(in_flight),
            other => {
                self.in_flight = other;
                Err(StructurerError::StaleEdit { ticket: ticket.to_string() })
            }
        }
    }
}

/// Pending edit tied to its controller
pub struct PendingGuard<'a> {
    controller: &'a mut EditController,
    pending: Option<PendingEdit>,
}

impl PendingGuard<'_> {
    pub fn prompt(&self) -> &str {
        self.pending.as_ref().map_or("", PendingEdit::prompt)
    }

    pub fn complete(
        mut self,
        document: &mut RenderedDocument,
        outcome: StructurerResult<String>,
    ) -> StructurerResult<Vec<EditTurn>> {
        match self.pending.take() {
            Some(pending) => self.controller.complete(document, pending, outcome),
            None => Err(StructurerError::StaleEdit { ticket: "released".to_string() }),
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!("Edit {} dropped before its answer arrived", pending.ticket);
            if let Err(e) = self.controller.abandon(pending) {
                warn!("Could not release dropped edit: {}", e);
            }
        }
    }
}

/// Strip one fence wrapping the entire answer (```markdown / ```md / bare)
fn unwrap_markdown_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return raw;
    };
    let Some((lang, body)) = rest.split_once('\n') else {
        return raw;
    };
    let lang = lang.trim();
    if !(lang.is_empty() || lang.eq_ignore_ascii_case("markdown") || lang.eq_ignore_ascii_case("md")) {
        return raw;
    }
    match body.trim_end().strip_suffix("```") {
        // An inner fence means the answer is more than one block
        Some(inner) if !inner.contains("\n```") => inner.trim_end_matches(['\n', '\r']),
        _ => raw,
    }
}
