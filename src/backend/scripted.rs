use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{GenerationBackend, GenerationRequest};
use crate::error::{BackendFailureKind, StructurerError, StructurerResult};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Failure(BackendFailureKind, String),
}

/// Replays queued answers in order and records every request.
///
/// Used by tests and for offline runs of the pipeline.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push_reply(text);
        self
    }

    pub fn with_failure(self, kind: BackendFailureKind, message: impl Into<String>) -> Self {
        self.push_failure(kind, message);
        self
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.lock_replies().push_back(Reply::Text(text.into()));
    }

    pub fn push_failure(&self, kind: BackendFailureKind, message: impl Into<String>) {
        self.lock_replies().push_back(Reply::Failure(kind, message.into()));
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock_replies().len()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Reply>> {
        self.replies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> StructurerResult<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.lock_replies().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Failure(kind, message)) => Err(StructurerError::backend(kind, message)),
            None => Err(StructurerError::backend(
                BackendFailureKind::Service,
                "scripted backend has no replies left",
            )),
        }
    }
}
