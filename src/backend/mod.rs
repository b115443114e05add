//! The generation backend boundary.

pub mod gemini;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{BackendFailureKind, StructurerError, StructurerResult};

pub use gemini::GeminiBackend;
pub use scripted::ScriptedBackend;

/// One call to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Response schema for schema-constrained calls, `None` for free text
    pub response_schema: Option<Value>,
}

impl GenerationRequest {
    pub fn free_form(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response_schema: None,
        }
    }

    pub fn constrained(prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            response_schema: Some(schema),
        }
    }
}

/// Black-box text generator: prompt (plus optional schema) in, text out
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the model's full text answer, or a `Backend` error
    async fn generate(&self, request: &GenerationRequest) -> StructurerResult<String>;
}

/// Run a backend call with a hard upper bound on the wait
pub async fn generate_with_timeout(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
    timeout: Duration,
) -> StructurerResult<String> {
    debug!(
        "Calling {} ({} prompt chars, constrained: {})",
        backend.name(),
        request.prompt.len(),
        request.response_schema.is_some()
    );

    match tokio::time::timeout(timeout, backend.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(StructurerError::backend(
            BackendFailureKind::Timeout,
            format!("{} did not answer within {}s", backend.name(), timeout.as_secs_f32()),
        )),
    }
}
