//! Structured extraction over either backend calling convention.

pub mod embedded;

use std::time::Duration;

use tracing::{debug, info};

use crate::backend::{generate_with_timeout, GenerationBackend, GenerationRequest};
use crate::config::CallConvention;
use crate::error::{StructurerError, StructurerResult};
use crate::logging::PerformanceTimer;
use crate::schema::{ExtractionSchema, StructuredResult};

/// Asks the backend for a StructuredResult and validates the answer.
///
/// Callers hand it a prompt and get back a validated result or a typed error;
/// which convention is active only changes how the answer is requested and
/// where the payload is looked for.
pub struct StructuredExtractor {
    schema: ExtractionSchema,
    convention: CallConvention,
    timeout: Duration,
}

impl StructuredExtractor {
    pub fn new(convention: CallConvention, timeout: Duration) -> Self {
        Self {
            schema: ExtractionSchema::v1(),
            convention,
            timeout,
        }
    }

    pub fn convention(&self) -> CallConvention {
        self.convention
    }

    pub fn schema(&self) -> &ExtractionSchema {
        &self.schema
    }

    /// Schema to describe inside the prompt; only the fenced convention needs it
    pub fn prompt_schema(&self) -> Option<&ExtractionSchema> {
        match self.convention {
            CallConvention::SchemaConstrained => None,
            CallConvention::EmbeddedPayload => Some(&self.schema),
        }
    }

    pub async fn extract(
        &self,
        backend: &dyn GenerationBackend,
        prompt: &str,
    ) -> StructurerResult<StructuredResult> {
        let _timer = PerformanceTimer::start("structured extraction");

        let request = match self.convention {
            CallConvention::SchemaConstrained => {
                GenerationRequest::constrained(prompt, self.schema.response_schema())
            }
            CallConvention::EmbeddedPayload => GenerationRequest::free_form(prompt),
        };

        let raw = generate_with_timeout(backend, &request, self.timeout).await?;
        debug!("Backend answered with {} chars", raw.len());

        let result = self.interpret(&raw)?;
        info!(
            "Extracted '{}' with {} sections and {} key data points",
            result.title,
            result.sections.len(),
            result.key_data_points.len()
        );
        Ok(result)
    }

    /// Turn raw backend text into a validated result
    pub fn interpret(&self, raw: &str) -> StructurerResult<StructuredResult> {
        match self.convention {
            CallConvention::SchemaConstrained => self.schema.parse(raw, raw),
            CallConvention::EmbeddedPayload => {
                let payload = embedded::find_payload(raw).ok_or_else(|| {
                    StructurerError::extraction_format("no fenced ```json block in the response", raw)
                })?;
                self.schema.parse(payload, raw)
            }
        }
    }
}
