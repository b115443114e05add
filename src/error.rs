use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Ingestion,
    Aggregation,
    Backend,
    Extraction,
    Validation,
    Editing,
    Configuration,
    Export,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Ingestion => "ingestion",
            PipelineStage::Aggregation => "aggregation",
            PipelineStage::Backend => "backend",
            PipelineStage::Extraction => "extraction",
            PipelineStage::Validation => "validation",
            PipelineStage::Editing => "editing",
            PipelineStage::Configuration => "configuration",
            PipelineStage::Export => "export",
        };
        f.write_str(name)
    }
}

/// What went wrong while talking to the generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFailureKind {
    Timeout,
    Auth,
    Quota,
    Network,
    Service,
    MalformedResponse,
}

impl fmt::Display for BackendFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendFailureKind::Timeout => "timeout",
            BackendFailureKind::Auth => "auth",
            BackendFailureKind::Quota => "quota",
            BackendFailureKind::Network => "network",
            BackendFailureKind::Service => "service",
            BackendFailureKind::MalformedResponse => "malformed response",
        };
        f.write_str(name)
    }
}

/// Main error type for the structurer pipeline
#[derive(Error, Debug)]
pub enum StructurerError {
    #[error("Could not read {input}: {message}")]
    Ingestion {
        input: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Nothing to process: paste some text or load a workbook with data")]
    EmptyInput,

    #[error("Generation backend failed ({kind}): {message}")]
    Backend {
        kind: BackendFailureKind,
        message: String,
    },

    #[error("Backend response is missing the expected payload: {message}")]
    ExtractionFormat { message: String, raw: String },

    #[error("Structured payload rejected at `{field}`: {reason}")]
    SchemaValidation {
        field: String,
        reason: String,
        raw: String,
    },

    #[error("Edit instruction is empty")]
    EmptyInstruction,

    #[error("An edit is already in flight for this session")]
    EditInFlight,

    #[error("Edit ticket {ticket} does not match the pending edit")]
    StaleEdit { ticket: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Missing credential: set the {variable} environment variable")]
    MissingCredential { variable: String },

    #[error("File I/O error: {path}")]
    FileIO {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StructurerError {
    pub fn ingestion(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            input: input.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn ingestion_with_source(
        input: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Ingestion {
            input: input.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn backend(kind: BackendFailureKind, message: impl Into<String>) -> Self {
        Self::Backend {
            kind,
            message: message.into(),
        }
    }

    pub fn extraction_format(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ExtractionFormat {
            message: message.into(),
            raw: raw.into(),
        }
    }

    pub fn schema_validation(
        field: impl Into<String>,
        reason: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self::SchemaValidation {
            field: field.into(),
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn file_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileIO {
            path: path.into(),
            source,
        }
    }

    /// Stage the failure belongs to, for reporting
    pub fn stage(&self) -> PipelineStage {
        match self {
            StructurerError::Ingestion { .. } => PipelineStage::Ingestion,
            StructurerError::EmptyInput => PipelineStage::Aggregation,
            StructurerError::Backend { .. } => PipelineStage::Backend,
            StructurerError::ExtractionFormat { .. } => PipelineStage::Extraction,
            StructurerError::SchemaValidation { .. } => PipelineStage::Validation,
            StructurerError::EmptyInstruction
            | StructurerError::EditInFlight
            | StructurerError::StaleEdit { .. } => PipelineStage::Editing,
            StructurerError::Configuration { .. }
            | StructurerError::MissingCredential { .. } => PipelineStage::Configuration,
            StructurerError::FileIO { .. } => PipelineStage::Export,
        }
    }

    /// Raw backend output attached to extraction failures
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            StructurerError::ExtractionFormat { raw, .. }
            | StructurerError::SchemaValidation { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Check if error is recoverable (the user can retry within the session)
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            StructurerError::MissingCredential { .. } | StructurerError::Configuration { .. }
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            StructurerError::Ingestion { input, .. } => {
                format!("📁 Couldn't read {}. It might be corrupted or in an unsupported format.", input)
            }
            StructurerError::EmptyInput => {
                "📭 Nothing to process yet. Paste some text or load a workbook first.".to_string()
            }
            StructurerError::Backend { kind: BackendFailureKind::Timeout, .. } => {
                "⏰ The AI backend took too long to answer. Try again.".to_string()
            }
            StructurerError::Backend { kind: BackendFailureKind::Auth, .. } => {
                "🔑 The AI backend rejected the API key.".to_string()
            }
            StructurerError::Backend { kind: BackendFailureKind::Quota, .. } => {
                "🚦 The AI backend quota is exhausted. Wait a bit and retry.".to_string()
            }
            StructurerError::Backend { .. } => {
                "🌐 Couldn't reach the AI backend. Your document was left unchanged.".to_string()
            }
            StructurerError::ExtractionFormat { .. } | StructurerError::SchemaValidation { .. } => {
                "🧩 The AI answer didn't match the expected structure. Try a clearer instruction.".to_string()
            }
            StructurerError::EmptyInstruction => "✏️ Type an instruction first.".to_string(),
            StructurerError::EditInFlight => {
                "⏳ An edit is still running. Wait for it to finish.".to_string()
            }
            StructurerError::MissingCredential { variable } => {
                format!("🔑 Set {} before starting.", variable)
            }
            _ => "🐹 Something went wrong. Check the logs for details.".to_string(),
        }
    }
}

/// Result type alias for convenience
pub type StructurerResult<T> = Result<T, StructurerError>;

/// Attach the name of the input being read to a foreign error
pub trait IngestionContext<T> {
    fn ingestion_context(self, input: &str, message: &str) -> StructurerResult<T>;
}

impl<T, E> IngestionContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn ingestion_context(self, input: &str, message: &str) -> StructurerResult<T> {
        self.map_err(|e| StructurerError::ingestion_with_source(input, format!("{}: {}", message, e), e))
    }
}
