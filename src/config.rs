use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::error::{StructurerError, StructurerResult};

/// Environment variable holding the generation backend credential
pub const API_KEY_VARIABLE: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructurerConfig {
    pub backend: BackendConfig,
    pub ingestion: IngestionConfig,
    pub editing: EditingConfig,
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Model name passed to the generation endpoint
    pub model: String,

    /// Base URL of the generation API
    pub endpoint: String,

    /// Upper bound for a whole backend call, retries included
    pub timeout_seconds: u64,

    pub connect_timeout_seconds: u64,

    /// Attempts for rate-limited or 5xx responses
    pub max_retries: usize,

    pub convention: CallConvention,
}

/// How the backend is asked for the structured payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallConvention {
    /// Backend is given the response schema and answers with bare JSON
    SchemaConstrained,
    /// Backend answers in prose with a fenced JSON block
    EmbeddedPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub normalization: NormalizationMode,
    pub aggregation: AggregationPolicy,
}

/// Merged-cell handling for spreadsheet input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Resolve true merge regions; pass through when the format has none
    MergeRegions,
    /// Always propagate the last non-empty value down each column
    FillDown,
    /// Merge regions when the format exposes them, fill-down otherwise
    Auto,
}

/// Precedence between pasted text and sheet content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Pasted text first, sheets after it in workbook order
    AppendSheets,
    /// Sheets, when present, discard the pasted text
    SheetsReplaceText,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingConfig {
    /// Oldest turns are evicted past this bound
    pub max_history_turns: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub log_dir: PathBuf,
    pub enable_file_logging: bool,
    pub json: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash-latest".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_seconds: 120,
            connect_timeout_seconds: 15,
            max_retries: 3,
            convention: CallConvention::SchemaConstrained,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            normalization: NormalizationMode::MergeRegions,
            aggregation: AggregationPolicy::AppendSheets,
        }
    }
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self { max_history_turns: 16 }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            enable_file_logging: false,
            json: false,
        }
    }
}

impl StructurerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: StructurerConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override with environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("STRUCTURER_MODEL") {
            if !model.trim().is_empty() {
                self.backend.model = model;
            }
        }

        if let Ok(timeout) = std::env::var("STRUCTURER_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.backend.timeout_seconds = value;
            }
        }

        if let Ok(convention) = std::env::var("STRUCTURER_CONVENTION") {
            if let Some(value) = CallConvention::parse(&convention) {
                self.backend.convention = value;
            }
        }

        if let Ok(level) = std::env::var("STRUCTURER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    pub fn validate(&self) -> StructurerResult<()> {
        if self.backend.timeout_seconds == 0 {
            return Err(StructurerError::configuration("backend.timeout_seconds must be positive"));
        }
        if self.backend.max_retries == 0 {
            return Err(StructurerError::configuration("backend.max_retries must be at least 1"));
        }
        if self.editing.max_history_turns < 2 {
            return Err(StructurerError::configuration(
                "editing.max_history_turns must hold at least one exchange",
            ));
        }
        Ok(())
    }
}

impl CallConvention {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "schema" | "schema_constrained" | "json" => Some(CallConvention::SchemaConstrained),
            "embedded" | "embedded_payload" | "fenced" => Some(CallConvention::EmbeddedPayload),
            _ => None,
        }
    }
}

/// Backend credential, read once at startup
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn from_env() -> StructurerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StructurerResult<Self> {
        match lookup(API_KEY_VARIABLE) {
            Some(key) if !key.trim().is_empty() => Ok(Self(key.trim().to_string())),
            _ => Err(StructurerError::MissingCredential {
                variable: API_KEY_VARIABLE.to_string(),
            }),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}
