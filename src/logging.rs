use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
    Layer,
};

use crate::config::LogSettings;
use crate::error::{StructurerError, StructurerResult};

/// Logging configuration for the structurer
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: PathBuf,
    pub enable_file_logging: bool,
    pub enable_json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from(&LogSettings::default())
    }
}

impl From<&LogSettings> for LoggingConfig {
    fn from(settings: &LogSettings) -> Self {
        Self {
            level: settings.level.clone(),
            log_dir: settings.log_dir.clone(),
            enable_file_logging: settings.enable_file_logging,
            enable_json_format: settings.json,
        }
    }
}

/// Keeps the non-blocking file writer flushing until dropped
pub struct LoggingGuard {
    #[cfg(feature = "advanced_logging")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Quiet the HTTP stack unless explicitly asked for
        EnvFilter::new(format!(
            "chonker_structurer={},structurer={},hyper=warn,reqwest=warn,{}",
            level, level, level
        ))
    })
}

/// Initialize the logging system
pub fn init_logging(config: &LoggingConfig) -> StructurerResult<LoggingGuard> {
    // Console output goes to stderr so stdout stays clean for Markdown
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .boxed();

    let registry = Registry::default()
        .with(env_filter(&config.level))
        .with(console_layer);

    #[cfg(feature = "advanced_logging")]
    let guard = {
        if config.enable_file_logging {
            std::fs::create_dir_all(&config.log_dir).map_err(|e| {
                StructurerError::file_io(config.log_dir.to_string_lossy().to_string(), e)
            })?;

            let file_appender = tracing_appender::rolling::daily(&config.log_dir, "structurer.log");
            let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = if config.enable_json_format {
                fmt::layer().json().with_writer(file_writer).boxed()
            } else {
                fmt::layer().with_writer(file_writer).with_ansi(false).boxed()
            };

            registry
                .with(file_layer)
                .try_init()
                .map_err(|e| StructurerError::configuration(format!("logging already initialized: {}", e)))?;

            LoggingGuard { _file_guard: Some(file_guard) }
        } else {
            registry
                .try_init()
                .map_err(|e| StructurerError::configuration(format!("logging already initialized: {}", e)))?;

            LoggingGuard { _file_guard: None }
        }
    };

    #[cfg(not(feature = "advanced_logging"))]
    let guard = {
        registry
            .try_init()
            .map_err(|e| StructurerError::configuration(format!("logging already initialized: {}", e)))?;

        if config.enable_file_logging {
            tracing::warn!("File logging requested but the advanced_logging feature is disabled");
        }

        LoggingGuard {}
    };

    info!("🐹 Structurer logging initialized");
    info!("Log level: {}", config.level);

    if config.enable_file_logging && cfg!(feature = "advanced_logging") {
        info!("File logging enabled: {}", config.log_dir.display());
    }

    Ok(guard)
}

/// Performance logging utilities
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn start(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!("⏱️  Starting: {}", operation);
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    pub fn checkpoint(&self, checkpoint: &str) {
        let elapsed = self.start.elapsed();
        tracing::debug!("⏱️  {} - {}: {}ms", self.operation, checkpoint, elapsed.as_millis());
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        info!("⏱️  Completed {}: {}ms", self.operation, elapsed.as_millis());
    }
}

/// Macro for logging a pipeline error with its stage
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            stage = %$error.stage(),
            context = $context,
            recoverable = $error.is_recoverable(),
            "Structurer error occurred"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = LogSettings {
            level: "debug".to_string(),
            log_dir: PathBuf::from("/tmp/structurer-logs"),
            enable_file_logging: true,
            json: true,
        };
        let config = LoggingConfig::from(&settings);
        assert_eq!(config.level, "debug");
        assert!(config.enable_json_format);
        assert!(config.enable_file_logging);
    }

    #[test]
    fn test_timer_measures() {
        let timer = PerformanceTimer::start("unit");
        timer.checkpoint("halfway");
        assert!(timer.elapsed_ms() < 10_000);
    }
}
