use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use chonker_structurer::backend::GeminiBackend;
use chonker_structurer::cli::{self, InputFiles};
use chonker_structurer::config::{ApiKey, CallConvention, StructurerConfig};
use chonker_structurer::error::StructurerError;
use chonker_structurer::logging::{init_logging, LoggingConfig};

#[derive(Parser)]
#[command(name = "structurer")]
#[command(about = "Turn pasted text and spreadsheets into structured, editable Markdown")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the backend model name
    #[arg(long, global = true, value_name = "NAME")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and write Markdown
    Structure {
        /// Plain text input
        #[arg(long, value_name = "FILE")]
        text: Option<PathBuf>,

        /// Spreadsheet input (.xlsx, .xls, .xlsb, .ods)
        #[arg(long, value_name = "FILE")]
        workbook: Option<PathBuf>,

        /// Free-form instructions for the analysis
        #[arg(long)]
        instructions: Option<String>,

        /// Output Markdown file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Backend calling convention: schema or embedded
        #[arg(long)]
        convention: Option<String>,
    },

    /// Rewrite an existing Markdown document with one instruction
    Edit {
        document: PathBuf,

        #[arg(short, long)]
        instruction: String,

        /// Output file (defaults to <document>_edited.md)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Structure, then edit interactively from stdin
    Refine {
        #[arg(long, value_name = "FILE")]
        text: Option<PathBuf>,

        #[arg(long, value_name = "FILE")]
        workbook: Option<PathBuf>,

        #[arg(long)]
        instructions: Option<String>,

        /// Default target for :save and the final document
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the normalized sheet tables of a workbook
    Normalize { workbook: PathBuf },

    /// Write the default configuration file
    InitConfig { path: PathBuf },
}

impl Commands {
    fn needs_backend(&self) -> bool {
        matches!(self, Commands::Structure { .. } | Commands::Edit { .. } | Commands::Refine { .. })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<StructurerError>() {
            Some(structurer_error) => {
                chonker_structurer::log_error!(structurer_error, "structurer run");
                eprintln!("{}", cli::error_report(structurer_error));
            }
            None => eprintln!("❌ {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // The credential is checked before anything else touches the filesystem
    let api_key = if cli.command.needs_backend() {
        Some(ApiKey::from_env()?)
    } else {
        None
    };

    let mut config = match &cli.config {
        Some(path) => StructurerConfig::load_from_file(path)?,
        None => StructurerConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(model) = cli.model {
        config.backend.model = model;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Commands::Structure { convention: Some(convention), .. } = &cli.command {
        config.backend.convention = CallConvention::parse(convention)
            .ok_or_else(|| anyhow!("Unknown convention '{}': use schema or embedded", convention))?;
    }
    config.validate()?;

    let _guard = init_logging(&LoggingConfig::from(&config.logging))?;
    info!("🐹 structurer v{} starting", env!("CARGO_PKG_VERSION"));

    let backend = match api_key {
        Some(key) => Some(GeminiBackend::new(&config.backend, key)?),
        None => None,
    };

    match (cli.command, backend) {
        (Commands::Structure { text, workbook, instructions, output, .. }, Some(backend)) => {
            cli::structure_command(config, &backend, InputFiles { text, workbook }, instructions, output).await
        }
        (Commands::Edit { document, instruction, output }, Some(backend)) => {
            cli::edit_command(config, &backend, document, instruction, output).await
        }
        (Commands::Refine { text, workbook, instructions, output }, Some(backend)) => {
            cli::refine_command(config, &backend, InputFiles { text, workbook }, instructions, output).await
        }
        (Commands::Normalize { workbook }, _) => cli::normalize_command(config, workbook).await,
        (Commands::InitConfig { path }, _) => cli::init_config_command(path).await,
        (_, None) => Err(anyhow!("backend is not configured")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_structure_arguments() {
        let cli = Cli::try_parse_from([
            "structurer", "--model", "gemini-test", "structure",
            "--text", "notes.txt", "--convention", "embedded", "-o", "out.md",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("gemini-test"));
        assert!(cli.command.needs_backend());
        match cli.command {
            Commands::Structure { text, convention, output, .. } => {
                assert_eq!(text, Some(PathBuf::from("notes.txt")));
                assert_eq!(convention.as_deref(), Some("embedded"));
                assert_eq!(output, Some(PathBuf::from("out.md")));
            }
            _ => panic!("expected structure"),
        }
    }

    #[test]
    fn test_normalize_needs_no_backend() {
        let cli = Cli::try_parse_from(["structurer", "normalize", "budget.xlsx"]).unwrap();
        assert!(!cli.command.needs_backend());
    }

    #[test]
    fn test_edit_requires_instruction() {
        assert!(Cli::try_parse_from(["structurer", "edit", "doc.md"]).is_err());
    }
}
