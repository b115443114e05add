use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::backend::GenerationBackend;
use crate::config::StructurerConfig;
use crate::error::StructurerError;
use crate::render::RenderedDocument;
use crate::session::Session;
use crate::tabular::{TableFormatter, WorkbookNormalizer};

/// Where the session reads its input from
#[derive(Debug, Default, Clone)]
pub struct InputFiles {
    pub text: Option<PathBuf>,
    pub workbook: Option<PathBuf>,
}

/// Run the whole pipeline once
pub async fn structure_command(
    config: StructurerConfig,
    backend: &dyn GenerationBackend,
    inputs: InputFiles,
    instructions: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("🧱 Structuring with {} ({:?})", backend.name(), config.backend.convention);

    let mut session = Session::new(config);
    load_inputs(&mut session, &inputs).await?;

    let document = session.process(backend, instructions.as_deref()).await?;
    let outline = document.outline();
    let document = document.clone();
    write_or_print(&document, output.as_deref()).await?;

    if output.is_some() {
        println!("🎉 Structuring Complete!");
        println!("   Sections: {}", outline.iter().filter(|(level, _)| *level == 2).count());
        println!("   Bytes written: {}", document.len());
        if let Some(path) = &output {
            println!("   Output file: {:?}", path);
        }
    }

    Ok(())
}

/// Single AI edit of an existing Markdown file
pub async fn edit_command(
    config: StructurerConfig,
    backend: &dyn GenerationBackend,
    document_path: PathBuf,
    instruction: String,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("✏️ Editing: {:?}", document_path);

    if !document_path.exists() {
        return Err(anyhow!("Document not found: {:?}", document_path));
    }
    let content = tokio::fs::read_to_string(&document_path).await?;

    let mut session = Session::new(config);
    session.apply_manual_edit(content)?;
    let document = session.submit_edit(backend, &instruction).await?.clone();

    let output_path = output.unwrap_or_else(|| {
        let stem = document_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        document_path.with_file_name(format!("{}_edited.md", stem))
    });
    document.export(&output_path).await?;

    println!("🎉 Edit Applied!");
    println!("   Input file: {:?}", document_path);
    println!("   Output file: {:?}", output_path);

    Ok(())
}

/// Structure, then keep editing from stdin until `:quit`
pub async fn refine_command(
    config: StructurerConfig,
    backend: &dyn GenerationBackend,
    inputs: InputFiles,
    instructions: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut session = Session::new(config);
    load_inputs(&mut session, &inputs).await?;

    match session.process(backend, instructions.as_deref()).await {
        Ok(document) => println!("{}", document),
        Err(e) => recover(e, "initial structuring")?,
    }
    println!("Type an edit instruction, or :process [INSTRUCTIONS], :load FILE, :show, :save [FILE], :history, :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match RefineCommand::parse(line) {
            RefineCommand::Quit => break,
            RefineCommand::Show => println!("{}", session.document()),
            RefineCommand::History => {
                for revision in session.revisions() {
                    println!(
                        "{}  {:<10} {:>7} bytes  {}",
                        revision.at.format("%H:%M:%S"),
                        revision.origin.to_string(),
                        revision.bytes,
                        revision.id
                    );
                }
                for turn in session.last_exchange() {
                    println!("   {}: {} chars", turn.role, turn.content.len());
                }
            }
            RefineCommand::Save(path) => {
                let Some(path) = path.or_else(|| output.clone()) else {
                    println!("Usage: :save FILE (no --output given)");
                    continue;
                };
                match session.document().export(&path).await {
                    Ok(()) => println!("📝 Saved to {:?}", path),
                    Err(e) => recover(e, "save")?,
                }
            }
            RefineCommand::Load(path) => match tokio::fs::read_to_string(&path).await {
                Ok(text) => match session.apply_manual_edit(text) {
                    Ok(()) => println!("📥 Document replaced from {:?}", path),
                    Err(e) => recover(e, "manual edit")?,
                },
                Err(e) => println!("❌ Failed to read {:?}: {}", path, e),
            },
            RefineCommand::Process(new_instructions) => {
                let chosen = new_instructions.or(instructions.as_deref());
                match session.process(backend, chosen).await {
                    Ok(document) => println!("{}", document),
                    Err(e) => recover(e, "restructure")?,
                }
            }
            RefineCommand::Instruction(instruction) => {
                match session.submit_edit(backend, instruction).await {
                    Ok(document) => println!("{}", document),
                    Err(e) => recover(e, "refine edit")?,
                }
            }
        }
    }

    if let Some(path) = &output {
        session.document().export(path).await?;
        println!("📝 Final document saved to {:?}", path);
    }

    Ok(())
}

/// Report a recoverable failure and keep the session going; anything else ends it
fn recover(error: StructurerError, context: &str) -> Result<()> {
    if !error.is_recoverable() {
        return Err(error.into());
    }
    crate::log_error!(error, context);
    eprintln!("{}", error_report(&error));
    Ok(())
}

/// User-facing description of a failure, raw backend output included
pub fn error_report(error: &StructurerError) -> String {
    let mut report = format!("{}\n   [{}] {}", error.user_message(), error.stage(), error);
    if let Some(raw) = error.raw_response() {
        report.push_str("\n   Raw backend output:");
        for line in raw.lines() {
            report.push_str("\n   | ");
            report.push_str(line);
        }
    }
    report
}

/// Print normalized sheets; needs no backend
pub async fn normalize_command(config: StructurerConfig, workbook: PathBuf) -> Result<()> {
    info!("📊 Normalizing workbook: {:?}", workbook);

    if !workbook.exists() {
        return Err(anyhow!("Workbook not found: {:?}", workbook));
    }
    let bytes = tokio::fs::read(&workbook).await?;
    let name = display_name(&workbook);

    let sheets = crate::tabular::load_workbook(&bytes, &name)?;
    let (tables, changes) = WorkbookNormalizer::new(config.ingestion.normalization).normalize(sheets);

    let formatter = TableFormatter::new();
    for table in &tables {
        println!("## Sheet: {}\n", table.name);
        println!("{}", formatter.format_table(table));
    }
    println!("{}", changes.summary());

    Ok(())
}

/// Write the default configuration file
pub async fn init_config_command(path: PathBuf) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("Refusing to overwrite existing file: {:?}", path));
    }
    StructurerConfig::default().save_to_file(&path)?;
    println!("⚙️ Default configuration written to {:?}", path);
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum RefineCommand<'a> {
    Quit,
    Show,
    History,
    Save(Option<PathBuf>),
    /// Replace the document with a file's contents
    Load(PathBuf),
    /// Run structuring again, optionally with new instructions
    Process(Option<&'a str>),
    Instruction(&'a str),
}

impl<'a> RefineCommand<'a> {
    fn parse(line: &'a str) -> Self {
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));

        match (word, rest) {
            (":quit" | ":q", "") => RefineCommand::Quit,
            (":show", "") => RefineCommand::Show,
            (":history", "") => RefineCommand::History,
            (":save", "") => RefineCommand::Save(None),
            (":save", path) => RefineCommand::Save(Some(PathBuf::from(path))),
            (":load", path) if !path.is_empty() => RefineCommand::Load(PathBuf::from(path)),
            (":process", "") => RefineCommand::Process(None),
            (":process", instructions) => RefineCommand::Process(Some(instructions)),
            _ => RefineCommand::Instruction(line),
        }
    }
}

async fn load_inputs(session: &mut Session, inputs: &InputFiles) -> Result<()> {
    if let Some(path) = &inputs.text {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read text input {:?}: {}", path, e))?;
        session.set_pasted_text(text);
    }

    if let Some(path) = &inputs.workbook {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read workbook {:?}: {}", path, e))?;
        let changes = session.load_workbook(&bytes, &display_name(path))?;
        info!("{}", changes.summary());
    }

    Ok(())
}

async fn write_or_print(document: &RenderedDocument, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            document.export(path).await?;
            info!("📝 Markdown saved to: {:?}", path);
        }
        None => print!("{}", document),
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
