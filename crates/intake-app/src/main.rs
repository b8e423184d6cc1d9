//! Intake application binary - composition root.
//!
//! Ties together all intake crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Initialize storage (SQLite)
//! 3. Build the turn pipeline (extract -> merge -> evolve -> write)
//! 4. Run an interactive console session against the pipeline

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use intake_core::config::IntakeConfig;
use intake_core::{Language, TurnRequest};
use intake_extract::LlmEngine;
use intake_pipeline::IntakePipeline;
use intake_storage::Database;

#[derive(Parser)]
#[command(name = "intake", about = "Conversational intake pipeline console")]
struct Cli {
    /// Path to the TOML config file (default: $INTAKE_CONFIG or ~/.intake/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Patient id to attach captured fields to
    #[arg(long)]
    patient: Option<String>,

    /// Resume an existing session by id
    #[arg(long)]
    session: Option<uuid::Uuid>,

    /// Conversation language: es or en
    #[arg(long, default_value = "es")]
    language: String,

    /// List stored sessions and exit
    #[arg(long)]
    list: bool,
}

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if let Some(rest) = data_dir.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (flag, INTAKE_CONFIG env, or ~/.intake/config.toml).
fn config_path(cli: &Cli) -> PathBuf {
    if let Some(path) = &cli.config {
        return path.clone();
    }
    if let Ok(p) = std::env::var("INTAKE_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".intake").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting intake v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = config_path(&cli);
    let config = IntakeConfig::load_or_default(&config_file);
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("intake.db");
    let db = Arc::new(Database::open(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Extraction and reply engines share one LLM client.
    let engine = Arc::new(LlmEngine::from_config(&config.llm)?);
    tracing::info!(model = %config.llm.model, "LLM engine ready");

    let extraction: Arc<dyn intake_extract::ExtractionEngine> = engine.clone();
    let replies: Arc<dyn intake_extract::ReplyEngine> = engine;
    let pipeline = IntakePipeline::new(
        db,
        extraction,
        replies,
        intake_core::catalog::Catalog::builtin(),
        config.pipeline.clone(),
    );

    if cli.list {
        for summary in pipeline.list_sessions()? {
            println!(
                "{}  patient={}  topic={}  messages={}  updated={}",
                summary.id,
                summary.patient_id.as_deref().unwrap_or("-"),
                summary.current_topic,
                summary.message_count,
                summary.updated_at.to_rfc3339(),
            );
        }
        return Ok(());
    }

    let language = match cli.language.as_str() {
        "en" => Language::En,
        _ => Language::Es,
    };

    // Interactive turn loop: one line in, one assistant reply out.
    let mut session_id = cli.session;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    stdout.write_all(b"> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() || message == "/quit" {
            if message == "/quit" {
                break;
            }
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }

        let request = TurnRequest {
            session_id,
            patient_id: cli.patient.clone(),
            message: message.to_string(),
            language,
        };

        match pipeline.handle_turn(request).await {
            Ok(outcome) => {
                session_id = Some(outcome.session.id);
                if !outcome.tables_written.is_empty() {
                    tracing::info!(tables = ?outcome.tables_written, "Fields persisted");
                }
                stdout
                    .write_all(format!("{}\n> ", outcome.assistant_reply).as_bytes())
                    .await?;
                stdout.flush().await?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn rejected");
                stdout.write_all(format!("({})\n> ", e).as_bytes()).await?;
                stdout.flush().await?;
            }
        }
    }

    if let Some(id) = session_id {
        tracing::info!(session_id = %id, "Session saved");
    }

    Ok(())
}
