use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ai_story_sets::config::Config;
use ai_story_sets::init;
use ai_story_sets::model::GenerationRequest;
use ai_story_sets::retry::DEFAULT_MAX_RETRIES;
use ai_story_sets::service::{ContentService, ServiceError};
use ai_story_sets::store::FileStore;

#[derive(Parser)]
#[command(name = "ai-story-cli", version, about = "Generate story content in sets")]
struct Cli {
    /// Config file (defaults to $STORY_CONFIG or config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a generation request read from a JSON file
    Generate { request: PathBuf },
    /// Retry the failed sets of a stored title
    Retry {
        title: String,
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,
    },
    /// Show which sets of a title are stored
    Status { title: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a result that was computed but not saved before failing.
fn surface_unsaved(err: ServiceError) -> anyhow::Error {
    if let ServiceError::Unsaved { result, .. } = &err {
        if let Ok(text) = serde_json::to_string_pretty(result) {
            println!("{}", text);
        }
    }
    err.into()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ai_story_sets=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path).await?,
        None => Config::load_default().await?,
    };

    init::ensure_directories(&config.data_dir).await?;
    let service = ContentService::from_config(&config, Arc::new(FileStore::new(&config.data_dir)))?;

    match cli.command {
        Command::Generate { request: path } => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read request: {}", path.display()))?;
            let request: GenerationRequest = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse request: {}", path.display()))?;
            let result = service.generate(request).await.map_err(surface_unsaved)?;
            print_json(&result)?;
            if result.has_failures() {
                std::process::exit(2);
            }
        }
        Command::Retry { title, max_retries } => {
            let report = service
                .retry_by_title(&title, max_retries)
                .await
                .map_err(surface_unsaved)?;
            print_json(&report)?;
            if !report.all_completed {
                std::process::exit(2);
            }
        }
        Command::Status { title } => {
            let status = service.status(&title).await?;
            print_json(&status)?;
            if !status.exists {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
