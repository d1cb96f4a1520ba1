//! readstack CLI entry point.

use clap::Parser;
use readstack::{
    config::{Cli, Command, Config},
    engine::inspect_bytes,
    progress::{ProgressStore, SqliteBackend},
    session::SessionContent,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readstack=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = cli.config.clone().or_else(Config::find_config_file);
    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Inspect { file } => cmd_inspect(&file),
        Command::Manifest { path, section } => cmd_manifest(&path, &section),
        Command::History { limit } => cmd_history(&config, limit),
    }
}

/// Initialize config and progress database.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _backend = SqliteBackend::open(&config.storage.progress_db)?;
    println!(
        "Initialized progress database: {}",
        config.storage.progress_db.display()
    );

    Ok(())
}

/// Parse a local archive and print its structure.
fn cmd_inspect(file: &PathBuf) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match inspect_bytes(bytes, &name)? {
        SessionContent::Book(doc) => {
            println!("Book: {}", doc.title);
            if let Some(author) = &doc.author {
                println!("Author: {}", author);
            }
            println!("Chapters: {}", doc.chapters.len());
            for chapter in &doc.chapters {
                println!("  {:>3}  {}", chapter.index, chapter.title);
            }
        }
        SessionContent::Comic(pages) => {
            println!("Comic with {} pages", pages.len());
            for page in &pages {
                println!(
                    "  {:>3}  {} ({} bytes)",
                    page.index,
                    page.source_name,
                    page.bytes.len()
                );
            }
        }
        SessionContent::Released => unreachable!("inspect never yields a released session"),
    }

    Ok(())
}

/// Emit the catalog manifest JSON for a directory tree.
fn cmd_manifest(path: &PathBuf, section: &str) -> anyhow::Result<()> {
    if !path.is_dir() {
        anyhow::bail!("Path is not a directory: {}", path.display());
    }

    let manifest = readstack::catalog::build_manifest(path, section)?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

/// Print the recent reading history.
fn cmd_history(config: &Config, limit: Option<usize>) -> anyhow::Result<()> {
    let backend = SqliteBackend::open(&config.storage.progress_db)?;
    let store = ProgressStore::new(
        Arc::new(backend),
        &config.progress.user_key,
        Duration::from_millis(config.progress.debounce_ms),
    );

    let entries = store.get_history(limit.unwrap_or(config.progress.history_limit))?;
    if entries.is_empty() {
        println!("No reading history.");
        return Ok(());
    }

    println!("{:<40} {:<20} {:>9} LAST READ", "TITLE", "AUTHOR", "POSITION");
    println!("{}", "-".repeat(90));
    for entry in entries {
        let when = chrono::DateTime::from_timestamp_millis(entry.last_access_ms)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{:<40} {:<20} {:>4}/{:<4} {}",
            entry.title,
            entry.author.as_deref().unwrap_or("-"),
            entry.unit_index + 1,
            entry.total_units,
            when
        );
    }

    Ok(())
}
