use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Document ingestion and reading-state engine for a personal reading catalog.
#[derive(Parser, Debug, Clone)]
#[command(name = "readstack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "READSTACK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Initialize a default config and progress database.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Open a local EPUB/CBZ file and print its parsed structure.
    Inspect {
        /// Path to the archive file.
        file: PathBuf,
    },

    /// Generate the catalog manifest JSON for a directory tree.
    Manifest {
        /// Directory to index.
        path: PathBuf,

        /// Section name for the manifest (e.g. books, comics).
        #[arg(short, long)]
        section: String,
    },

    /// Show the recent reading history.
    History {
        /// Maximum entries to show.
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Progress persistence behavior.
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Catalog sections.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the content store.
    #[serde(default = "default_library_root")]
    pub library_root: PathBuf,

    /// Path to the progress SQLite database.
    #[serde(default = "default_progress_db")]
    pub progress_db: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            library_root: default_library_root(),
            progress_db: default_progress_db(),
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("library")
}

fn default_progress_db() -> PathBuf {
    PathBuf::from("data/progress.db")
}

/// Progress persistence behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Debounce window for position writes, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// History query cap.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// User key the progress records are stored under.
    #[serde(default = "default_user_key")]
    pub user_key: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            history_limit: default_history_limit(),
            user_key: default_user_key(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    crate::progress::DEFAULT_DEBOUNCE_MS
}

fn default_history_limit() -> usize {
    crate::progress::DEFAULT_HISTORY_LIMIT
}

fn default_user_key() -> String {
    "local".to_string()
}

/// Catalog sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Section folder names under the content root.
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            sections: default_sections(),
        }
    }
}

fn default_sections() -> Vec<String> {
    vec![
        "books".to_string(),
        "comics".to_string(),
        "audiobooks".to_string(),
    ]
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("readstack.toml"),
            dirs::config_dir()
                .map(|p| p.join("readstack").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/readstack/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# readstack configuration

[storage]
library_root = "library"
# progress_db = "/var/lib/readstack/progress.db"

[progress]
# Debounce window for position writes (ms)
debounce_ms = 2000
# Recent-history query cap
history_limit = 10
user_key = "local"

[catalog]
sections = ["books", "comics", "audiobooks"]
"#
        .to_string()
    }
}
