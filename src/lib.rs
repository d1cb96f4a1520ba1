//! readstack: document ingestion and reading-state engine for a personal
//! reading catalog.
//!
//! The engine identifies and parses the container formats used for books and
//! comics (EPUB and CBZ, with a CBR-as-mislabeled-ZIP fallback), resolves
//! logical content references against a hierarchical section catalog, exposes
//! a navigable in-memory document model with self-contained resources, drives
//! a small navigation state machine, and persists reading progress with
//! debounced writes and a bounded recent-history list.
//!
//! # Features
//!
//! - Signature-based container classification (extension is never trusted)
//! - EPUB container/OPF/spine parsing with sanitized, self-contained chapters
//! - CBZ page extraction in natural filename order
//! - Catalog manifests with case- and underscore-tolerant name resolution
//! - Debounced progress persistence with a forced flush on session close
//! - Recency-ordered, deduplicated reading history

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Container sniffing and archive access.
pub mod archive;
/// Catalog manifests, index and content resolution.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Byte retrieval from the content store.
pub mod downloader;
/// End-to-end ingestion pipeline.
pub mod engine;
/// Error types.
pub mod error;
/// Document models and format parsers.
pub mod formats;
/// Filename-derived metadata heuristics.
pub mod metadata;
/// Progress persistence and history.
pub mod progress;
/// Reading-session state machine.
pub mod session;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use engine::ReaderEngine;
pub use error::{AppError, Result};
pub use progress::{ProgressStore, SqliteBackend};
pub use session::ReadingSession;
