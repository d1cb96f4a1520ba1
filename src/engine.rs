//! End-to-end ingestion pipeline.
//!
//! Resolution → download → sniff/open → parse → session, with the starting
//! position supplied by the progress store. Catalog indexes are built once
//! per section and cached for the engine's lifetime.

use crate::archive::ArchiveReader;
use crate::catalog::{CatalogIndex, ContentItem, ResolvedPath, encode_content_id};
use crate::downloader::Downloader;
use crate::error::Result;
use crate::formats::{MediaKind, cbz, epub};
use crate::metadata::{parse_comic_filename, parse_filename};
use crate::progress::{ContentDescriptor, ProgressStore};
use crate::session::{ReadingSession, SessionContent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Orchestrates catalog resolution, ingestion and session construction.
pub struct ReaderEngine {
    downloader: Arc<dyn Downloader>,
    progress: ProgressStore,
    catalogs: Mutex<HashMap<String, CatalogIndex>>,
}

impl ReaderEngine {
    /// Create an engine over a downloader and a progress store.
    pub fn new(downloader: Arc<dyn Downloader>, progress: ProgressStore) -> Self {
        Self {
            downloader,
            progress,
            catalogs: Mutex::new(HashMap::new()),
        }
    }

    /// Build and cache the index for one section from its manifest JSON.
    /// Reloading replaces the cached index wholesale.
    pub fn load_catalog(&self, manifest_json: &str) -> Result<String> {
        let index = CatalogIndex::build(manifest_json)?;
        let section = index.section().to_string();
        tracing::info!(section = %section, "catalog loaded");
        self.catalogs.lock().insert(section.clone(), index);
        Ok(section)
    }

    /// The cached index for a section, if loaded.
    pub fn catalog(&self, section: &str) -> Option<CatalogIndex> {
        self.catalogs.lock().get(section).cloned()
    }

    /// The progress store backing this engine.
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Resolve a content item against a section's catalog. Without a loaded
    /// catalog the result is the tentative best guess; the downloader is the
    /// authority on existence either way.
    pub fn resolve(&self, section: &str, item: &ContentItem) -> ResolvedPath {
        match self.catalogs.lock().get(section) {
            Some(index) => index.resolve(item),
            None => ResolvedPath {
                path: format!(
                    "{}/{}",
                    section.trim_matches('/'),
                    item.reference().trim_matches('/')
                ),
                verified: false,
            },
        }
    }

    /// Open a content item for reading: download, classify, parse, and
    /// construct a session resuming at the last persisted position.
    pub fn open(&self, section: &str, item: &ContentItem) -> Result<ReadingSession> {
        let resolved = self.resolve(section, item);
        tracing::debug!(path = %resolved.path, verified = resolved.verified, "opening content");

        let bytes = self.downloader.fetch_bytes(&resolved.path)?;
        let mut reader = ArchiveReader::open(bytes)?;
        let kind = detect_kind(&resolved.path, &reader);

        let filename = resolved.path.rsplit('/').next().unwrap_or(&resolved.path);
        let hint = parse_filename(filename);

        let (content, title, author) = match kind {
            MediaKind::Epub => {
                let doc = epub::parse(&mut reader, Some(&hint))?;
                let title = doc.title.clone();
                let author = doc.author.clone();
                (SessionContent::Book(doc), title, author)
            }
            MediaKind::Cbz | MediaKind::Cbr => {
                let pages = cbz::extract(&mut reader)?;
                let title = parse_comic_filename(filename)
                    .map(|(series, number)| format!("{series} #{number}"))
                    .unwrap_or_else(|| hint.title.clone());
                (SessionContent::Comic(pages), title, hint.author.clone())
            }
        };

        let content_id = encode_content_id(&resolved.path);
        let start = match self.progress.lookup(&content_id) {
            Ok(entry) => entry.map(|e| e.unit_index),
            Err(e) => {
                tracing::warn!(error = %e, "could not read saved position, starting fresh");
                None
            }
        };

        let descriptor = ContentDescriptor {
            content_id,
            path: resolved.path,
            title,
            author,
        };
        ReadingSession::new(descriptor, content, start, Some(self.progress.clone()))
    }
}

/// Media-kind dispatch: extension first, container probe as fallback. An
/// extensionless ZIP with EPUB packaging still opens as a book.
fn detect_kind(path: &str, reader: &ArchiveReader) -> MediaKind {
    if let Some(kind) = MediaKind::from_path(path) {
        return kind;
    }
    if reader.contains("META-INF/container.xml") {
        MediaKind::Epub
    } else {
        MediaKind::Cbz
    }
}

impl std::fmt::Debug for ReaderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderEngine")
            .field("sections", &self.catalogs.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Convenience wrapper: open raw bytes directly (no catalog, no download),
/// used by the CLI's inspect command.
pub fn inspect_bytes(bytes: Vec<u8>, name: &str) -> Result<SessionContent> {
    let mut reader = ArchiveReader::open(bytes)?;
    let kind = detect_kind(name, &reader);
    let hint = parse_filename(name);
    match kind {
        MediaKind::Epub => Ok(SessionContent::Book(epub::parse(&mut reader, Some(&hint))?)),
        MediaKind::Cbz | MediaKind::Cbr => Ok(SessionContent::Comic(cbz::extract(&mut reader)?)),
    }
}
