//! Document models and format-specific parsers.

pub mod cbz;
pub mod epub;

use serde::{Deserialize, Serialize};

/// Media kinds the ingestion pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// EPUB book (ZIP container with OPF packaging).
    Epub,
    /// CBZ comic (ZIP of page images).
    Cbz,
    /// CBR comic. Only ever readable when it is a mislabeled ZIP.
    Cbr,
}

impl MediaKind {
    /// Detect a media kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(MediaKind::Epub),
            "cbz" => Some(MediaKind::Cbz),
            "cbr" => Some(MediaKind::Cbr),
            _ => None,
        }
    }

    /// Detect a media kind from a path's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        path.rsplit_once('.').and_then(|(_, e)| Self::from_extension(e))
    }
}

/// One readable unit of a book, ordered by spine position. The HTML is
/// sanitized and self-contained: scripts, styles and event handlers are gone,
/// and every image either embeds its bytes or is hidden.
#[derive(Debug, Clone)]
pub struct Chapter {
    /// 0-based spine position.
    pub index: usize,
    /// Display title, derived from the content file name.
    pub title: String,
    /// Sanitized chapter markup.
    pub html: String,
}

/// One page of a comic, ordered by natural filename sort.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based page position.
    pub index: usize,
    /// In-archive name the page came from.
    pub source_name: String,
    /// Decompressed image bytes.
    pub bytes: Vec<u8>,
}

/// Parsed book: metadata plus the ordered chapter list.
#[derive(Debug, Clone)]
pub struct Document {
    /// Display title.
    pub title: String,
    /// Author, when known.
    pub author: Option<String>,
    /// Chapters in spine order.
    pub chapters: Vec<Chapter>,
}
