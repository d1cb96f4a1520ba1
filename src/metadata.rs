//! Filename-derived title and author heuristics.
//!
//! Catalog filenames carry loose conventions ("Author - Title.epub",
//! "Title (Author).epub", underscores for spaces). Parsing them is inherently
//! heuristic, so the whole policy lives here as one pure function with an
//! explicit ordered pattern list and a documented fallback. OPF metadata is
//! only consulted when these heuristics yield nothing usable.

use regex::Regex;
use std::sync::LazyLock;

/// Title and optional author derived from a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameMeta {
    /// Display title.
    pub title: String,
    /// Author, when the filename encodes one.
    pub author: Option<String>,
}

static AUTHOR_DASH_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^-]+?)\s+-\s+(.+)$").unwrap());
static TITLE_PAREN_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)$").unwrap());
static TITLE_BY_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+by\s+(.+)$").unwrap());
static SERIES_ISSUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*(?:#|[vV]ol?\.?\s*|[vV])(\d+(?:\.\d+)?)\s*$").unwrap());

/// Parse title/author from a filename (with or without extension).
///
/// Patterns are tried in order:
/// 1. `Author - Title`
/// 2. `Title (Author)`
/// 3. `Title by Author`
///
/// Fallback: the whole stem becomes the title with no author. Underscores are
/// treated as spaces throughout, matching the catalog's name equivalence.
pub fn parse_filename(name: &str) -> FilenameMeta {
    let stem = strip_extension(name).replace('_', " ");
    let stem = stem.trim();

    if let Some(caps) = AUTHOR_DASH_TITLE.captures(stem) {
        return FilenameMeta {
            title: caps[2].trim().to_string(),
            author: Some(caps[1].trim().to_string()),
        };
    }
    if let Some(caps) = TITLE_PAREN_AUTHOR.captures(stem) {
        return FilenameMeta {
            title: caps[1].trim().to_string(),
            author: Some(caps[2].trim().to_string()),
        };
    }
    if let Some(caps) = TITLE_BY_AUTHOR.captures(stem) {
        return FilenameMeta {
            title: caps[1].trim().to_string(),
            author: Some(caps[2].trim().to_string()),
        };
    }

    FilenameMeta {
        title: stem.to_string(),
        author: None,
    }
}

/// Parse comic filenames into series name and issue/volume number.
/// Recognizes "Series v01", "Series Vol. 1", "Series #12".
pub fn parse_comic_filename(name: &str) -> Option<(String, f32)> {
    let stem = strip_extension(name).replace('_', " ");
    let caps = SERIES_ISSUE.captures(stem.trim())?;
    let series = caps[1].trim().trim_end_matches(['-', '#']).trim();
    if series.is_empty() {
        return None;
    }
    let number: f32 = caps[2].parse().ok()?;
    Some((series.to_string(), number))
}

/// Two filenames are equivalent if they match after lower-casing and mapping
/// every underscore to a single space. Historical uploads and the published
/// catalog disagree on underscore-vs-space usage.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', " ")
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem,
        _ => name,
    }
}
