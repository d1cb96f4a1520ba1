//! Catalog manifest model, in-memory index and content-reference resolution.
//!
//! Each catalog section (books, comics, audiobooks) publishes a JSON manifest
//! describing every file under its content root. The manifest is fetched once
//! per section and indexed here; resolution degrades to a tentative path when
//! nothing matches, because the downloader is the authority on existence.

use crate::error::{AppError, Result};
use crate::metadata::normalize_name;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node kind in the published manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory with nested items.
    Dir,
}

/// One node of the published manifest tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestNode {
    /// Base name of the file or directory.
    pub name: String,
    /// Node kind.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Path relative to the section root (no section prefix).
    pub relpath: String,
    /// File extension, lowercase, without the dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    /// Children, for directories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ManifestNode>,
}

/// Published manifest for one catalog section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Generation timestamp (RFC 3339).
    pub generated_at: String,
    /// Section folder name, e.g. `comics`.
    pub folder: String,
    /// Total number of file nodes.
    pub count: usize,
    /// Root items.
    pub items: Vec<ManifestNode>,
}

/// Indexed catalog node. `full_relpath` is unique within a section and
/// includes the section prefix; the tree is rebuilt wholesale on manifest
/// reload and read-only to consumers.
#[derive(Debug, Clone)]
pub struct CatalogNode {
    /// Base name.
    pub name: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Manifest-relative path (no section prefix).
    pub relpath: String,
    /// Section-prefixed path, e.g. `comics/Series/Issue.cbz`.
    pub full_relpath: String,
    /// Lowercase extension without the dot, for files.
    pub ext: Option<String>,
    /// Children, for directories.
    pub children: Vec<CatalogNode>,
}

/// A logical content reference as known to the UI, canonicalized at this
/// boundary so downstream code never branches on shape again.
#[derive(Debug, Clone)]
pub enum ContentItem {
    /// A clean catalog entry, identified by its manifest-relative path.
    Catalog {
        /// Manifest-relative path of the entry.
        relpath: String,
    },
    /// A legacy record: an opaque identifier plus whatever display metadata
    /// the old storage kept alongside it.
    Legacy {
        /// Raw legacy identifier (usually a filename, often with underscores).
        raw: String,
        /// Stored display title, if any.
        title: Option<String>,
        /// Stored author, if any.
        author: Option<String>,
    },
}

impl ContentItem {
    /// The identifier used for catalog resolution.
    pub fn reference(&self) -> &str {
        match self {
            ContentItem::Catalog { relpath } => relpath,
            ContentItem::Legacy { raw, .. } => raw,
        }
    }
}

/// A resolved content path. Tentative results were never matched against the
/// catalog and must be treated as unverified best guesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Section-prefixed relative path handed to the downloader.
    pub path: String,
    /// Whether the path was confirmed against the catalog index.
    pub verified: bool,
}

/// In-memory index over one section's manifest tree.
#[derive(Debug, Clone)]
pub struct CatalogIndex {
    section: String,
    roots: Vec<CatalogNode>,
}

impl CatalogIndex {
    /// Build an index from the published manifest JSON. The section prefix is
    /// synthesized onto every node's `full_relpath` during the build.
    pub fn build(manifest_json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(manifest_json)?;
        Self::from_manifest(&manifest)
    }

    /// Build an index from an already-parsed manifest.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let section = manifest.folder.trim_matches('/').to_string();
        if section.is_empty() {
            return Err(AppError::InvalidFormat("manifest has no folder name".into()));
        }
        let roots = manifest
            .items
            .iter()
            .map(|n| convert_node(n, &section))
            .collect();
        Ok(Self { section, roots })
    }

    /// Section name this index covers.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Root nodes of the indexed tree.
    pub fn roots(&self) -> &[CatalogNode] {
        &self.roots
    }

    /// Find a node by relative path. The input is normalized by stripping
    /// leading/trailing slashes and the section prefix if present; matching
    /// is case-insensitive and treats underscores as spaces, the same
    /// equivalence [`normalize_name`] defines for bare filenames.
    pub fn find_by_relpath(&self, path: &str) -> Option<&CatalogNode> {
        let trimmed = path.trim_matches('/');
        let needle = normalize_name(strip_section_prefix(trimmed, &self.section));
        if needle.is_empty() {
            return None;
        }
        self.roots
            .iter()
            .find_map(|n| find_in_tree(n, &needle))
    }

    /// Collect all file nodes whose extension matches one of `exts`
    /// (case-insensitive). The stored `ext` field wins over the name suffix.
    pub fn files_by_extension(&self, exts: &[&str]) -> Vec<&CatalogNode> {
        let wanted: Vec<String> = exts.iter().map(|e| e.to_lowercase()).collect();
        let mut out = Vec::new();
        for root in &self.roots {
            collect_by_extension(root, &wanted, &mut out);
        }
        out
    }

    /// Resolve a content reference to a concrete path.
    ///
    /// Order: exact relpath match, exact filename match, normalized filename
    /// match (lowercase, underscores as spaces), then a tentative unverified
    /// path built from the section prefix and the raw reference.
    pub fn resolve(&self, item: &ContentItem) -> ResolvedPath {
        let reference = item.reference();

        if let Some(node) = self.find_by_relpath(reference) {
            return ResolvedPath {
                path: node.full_relpath.clone(),
                verified: true,
            };
        }

        let wanted_name = reference.rsplit('/').next().unwrap_or(reference);
        if let Some(node) = self.find_file(&mut |n| n.name == wanted_name) {
            return ResolvedPath {
                path: node.full_relpath.clone(),
                verified: true,
            };
        }

        let normalized = normalize_name(wanted_name);
        if let Some(node) = self.find_file(&mut |n| normalize_name(&n.name) == normalized) {
            return ResolvedPath {
                path: node.full_relpath.clone(),
                verified: true,
            };
        }

        tracing::debug!(reference, section = %self.section, "catalog miss, tentative path");
        ResolvedPath {
            path: format!("{}/{}", self.section, reference.trim_matches('/')),
            verified: false,
        }
    }

    fn find_file(&self, pred: &mut dyn FnMut(&CatalogNode) -> bool) -> Option<&CatalogNode> {
        fn walk<'a>(
            node: &'a CatalogNode,
            pred: &mut dyn FnMut(&CatalogNode) -> bool,
        ) -> Option<&'a CatalogNode> {
            if node.kind == NodeKind::File && pred(node) {
                return Some(node);
            }
            node.children.iter().find_map(|c| walk(c, pred))
        }
        self.roots.iter().find_map(|n| walk(n, pred))
    }
}

fn convert_node(node: &ManifestNode, section: &str) -> CatalogNode {
    let relpath = node.relpath.trim_matches('/').to_string();
    let full_relpath = format!("{}/{}", section, relpath);
    CatalogNode {
        name: node.name.clone(),
        kind: node.kind,
        ext: node.ext.clone().map(|e| e.to_lowercase()),
        children: node
            .items
            .iter()
            .map(|c| convert_node(c, section))
            .collect(),
        relpath,
        full_relpath,
    }
}

fn strip_section_prefix<'a>(path: &'a str, section: &str) -> &'a str {
    if path.len() > section.len()
        && path.as_bytes()[section.len()] == b'/'
        && path.as_bytes()[..section.len()].eq_ignore_ascii_case(section.as_bytes())
    {
        &path[section.len() + 1..]
    } else {
        path
    }
}

fn find_in_tree<'a>(node: &'a CatalogNode, needle: &str) -> Option<&'a CatalogNode> {
    if normalize_name(&node.relpath) == needle {
        return Some(node);
    }
    node.children.iter().find_map(|c| find_in_tree(c, needle))
}

fn collect_by_extension<'a>(
    node: &'a CatalogNode,
    wanted: &[String],
    out: &mut Vec<&'a CatalogNode>,
) {
    if node.kind == NodeKind::File {
        let ext = node
            .ext
            .clone()
            .or_else(|| node.name.rsplit_once('.').map(|(_, e)| e.to_lowercase()));
        if let Some(ext) = ext
            && wanted.iter().any(|w| *w == ext)
        {
            out.push(node);
        }
    }
    for child in &node.children {
        collect_by_extension(child, wanted, out);
    }
}

/// Encode a resolved content path into a stable, reversible identifier.
pub fn encode_content_id(path: &str) -> String {
    URL_SAFE_NO_PAD.encode(path.as_bytes())
}

/// Decode a content identifier back into its content path.
pub fn decode_content_id(id: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(id)
        .map_err(|e| AppError::InvalidFormat(format!("bad content id: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::InvalidFormat(format!("content id is not UTF-8: {e}")))
}

/// Build a manifest by walking a directory tree on disk. This is how section
/// manifests are published for the remote catalog in the first place.
pub fn build_manifest(root: &Path, section: &str) -> Result<Manifest> {
    fn walk(dir: &Path, base: &Path, count: &mut usize) -> Result<Vec<ManifestNode>> {
        let mut nodes = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let relpath = path
                .strip_prefix(base)
                .map_err(|e| AppError::Internal(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");

            if path.is_dir() {
                nodes.push(ManifestNode {
                    name,
                    kind: NodeKind::Dir,
                    relpath,
                    ext: None,
                    items: walk(&path, base, count)?,
                });
            } else {
                *count += 1;
                nodes.push(ManifestNode {
                    ext: path
                        .extension()
                        .map(|e| e.to_string_lossy().to_lowercase()),
                    name,
                    kind: NodeKind::File,
                    relpath,
                    items: Vec::new(),
                });
            }
        }
        Ok(nodes)
    }

    let mut count = 0;
    let items = walk(root, root, &mut count)?;
    Ok(Manifest {
        generated_at: chrono::Utc::now().to_rfc3339(),
        folder: section.trim_matches('/').to_string(),
        count,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> CatalogIndex {
        let json = r#"{
            "generated_at": "2025-06-01T00:00:00Z",
            "folder": "comics",
            "count": 3,
            "items": [
                {
                    "name": "My Series",
                    "type": "dir",
                    "relpath": "My Series",
                    "items": [
                        { "name": "Issue 1.cbz", "type": "file", "relpath": "My Series/Issue 1.cbz", "ext": "cbz" },
                        { "name": "Issue 2.cbz", "type": "file", "relpath": "My Series/Issue 2.cbz", "ext": "cbz" }
                    ]
                },
                { "name": "Oneshot.epub", "type": "file", "relpath": "Oneshot.epub", "ext": "epub" }
            ]
        }"#;
        CatalogIndex::build(json).unwrap()
    }

    #[test]
    fn find_is_case_insensitive_and_prefix_tolerant() {
        let index = sample_index();
        let a = index.find_by_relpath("Comics/My Series/Issue 1.cbz").unwrap();
        let b = index.find_by_relpath("my series/issue 1.cbz").unwrap();
        assert_eq!(a.full_relpath, "comics/My Series/Issue 1.cbz");
        assert_eq!(a.full_relpath, b.full_relpath);
    }

    #[test]
    fn find_honors_underscore_space_equivalence_on_full_paths() {
        let index = sample_index();
        let a = index
            .find_by_relpath("Comics/My_Series/Issue 1.cbz")
            .unwrap();
        let b = index
            .find_by_relpath("comics/My Series/issue_1.cbz")
            .unwrap();
        assert_eq!(a.full_relpath, "comics/My Series/Issue 1.cbz");
        assert_eq!(a.full_relpath, b.full_relpath);
    }

    #[test]
    fn resolve_underscore_space_equivalence() {
        let index = sample_index();
        let item = ContentItem::Legacy {
            raw: "issue_1.cbz".into(),
            title: None,
            author: None,
        };
        let resolved = index.resolve(&item);
        assert!(resolved.verified);
        assert_eq!(resolved.path, "comics/My Series/Issue 1.cbz");
    }

    #[test]
    fn resolve_miss_yields_tentative_path() {
        let index = sample_index();
        let item = ContentItem::Legacy {
            raw: "Unknown Book.cbz".into(),
            title: None,
            author: None,
        };
        let resolved = index.resolve(&item);
        assert!(!resolved.verified);
        assert_eq!(resolved.path, "comics/Unknown Book.cbz");
    }

    #[test]
    fn files_by_extension_filters_recursively() {
        let index = sample_index();
        let cbz = index.files_by_extension(&["CBZ"]);
        assert_eq!(cbz.len(), 2);
        let epub = index.files_by_extension(&["epub"]);
        assert_eq!(epub.len(), 1);
        assert_eq!(epub[0].full_relpath, "comics/Oneshot.epub");
    }

    #[test]
    fn content_id_round_trips() {
        let id = encode_content_id("comics/My Series/Issue 1.cbz");
        assert_eq!(
            decode_content_id(&id).unwrap(),
            "comics/My Series/Issue 1.cbz"
        );
        assert!(decode_content_id("!!!not base64!!!").is_err());
    }
}
