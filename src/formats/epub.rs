//! EPUB parsing: container.xml, OPF manifest/spine, chapter sanitizing and
//! embedded-resource rewriting.
//!
//! Only the subset of OPF needed for a linear reading sequence is handled.
//! The archive is the single source of truth for resources: chapter images
//! are embedded as data URIs or hidden, never left as network references.

use crate::archive::ArchiveReader;
use crate::error::{AppError, Result};
use crate::formats::{Chapter, Document};
use crate::metadata::FilenameMeta;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};
use roxmltree::Document as XmlDoc;
use std::collections::HashMap;
use std::sync::LazyLock;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const CHAPTER_EXTENSIONS: [&str; 2] = ["xhtml", "html"];
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "svg", "webp"];

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<script\b[^>]*/>").unwrap());
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap());
static EVENT_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap());
static JS_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(href|src)\s*=\s*(["'])\s*javascript:[^"']*(["'])"#).unwrap()
});
static STYLE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bstyle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static COLOR_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|;)\s*color\s*:[^;]*").unwrap());
static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static SRC_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Parse an opened EPUB archive into a [`Document`].
///
/// The filename-derived `hint` takes precedence for title/author when present
/// and non-empty; OPF `<metadata>` is the fallback.
pub fn parse(reader: &mut ArchiveReader, hint: Option<&FilenameMeta>) -> Result<Document> {
    let opf_path = find_opf_path(reader)?;
    let opf_dir = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    let opf_content = reader.read_text(&opf_path).map_err(|e| match e {
        AppError::EntryNotFound(p) => AppError::MissingContainer(format!("OPF not found: {p}")),
        other => other,
    })?;
    let opf = XmlDoc::parse(&opf_content)?;

    let (opf_title, opf_creator) = parse_metadata(&opf);
    let manifest = manifest_map(&opf);
    let spine = spine_idrefs(&opf);

    let images = build_image_index(reader)?;

    let mut chapters = Vec::new();
    for idref in &spine {
        let Some(href) = manifest.get(idref.as_str()).map(String::as_str) else {
            tracing::warn!(idref = %idref, "spine idref missing from manifest, skipping");
            continue;
        };
        let href = href.split(['#', '?']).next().unwrap_or(href);
        if !has_chapter_extension(href) {
            continue;
        }

        let path = resolve_relative(opf_dir, href);
        let html = match reader.read_text(&path).or_else(|_| reader.read_text(href)) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(href, error = %e, "skipping unreadable chapter");
                continue;
            }
        };

        chapters.push(Chapter {
            index: chapters.len(),
            title: chapter_title(href),
            html: sanitize_html(&html, &images),
        });
    }

    if chapters.is_empty() {
        return Err(AppError::EmptyBook(
            "spine resolved to zero readable chapters".into(),
        ));
    }

    let title = hint
        .map(|h| h.title.trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or(opf_title)
        .unwrap_or_else(|| "Unknown".to_string());
    let author = hint.and_then(|h| h.author.clone()).or(opf_creator);

    Ok(Document {
        title,
        author,
        chapters,
    })
}

/// Find the OPF path from container.xml's first rootfile element.
fn find_opf_path(reader: &mut ArchiveReader) -> Result<String> {
    let content = reader.read_text(CONTAINER_PATH).map_err(|e| match e {
        AppError::EntryNotFound(_) => {
            AppError::MissingContainer("META-INF/container.xml is absent".into())
        }
        other => other,
    })?;

    let doc = XmlDoc::parse(&content)?;
    doc.descendants()
        .find(|n| n.has_tag_name("rootfile"))
        .and_then(|n| n.attribute("full-path"))
        .map(String::from)
        .ok_or_else(|| AppError::MissingContainer("no rootfile in container.xml".into()))
}

/// Extract title and first creator from OPF `<metadata>`.
fn parse_metadata(opf: &XmlDoc) -> (Option<String>, Option<String>) {
    let mut title = None;
    let mut creator = None;

    for node in opf.descendants() {
        match node.tag_name().name() {
            "title" if title.is_none() => {
                title = node.text().map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
            }
            "creator" if creator.is_none() => {
                creator = node.text().map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
            }
            _ => {}
        }
    }
    (title, creator)
}

/// Build the id -> href map from `<manifest><item>` elements.
fn manifest_map(opf: &XmlDoc) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for node in opf.descendants() {
        if node.tag_name().name() == "item"
            && let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href"))
        {
            map.insert(id.to_string(), href.to_string());
        }
    }
    map
}

/// Walk `<spine><itemref>` elements in document order.
fn spine_idrefs(opf: &XmlDoc) -> Vec<String> {
    opf.descendants()
        .filter(|n| n.tag_name().name() == "itemref")
        .filter_map(|n| n.attribute("idref"))
        .map(String::from)
        .collect()
}

/// Index every image in the archive as a data URI under three keys: its full
/// in-archive path, its basename, and its path with the leading directory
/// segment stripped. Chapter HTML references images inconsistently (relative,
/// bare filename, or `Images/`-prefixed), so all three spellings must hit.
fn build_image_index(reader: &mut ArchiveReader) -> Result<HashMap<String, String>> {
    let mut index = HashMap::new();

    for name in reader.file_names() {
        if name.ends_with('/') {
            continue;
        }
        let Some(ext) = name.rsplit_once('.').map(|(_, e)| e.to_lowercase()) else {
            continue;
        };
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }

        let bytes = match reader.read(&name) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "skipping unreadable image");
                continue;
            }
        };
        let data_uri = format!("data:{};base64,{}", mime_for(&ext), STANDARD.encode(&bytes));

        if let Some((_, rest)) = name.split_once('/')
            && rest.contains('/')
        {
            index.insert(rest.to_string(), data_uri.clone());
        }
        if let Some((_, basename)) = name.rsplit_once('/') {
            index.insert(basename.to_string(), data_uri.clone());
        }
        index.insert(name, data_uri);
    }
    Ok(index)
}

fn mime_for(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Sanitize chapter markup and embed image resources.
fn sanitize_html(html: &str, images: &HashMap<String, String>) -> String {
    let html = SCRIPT_BLOCK.replace_all(html, "");
    let html = STYLE_BLOCK.replace_all(&html, "");
    let html = JS_URI.replace_all(&html, "${1}=${2}#${3}");
    let html = EVENT_ATTR.replace_all(&html, "");
    let html = STYLE_ATTR.replace_all(&html, |caps: &Captures| {
        let value = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let cleaned = COLOR_DECL.replace_all(value, "");
        format!("style=\"{}\"", cleaned.trim_matches(';').trim())
    });

    IMG_TAG
        .replace_all(&html, |caps: &Captures| rewrite_img(&caps[0], images))
        .into_owned()
}

/// Rewrite one `<img>` tag: resolve its src against the embedded image index
/// (raw, basename, `../Images/`, `Images/`); hide the image on a total miss.
fn rewrite_img(tag: &str, images: &HashMap<String, String>) -> String {
    let src = SRC_ATTR
        .captures(tag)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string());

    let Some(src) = src else {
        return tag.to_string();
    };

    if let Some(data_uri) = lookup_image(&src, images) {
        return SRC_ATTR
            .replace(tag, regex::NoExpand(&format!("src=\"{data_uri}\"")))
            .into_owned();
    }

    tracing::warn!(src = %src, "image not found in archive, hiding");
    "<img style=\"display:none\"/>".to_string()
}

fn lookup_image<'a>(src: &str, images: &'a HashMap<String, String>) -> Option<&'a String> {
    let raw = src.trim_start_matches("./");
    let stripped = {
        let mut s = raw;
        while let Some(rest) = s.strip_prefix("../") {
            s = rest;
        }
        s
    };
    let basename = stripped.rsplit('/').next().unwrap_or(stripped);

    images
        .get(raw)
        .or_else(|| images.get(stripped))
        .or_else(|| images.get(basename))
        .or_else(|| images.get(&format!("../Images/{basename}")))
        .or_else(|| images.get(&format!("Images/{basename}")))
}

fn has_chapter_extension(href: &str) -> bool {
    href.rsplit_once('.')
        .map(|(_, e)| CHAPTER_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn chapter_title(href: &str) -> String {
    let basename = href.rsplit('/').next().unwrap_or(href);
    basename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(basename)
        .replace('_', " ")
}

/// Join an href to the OPF directory, collapsing `.` and `..` segments.
fn resolve_relative(base_dir: &str, href: &str) -> String {
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
