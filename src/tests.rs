use crate::archive::ArchiveReader;
use crate::catalog::{CatalogIndex, ContentItem, encode_content_id};
use crate::config::Config;
use crate::downloader::FsDownloader;
use crate::engine::ReaderEngine;
use crate::error::AppError;
use crate::formats::{cbz, epub};
use crate::metadata::FilenameMeta;
use crate::progress::{
    ContentDescriptor, ProgressBackend, ProgressRecord, ProgressStore, ReadingPosition,
    SqliteBackend,
};
use crate::session::SessionContent;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zip::write::SimpleFileOptions;

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn build_cbz(names: &[&str]) -> Vec<u8> {
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, b"img".as_slice())).collect();
    zip_bytes(&entries)
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn opf_for(chapters: &[&str]) -> String {
    let mut items = String::new();
    let mut refs = String::new();
    for (i, href) in chapters.iter().enumerate() {
        items.push_str(&format!(
            r#"<item id="ch{i}" href="{href}" media-type="application/xhtml+xml"/>"#
        ));
        refs.push_str(&format!(r#"<itemref idref="ch{i}"/>"#));
    }
    format!(
        r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Opf Title</dc:title>
    <dc:creator>Opf Author</dc:creator>
  </metadata>
  <manifest>{items}</manifest>
  <spine>{refs}</spine>
</package>"#
    )
}

/// Two-chapter EPUB; `present` controls which chapter files actually exist.
fn build_epub(present: &[&str]) -> Vec<u8> {
    let opf = opf_for(&["ch1.xhtml", "ch2.xhtml"]);
    let mut entries: Vec<(&str, &[u8])> = vec![
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/Images/pic.png", b"\x89PNGfake"),
    ];
    let ch1 = br#"<html><body><p>one</p><img src="Images/pic.png"/><img src="gone.png"/></body></html>"#;
    let ch2 = br#"<html><body><p>two</p></body></html>"#;
    if present.contains(&"ch1.xhtml") {
        entries.push(("OEBPS/ch1.xhtml", ch1));
    }
    if present.contains(&"ch2.xhtml") {
        entries.push(("OEBPS/ch2.xhtml", ch2));
    }
    zip_bytes(&entries)
}

#[test]
fn cbz_pages_in_natural_order() {
    let bytes = build_cbz(&["10.jpg", "01.jpg", "02.jpg", "notes.txt"]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    let pages = cbz::extract(&mut reader).unwrap();

    let names: Vec<&str> = pages.iter().map(|p| p.source_name.as_str()).collect();
    assert_eq!(names, vec!["01.jpg", "02.jpg", "10.jpg"]);
    assert_eq!(pages[2].index, 2);
}

#[test]
fn cbz_orders_suffixed_pages_after_equal_numeric_runs() {
    let bytes = build_cbz(&["p01b.jpg", "p01a.jpg"]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    let pages = cbz::extract(&mut reader).unwrap();

    let names: Vec<&str> = pages.iter().map(|p| p.source_name.as_str()).collect();
    assert_eq!(names, vec!["p01a.jpg", "p01b.jpg"]);
}

#[test]
fn cbz_extraction_is_idempotent() {
    let bytes = build_cbz(&["b2.png", "b10.png", "a.png"]);
    let mut first = ArchiveReader::open(bytes.clone()).unwrap();
    let mut second = ArchiveReader::open(bytes).unwrap();

    let one: Vec<String> = cbz::extract(&mut first)
        .unwrap()
        .into_iter()
        .map(|p| p.source_name)
        .collect();
    let two: Vec<String> = cbz::extract(&mut second)
        .unwrap()
        .into_iter()
        .map(|p| p.source_name)
        .collect();
    assert_eq!(one, two);
    assert_eq!(one, vec!["a.png", "b2.png", "b10.png"]);
}

#[test]
fn cbz_without_images_fails() {
    let bytes = zip_bytes(&[("readme.txt", b"hello")]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    assert!(matches!(
        cbz::extract(&mut reader),
        Err(AppError::NoPagesFound(_))
    ));
}

#[test]
fn epub_full_spine_parses() {
    let bytes = build_epub(&["ch1.xhtml", "ch2.xhtml"]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    let doc = epub::parse(&mut reader, None).unwrap();

    assert_eq!(doc.title, "Opf Title");
    assert_eq!(doc.author.as_deref(), Some("Opf Author"));
    assert_eq!(doc.chapters.len(), 2);
    assert_eq!(doc.chapters[0].index, 0);
    assert_eq!(doc.chapters[0].title, "ch1");
}

#[test]
fn epub_missing_chapter_is_skipped_not_fatal() {
    let bytes = build_epub(&["ch2.xhtml"]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    let doc = epub::parse(&mut reader, None).unwrap();

    assert_eq!(doc.chapters.len(), 1);
    assert!(doc.chapters[0].html.contains("two"));
}

#[test]
fn epub_with_no_readable_chapters_is_empty_book() {
    let bytes = build_epub(&[]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    assert!(matches!(
        epub::parse(&mut reader, None),
        Err(AppError::EmptyBook(_))
    ));
}

#[test]
fn epub_without_container_fails() {
    let bytes = zip_bytes(&[("mimetype", b"application/epub+zip")]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    assert!(matches!(
        epub::parse(&mut reader, None),
        Err(AppError::MissingContainer(_))
    ));
}

#[test]
fn epub_embeds_known_images_and_hides_missing() {
    let bytes = build_epub(&["ch1.xhtml", "ch2.xhtml"]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    let doc = epub::parse(&mut reader, None).unwrap();

    let html = &doc.chapters[0].html;
    assert!(html.contains("data:image/png;base64,"));
    assert!(html.contains("display:none"));
    assert!(!html.contains("gone.png"));
}

#[test]
fn epub_filename_hint_wins_over_opf_metadata() {
    let bytes = build_epub(&["ch1.xhtml", "ch2.xhtml"]);
    let mut reader = ArchiveReader::open(bytes).unwrap();
    let hint = FilenameMeta {
        title: "Shelf Title".to_string(),
        author: Some("Shelf Author".to_string()),
    };
    let doc = epub::parse(&mut reader, Some(&hint)).unwrap();

    assert_eq!(doc.title, "Shelf Title");
    assert_eq!(doc.author.as_deref(), Some("Shelf Author"));
}

struct CountingBackend {
    inner: SqliteBackend,
    writes: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        Self {
            inner: SqliteBackend::open_memory().unwrap(),
            writes: AtomicUsize::new(0),
        }
    }
}

impl ProgressBackend for CountingBackend {
    fn upsert(
        &self,
        user_key: &str,
        content_id: &str,
        record: &ProgressRecord,
    ) -> crate::error::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(user_key, content_id, record)
    }

    fn list_for_user(&self, user_key: &str) -> crate::error::Result<Vec<(String, ProgressRecord)>> {
        self.inner.list_for_user(user_key)
    }
}

fn descriptor(path: &str, title: &str) -> ContentDescriptor {
    ContentDescriptor {
        content_id: encode_content_id(path),
        path: path.to_string(),
        title: title.to_string(),
        author: None,
    }
}

fn position(desc: &ContentDescriptor, unit: usize, total: usize, ts: i64) -> ReadingPosition {
    ReadingPosition {
        content_id: desc.content_id.clone(),
        unit_index: unit,
        total_units: total,
        timestamp_ms: ts,
    }
}

#[test]
fn debounce_coalesces_to_last_write() {
    let backend = Arc::new(CountingBackend::new());
    // Window far longer than the test; only flush_now performs the write.
    let store = ProgressStore::new(backend.clone(), "local", Duration::from_secs(60));
    let desc = descriptor("books/a.epub", "A");

    for i in 0..5 {
        store.record_position(&desc, &position(&desc, i, 10, 1000 + i as i64));
    }
    assert!(store.has_pending());
    store.flush_now();

    assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    let history = store.get_history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].unit_index, 4);
    assert!(!store.has_pending());
}

#[test]
fn flush_without_pending_writes_nothing() {
    let backend = Arc::new(CountingBackend::new());
    let store = ProgressStore::new(backend.clone(), "local", Duration::from_secs(60));
    store.flush_now();
    assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn cancel_discards_pending_write() {
    let backend = Arc::new(CountingBackend::new());
    let store = ProgressStore::new(backend.clone(), "local", Duration::from_secs(60));
    let desc = descriptor("books/a.epub", "A");

    store.record_position(&desc, &position(&desc, 3, 10, 1000));
    store.cancel();
    store.flush_now();
    assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn debounce_timer_writes_after_window() {
    let backend = Arc::new(CountingBackend::new());
    let store = ProgressStore::new(backend.clone(), "local", Duration::from_millis(30));
    let desc = descriptor("books/a.epub", "A");

    store.record_position(&desc, &position(&desc, 2, 10, 1000));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    // The window settled; a later flush has nothing left to write.
    store.flush_now();
    assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rapid_records_restart_the_window() {
    let backend = Arc::new(CountingBackend::new());
    let store = ProgressStore::new(backend.clone(), "local", Duration::from_millis(50));
    let desc = descriptor("books/a.epub", "A");

    for i in 0..4 {
        store.record_position(&desc, &position(&desc, i, 10, 1000 + i as i64));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    // Every earlier timer saw a stale generation; exactly one write landed.
    assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    let history = store.get_history(10).unwrap();
    assert_eq!(history[0].unit_index, 3);
}

#[test]
fn history_is_capped_deduplicated_and_recency_ordered() {
    let backend = SqliteBackend::open_memory().unwrap();
    for i in 0..12 {
        let path = format!("books/{i}.epub");
        let record = ProgressRecord {
            content_path: path.clone(),
            title: format!("Book {i}"),
            author: None,
            unit_index: 1,
            total_units: 4,
            progress_percent: 25,
            last_access_ms: 1000 + i,
        };
        backend
            .upsert("local", &encode_content_id(&path), &record)
            .unwrap();
    }
    // One item read again later: must not duplicate, must move to the front.
    let repeat = ProgressRecord {
        content_path: "books/3.epub".into(),
        title: "Book 3".into(),
        author: None,
        unit_index: 3,
        total_units: 4,
        progress_percent: 75,
        last_access_ms: 9999,
    };
    backend
        .upsert("local", &encode_content_id("books/3.epub"), &repeat)
        .unwrap();

    let store = ProgressStore::new(Arc::new(backend), "local", Duration::from_secs(60));
    let history = store.get_history(10).unwrap();

    assert_eq!(history.len(), 10);
    assert_eq!(history[0].title, "Book 3");
    assert_eq!(history[0].unit_index, 3);
    let mut ids: Vec<&str> = history.iter().map(|e| e.content_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

const COMIC_MANIFEST: &str = r#"{
    "generated_at": "2025-06-01T00:00:00Z",
    "folder": "comics",
    "count": 1,
    "items": [
        {
            "name": "My Series",
            "type": "dir",
            "relpath": "My Series",
            "items": [
                { "name": "Issue 1.cbz", "type": "file", "relpath": "My Series/Issue 1.cbz", "ext": "cbz" }
            ]
        }
    ]
}"#;

fn engine_fixture() -> (tempfile::TempDir, ReaderEngine) {
    let dir = tempfile::tempdir().unwrap();
    let comic_dir = dir.path().join("comics").join("My Series");
    std::fs::create_dir_all(&comic_dir).unwrap();
    std::fs::write(
        comic_dir.join("Issue 1.cbz"),
        build_cbz(&["01.jpg", "02.jpg", "10.jpg"]),
    )
    .unwrap();

    let store = ProgressStore::new(
        Arc::new(SqliteBackend::open_memory().unwrap()),
        "local",
        Duration::from_secs(60),
    );
    let engine = ReaderEngine::new(Arc::new(FsDownloader::new(dir.path())), store);
    engine.load_catalog(COMIC_MANIFEST).unwrap();
    (dir, engine)
}

#[test]
fn engine_opens_legacy_reference_with_natural_page_order() {
    let (_dir, engine) = engine_fixture();
    let item = ContentItem::Legacy {
        raw: "issue_1.cbz".into(),
        title: None,
        author: None,
    };

    let session = engine.open("comics", &item).unwrap();
    assert_eq!(session.total_units(), 3);
    match session.content() {
        SessionContent::Comic(pages) => {
            let names: Vec<&str> = pages.iter().map(|p| p.source_name.as_str()).collect();
            assert_eq!(names, vec!["01.jpg", "02.jpg", "10.jpg"]);
        }
        other => panic!("expected comic content, got {other:?}"),
    }
}

#[test]
fn engine_resumes_at_last_flushed_position() {
    let (_dir, engine) = engine_fixture();
    let item = ContentItem::Catalog {
        relpath: "My Series/Issue 1.cbz".into(),
    };

    let mut session = engine.open("comics", &item).unwrap();
    assert_eq!(session.current_index(), 0);
    session.next();
    session.next();
    session.close();

    let resumed = engine.open("comics", &item).unwrap();
    assert_eq!(resumed.current_index(), 2);
}

#[test]
fn engine_resolves_tentatively_without_catalog() {
    let store = ProgressStore::new(
        Arc::new(SqliteBackend::open_memory().unwrap()),
        "local",
        Duration::from_secs(60),
    );
    let engine = ReaderEngine::new(Arc::new(FsDownloader::new("/nonexistent")), store);

    let item = ContentItem::Legacy {
        raw: "Some_Comic.cbz".into(),
        title: None,
        author: None,
    };
    let resolved = engine.resolve("comics", &item);
    assert!(!resolved.verified);
    assert_eq!(resolved.path, "comics/Some_Comic.cbz");

    assert!(matches!(
        engine.open("comics", &item),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn manifest_built_from_directory_round_trips_into_index() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("Series A");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("Issue 1.cbz"), b"x").unwrap();
    std::fs::write(dir.path().join("Standalone.epub"), b"x").unwrap();
    std::fs::write(dir.path().join(".hidden"), b"x").unwrap();

    let manifest = crate::catalog::build_manifest(dir.path(), "comics").unwrap();
    assert_eq!(manifest.count, 2);
    assert_eq!(manifest.folder, "comics");

    let index = CatalogIndex::from_manifest(&manifest).unwrap();
    let node = index.find_by_relpath("series a/issue 1.cbz").unwrap();
    assert_eq!(node.full_relpath, "comics/Series A/Issue 1.cbz");
    assert_eq!(index.files_by_extension(&["epub"]).len(), 1);
}

#[test]
fn config_parse_toml() {
    let toml = r#"
[storage]
library_root = "/srv/library"

[progress]
debounce_ms = 500
history_limit = 5
user_key = "alice"

[catalog]
sections = ["books"]
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.storage.library_root.to_str(), Some("/srv/library"));
    assert_eq!(config.progress.debounce_ms, 500);
    assert_eq!(config.progress.history_limit, 5);
    assert_eq!(config.progress.user_key, "alice");
    assert_eq!(config.catalog.sections, vec!["books"]);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.progress.debounce_ms, 2000);
    assert_eq!(config.progress.history_limit, 10);
    assert_eq!(config.catalog.sections.len(), 3);
}
