//! Comic page extraction from ZIP-family archives.

use crate::archive::ArchiveReader;
use crate::error::{AppError, Result};
use crate::formats::Page;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Extract the ordered page list from an opened comic archive.
///
/// Entries are filtered to image files, naturally sorted (numeric runs
/// compare by value, so `page2` precedes `page10`), and read in order.
/// Individually unreadable pages are skipped with a warning; an archive with
/// zero usable pages fails with [`AppError::NoPagesFound`].
pub fn extract(reader: &mut ArchiveReader) -> Result<Vec<Page>> {
    let mut names: Vec<String> = reader
        .file_names()
        .into_iter()
        .filter(|name| is_image_file(name))
        .filter(|name| !name.contains("__MACOSX"))
        .collect();

    names.sort_by(|a, b| natural_compare(a, b));

    let mut pages = Vec::with_capacity(names.len());
    for name in names {
        match reader.read(&name) {
            Ok(bytes) => pages.push(Page {
                index: pages.len(),
                source_name: name,
                bytes,
            }),
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "skipping unreadable page");
            }
        }
    }

    if pages.is_empty() {
        return Err(AppError::NoPagesFound(
            "archive is a valid container but holds no readable images".into(),
        ));
    }
    Ok(pages)
}

/// Check if a filename has an image extension. Directory markers end with a
/// slash and never match.
fn is_image_file(name: &str) -> bool {
    if name.ends_with('/') {
        return false;
    }
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Natural string comparison: numeric runs compare by value, everything else
/// case-insensitively character by character.
pub fn natural_compare(a: &str, b: &str) -> std::cmp::Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek(), b_chars.peek()) {
            (None, None) => return std::cmp::Ordering::Equal,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (Some(&ac), Some(&bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    // Collected by peeking so the character after the run is
                    // left in place for the next comparison step.
                    let a_val = take_numeric_run(&mut a_chars);
                    let b_val = take_numeric_run(&mut b_chars);

                    match a_val.cmp(&b_val) {
                        std::cmp::Ordering::Equal => continue,
                        other => return other,
                    }
                } else {
                    a_chars.next();
                    b_chars.next();

                    match ac.to_lowercase().cmp(bc.to_lowercase()) {
                        std::cmp::Ordering::Equal => continue,
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_numeric_run(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> u64 {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits.parse().unwrap_or(0)
}
