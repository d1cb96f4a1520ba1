//! Container sniffing and ZIP-family archive access.
//!
//! Downloaded blobs are classified by signature, never by file extension:
//! a large share of `.cbr` files in the wild are mislabeled ZIPs. True RAR
//! decompression is not implemented; RAR-flagged buffers get one attempt at
//! ZIP parsing and fail as unsupported otherwise.

use crate::error::{AppError, Result};
use std::io::{Cursor, Read};
use zip::ZipArchive;
use zip::result::ZipError;

/// RAR 4.x signature (`Rar!\x1A\x07\x00`).
const RAR_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

/// ZIP local-header / empty-archive signature prefix (`PK`).
const ZIP_SIGNATURE: [u8; 2] = [0x50, 0x4B];

/// Container family detected from leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// ZIP-family container (ZIP, EPUB, CBZ).
    ZipFamily,
    /// RAR-family container (CBR).
    RarFamily,
    /// Neither signature matched.
    Unknown,
}

/// Classify a byte buffer by its leading signature. Reads at most 7 bytes.
pub fn classify(bytes: &[u8]) -> ContainerKind {
    if bytes.len() >= 7 && bytes[..7] == RAR_SIGNATURE {
        return ContainerKind::RarFamily;
    }
    if bytes.len() >= 2 && bytes[..2] == ZIP_SIGNATURE {
        return ContainerKind::ZipFamily;
    }
    ContainerKind::Unknown
}

/// A named member of an opened archive. Bytes are read on demand through
/// [`ArchiveReader::read`]; entries do not outlive their reader.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Stored entry name, case-sensitive.
    pub name: String,
    /// Whether the entry is a directory marker.
    pub is_dir: bool,
}

/// Random-access reader over a ZIP-family byte buffer.
#[derive(Debug)]
pub struct ArchiveReader {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl ArchiveReader {
    /// Open an archive from downloaded bytes, applying the sniff policy:
    /// ZIP signatures must parse or the archive is corrupt; RAR signatures
    /// get a ZIP parse attempt (mislabeled `.cbr`) and are otherwise
    /// unsupported; anything else is unsupported outright.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        match classify(&bytes) {
            ContainerKind::ZipFamily => {
                let archive = ZipArchive::new(Cursor::new(bytes))
                    .map_err(|e| AppError::CorruptArchive(e.to_string()))?;
                Ok(Self { archive })
            }
            ContainerKind::RarFamily => {
                tracing::debug!("RAR signature detected, attempting ZIP fallback");
                let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|_| {
                    AppError::UnsupportedArchive(
                        "RAR archive (no RAR decoder and not a mislabeled ZIP)".into(),
                    )
                })?;
                Ok(Self { archive })
            }
            ContainerKind::Unknown => Err(AppError::UnsupportedArchive(
                "no ZIP or RAR signature in leading bytes".into(),
            )),
        }
    }

    /// Number of members in the archive.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Whether the archive has no members.
    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// List all members (name and directory flag) in stored order.
    pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let file = self.archive.by_index(i)?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
            });
        }
        Ok(entries)
    }

    /// Stored names of all members.
    pub fn file_names(&self) -> Vec<String> {
        self.archive.file_names().map(String::from).collect()
    }

    /// Whether the archive contains a member with this exact name.
    pub fn contains(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    /// Read and decompress a member by its exact stored name.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => AppError::EntryNotFound(name.to_string()),
            other => AppError::Zip(other),
        })?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Read a member and decode it as UTF-8 text (lossy).
    pub fn read_text(&mut self, name: &str) -> Result<String> {
        let data = self.read(name)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
