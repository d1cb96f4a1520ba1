use thiserror::Error;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum AppError {
    /// Buffer carried neither a ZIP nor a usable archive signature, or a
    /// RAR-flagged buffer that also failed to parse as ZIP.
    #[error("Unsupported archive: {0}")]
    UnsupportedArchive(String),

    /// Signature matched but the archive structure could not be read.
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// EPUB is missing META-INF/container.xml or its rootfile entry.
    #[error("Missing container: {0}")]
    MissingContainer(String),

    /// EPUB spine resolved to zero readable chapters.
    #[error("Empty book: {0}")]
    EmptyBook(String),

    /// Comic archive contained no extractable page images.
    #[error("No pages found: {0}")]
    NoPagesFound(String),

    /// Requested archive member is absent.
    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    /// Explicit seek target outside the unit range.
    #[error("Position {index} out of range (total units: {total})")]
    OutOfRange {
        /// Requested unit index.
        index: usize,
        /// Number of units in the open document.
        total: usize,
    },

    /// Downloader refused the request; not reinterpreted by the engine.
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Progress database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, AppError>;
