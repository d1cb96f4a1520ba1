//! Reading-session state machine.
//!
//! A session owns the parsed content and the current position; nothing is
//! shared between sessions and nothing lives at module scope. Directed
//! navigation (`next`/`previous`) is a forgiving no-op at the boundaries,
//! while explicit `seek` targets are validated strictly.

use crate::error::{AppError, Result};
use crate::formats::{Document, Page};
use crate::progress::{ContentDescriptor, ProgressStore, ReadingPosition, now_timestamp_ms};

/// The parsed content a session navigates over.
#[derive(Debug)]
pub enum SessionContent {
    /// A book with ordered chapters.
    Book(Document),
    /// A comic with ordered pages.
    Comic(Vec<Page>),
    /// Content has been released by `close()`.
    Released,
}

impl SessionContent {
    /// Number of navigable units.
    pub fn total_units(&self) -> usize {
        match self {
            SessionContent::Book(doc) => doc.chapters.len(),
            SessionContent::Comic(pages) => pages.len(),
            SessionContent::Released => 0,
        }
    }
}

/// Navigation state machine over a chapter or page list.
///
/// Constructed directly into the ready state at a clamped starting position.
/// Every successful transition is forwarded to the owned [`ProgressStore`];
/// `close()` releases the content and forces a synchronous flush.
pub struct ReadingSession {
    descriptor: ContentDescriptor,
    content: SessionContent,
    total_units: usize,
    unit_index: usize,
    closed: bool,
    progress: Option<ProgressStore>,
}

impl ReadingSession {
    /// Open a session. `start` is clamped into `[0, total_units - 1]`; an
    /// absent or out-of-range start falls back to the first unit.
    pub fn new(
        descriptor: ContentDescriptor,
        content: SessionContent,
        start: Option<usize>,
        progress: Option<ProgressStore>,
    ) -> Result<Self> {
        let total_units = content.total_units();
        if total_units == 0 {
            return Err(AppError::Internal(
                "session opened over empty content".into(),
            ));
        }
        let unit_index = start.unwrap_or(0).min(total_units - 1);

        Ok(Self {
            descriptor,
            content,
            total_units,
            unit_index,
            closed: false,
            progress,
        })
    }

    /// Identity and display metadata of the open content.
    pub fn descriptor(&self) -> &ContentDescriptor {
        &self.descriptor
    }

    /// The owned content. Released (empty) after close.
    pub fn content(&self) -> &SessionContent {
        &self.content
    }

    /// Current unit index.
    pub fn current_index(&self) -> usize {
        self.unit_index
    }

    /// Number of navigable units.
    pub fn total_units(&self) -> usize {
        self.total_units
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current position snapshot.
    pub fn position(&self) -> ReadingPosition {
        ReadingPosition {
            content_id: self.descriptor.content_id.clone(),
            unit_index: self.unit_index,
            total_units: self.total_units,
            timestamp_ms: now_timestamp_ms(),
        }
    }

    /// Advance one unit. A no-op at the last unit and after close; returns
    /// the new index when the position moved.
    pub fn next(&mut self) -> Option<usize> {
        if self.closed || self.unit_index + 1 >= self.total_units {
            return None;
        }
        self.unit_index += 1;
        self.record();
        Some(self.unit_index)
    }

    /// Step back one unit. A no-op at the first unit and after close.
    pub fn previous(&mut self) -> Option<usize> {
        if self.closed || self.unit_index == 0 {
            return None;
        }
        self.unit_index -= 1;
        self.record();
        Some(self.unit_index)
    }

    /// Jump to an explicit unit. Unlike the directed controls this validates
    /// strictly and fails with [`AppError::OutOfRange`] on a bad target.
    pub fn seek(&mut self, index: usize) -> Result<usize> {
        if self.closed {
            return Err(AppError::Internal("session is closed".into()));
        }
        if index >= self.total_units {
            return Err(AppError::OutOfRange {
                index,
                total: self.total_units,
            });
        }
        self.unit_index = index;
        self.record();
        Ok(self.unit_index)
    }

    /// Close the session: release the owned content and force a synchronous
    /// flush of any pending progress write. Idempotent; no transitions are
    /// accepted afterward.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.content = SessionContent::Released;
        if let Some(progress) = &self.progress {
            progress.flush_now();
        }
        tracing::debug!(content_id = %self.descriptor.content_id, "session closed");
    }

    fn record(&self) {
        if let Some(progress) = &self.progress {
            progress.record_position(&self.descriptor, &self.position());
        }
    }
}

impl Drop for ReadingSession {
    fn drop(&mut self) {
        // Teardown guarantee: a dropped session still flushes.
        self.close();
    }
}
