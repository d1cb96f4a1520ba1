//! Debounced reading-progress persistence and the bounded recent-history list.
//!
//! Writes are coalesced last-write-wins inside a fixed debounce window so a
//! burst of page turns produces a single persisted record, while `flush_now`
//! guarantees zero loss on graceful close. A failed write is logged and never
//! surfaced to navigation.

mod backend;

pub use backend::{ProgressBackend, SqliteBackend};

use crate::error::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default debounce window for position writes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Default history cap. A query limit, not a deletion: older records stay in
/// the backing store.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// A point-in-time reading position inside one content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingPosition {
    /// Stable identifier derived from the resolved content path.
    pub content_id: String,
    /// 0-based current unit (chapter or page).
    pub unit_index: usize,
    /// Number of units in the open document.
    pub total_units: usize,
    /// Wall-clock milliseconds of the transition.
    pub timestamp_ms: i64,
}

/// Identity and display metadata of an open content item, fixed for the
/// lifetime of its session.
#[derive(Debug, Clone)]
pub struct ContentDescriptor {
    /// Stable identifier derived from the resolved content path.
    pub content_id: String,
    /// Resolved, section-prefixed content path.
    pub path: String,
    /// Display title.
    pub title: String,
    /// Author, when known.
    pub author: Option<String>,
}

/// The record shape persisted to the progress backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Resolved content path.
    pub content_path: String,
    /// Display title.
    pub title: String,
    /// Author, when known.
    pub author: Option<String>,
    /// 0-based current unit.
    pub unit_index: i64,
    /// Number of units in the document.
    pub total_units: i64,
    /// `round(unit_index / total_units * 100)`.
    pub progress_percent: i64,
    /// Last access wall-clock milliseconds.
    pub last_access_ms: i64,
}

impl ProgressRecord {
    /// Build a persistable record from a descriptor and a position.
    pub fn new(descriptor: &ContentDescriptor, position: &ReadingPosition) -> Self {
        let percent = if position.total_units == 0 {
            0
        } else {
            ((position.unit_index as f64 / position.total_units as f64) * 100.0).round() as i64
        };
        Self {
            content_path: descriptor.path.clone(),
            title: descriptor.title.clone(),
            author: descriptor.author.clone(),
            unit_index: position.unit_index as i64,
            total_units: position.total_units as i64,
            progress_percent: percent,
            last_access_ms: position.timestamp_ms,
        }
    }
}

/// One entry of the recency-ordered history list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Stable content identifier.
    pub content_id: String,
    /// Display title.
    pub title: String,
    /// Author, when known.
    pub author: Option<String>,
    /// Last persisted unit index.
    pub unit_index: usize,
    /// Unit count at last persist.
    pub total_units: usize,
    /// Last access wall-clock milliseconds.
    pub last_access_ms: i64,
}

type PendingWrite = (String, ProgressRecord);

struct DebounceInner {
    pending: Option<PendingWrite>,
    generation: u64,
}

/// Owns the pending payload and the cancellation token for the debounce
/// window. Calling [`Debouncer::record`] replaces the payload and restarts
/// the window; only the most recent generation may claim the payload.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    inner: Arc<Mutex<DebounceInner>>,
}

impl Debouncer {
    /// Create a debouncer with the given window.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Arc::new(Mutex::new(DebounceInner {
                pending: None,
                generation: 0,
            })),
        }
    }

    /// The configured debounce window.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace the pending payload, restart the window, and return the
    /// generation token the eventual timer must present.
    pub fn record(&self, payload: PendingWrite) -> u64 {
        let mut inner = self.inner.lock();
        inner.pending = Some(payload);
        inner.generation += 1;
        inner.generation
    }

    /// Claim the pending payload if `generation` is still current. A stale
    /// token means a newer record or a flush superseded this timer.
    pub fn take_if_current(&self, generation: u64) -> Option<PendingWrite> {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.pending.take()
        } else {
            None
        }
    }

    /// Take the pending payload immediately, invalidating any live timer.
    pub fn flush(&self) -> Option<PendingWrite> {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.pending.take()
    }

    /// Discard the pending payload and invalidate any live timer.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.pending = None;
    }

    /// Whether a write is currently pending.
    pub fn has_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }
}

/// Debounced, at-most-one-pending-write persistence of reading positions.
#[derive(Clone)]
pub struct ProgressStore {
    backend: Arc<dyn ProgressBackend>,
    user_key: String,
    debouncer: Debouncer,
}

impl ProgressStore {
    /// Create a store over a backend for one user key.
    pub fn new(backend: Arc<dyn ProgressBackend>, user_key: &str, debounce: Duration) -> Self {
        Self {
            backend,
            user_key: user_key.to_string(),
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Schedule a position write. A call landing inside an open window
    /// replaces the pending payload and restarts the timer; the final settled
    /// position is what gets persisted.
    pub fn record_position(&self, descriptor: &ContentDescriptor, position: &ReadingPosition) {
        let record = ProgressRecord::new(descriptor, position);
        let generation = self
            .debouncer
            .record((descriptor.content_id.clone(), record));

        // Outside a runtime the payload just stays pending until flush_now.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let store = self.clone();
            handle.spawn(async move {
                tokio::time::sleep(store.debouncer.delay()).await;
                if let Some((content_id, record)) = store.debouncer.take_if_current(generation) {
                    store.write(&content_id, &record);
                }
            });
        }
    }

    /// Perform any pending write immediately, bypassing the timer. Called on
    /// session close and process teardown.
    pub fn flush_now(&self) {
        if let Some((content_id, record)) = self.debouncer.flush() {
            self.write(&content_id, &record);
        }
    }

    /// Discard any pending write without persisting it.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    /// Whether a write is scheduled but not yet performed.
    pub fn has_pending(&self) -> bool {
        self.debouncer.has_pending()
    }

    /// The most recent persisted state for one content item.
    pub fn lookup(&self, content_id: &str) -> Result<Option<HistoryEntry>> {
        let rows = self.backend.list_for_user(&self.user_key)?;
        Ok(rows
            .into_iter()
            .filter(|(id, _)| id == content_id)
            .max_by_key(|(_, r)| r.last_access_ms)
            .map(|(id, r)| to_history_entry(id, r)))
    }

    /// Recency-ordered history, deduplicated by content id and truncated to
    /// `limit` entries.
    pub fn get_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = self.backend.list_for_user(&self.user_key)?;

        let mut latest: HashMap<String, ProgressRecord> = HashMap::new();
        for (content_id, record) in rows {
            match latest.get(&content_id) {
                Some(existing) if existing.last_access_ms >= record.last_access_ms => {}
                _ => {
                    latest.insert(content_id, record);
                }
            }
        }

        let mut entries: Vec<HistoryEntry> = latest
            .into_iter()
            .map(|(id, r)| to_history_entry(id, r))
            .collect();
        entries.sort_by(|a, b| b.last_access_ms.cmp(&a.last_access_ms));
        entries.truncate(limit);
        Ok(entries)
    }

    fn write(&self, content_id: &str, record: &ProgressRecord) {
        if let Err(e) = self.backend.upsert(&self.user_key, content_id, record) {
            // Reading must never halt because progress could not be saved.
            tracing::warn!(content_id, error = %e, "progress write failed");
        }
    }
}

fn to_history_entry(content_id: String, record: ProgressRecord) -> HistoryEntry {
    HistoryEntry {
        content_id,
        title: record.title,
        author: record.author,
        unit_index: record.unit_index.max(0) as usize,
        total_units: record.total_units.max(0) as usize,
        last_access_ms: record.last_access_ms,
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
