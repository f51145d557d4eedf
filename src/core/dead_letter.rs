//! Bounded, time-ordered archive of failed operations.
//!
//! Entries are kept in enqueue order. When the queue is full the oldest
//! entry is evicted to admit a new one, regardless of its operation or error
//! type, and the eviction is logged as data loss and counted.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{DeadLetterError, ErrorRecord, SchedulerError};
use crate::util::clock::{age_at, saturating_sub};

/// Default capacity of a dead-letter queue.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

/// Arbitrary key/value context attached to an entry.
pub type DeadLetterContext = HashMap<String, Value>;

/// Caller-supplied part of a dead-letter entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterInput {
    /// Operation that failed.
    pub operation: String,
    /// Failure that was archived.
    pub error: ErrorRecord,
    /// Extra context, e.g. what is needed to replay the operation.
    #[serde(default)]
    pub context: DeadLetterContext,
}

impl DeadLetterInput {
    /// Input without context.
    pub fn new(operation: impl Into<String>, error: ErrorRecord) -> Self {
        Self {
            operation: operation.into(),
            error,
            context: DeadLetterContext::new(),
        }
    }

    /// Attach one context value.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// A failed operation parked for later retry or inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Unique id.
    pub id: Uuid,
    /// Operation that failed.
    pub operation: String,
    /// Archived failure.
    pub error: ErrorRecord,
    /// Extra context.
    pub context: DeadLetterContext,
    /// When the entry was archived.
    pub enqueued_at: DateTime<Utc>,
    /// Retry attempts so far.
    pub attempts: u32,
    /// When the last retry attempt finished.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Aggregate view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterStats {
    /// Entries currently held.
    pub total: usize,
    /// Configured capacity.
    pub max_size: usize,
    /// Entries admitted since creation.
    pub total_enqueued: u64,
    /// Entries evicted because the queue was full.
    pub evicted: u64,
    /// Current entries per operation.
    pub by_operation: BTreeMap<String, usize>,
    /// Current entries per error type.
    pub by_error_type: BTreeMap<String, usize>,
    /// Age of the oldest entry.
    pub oldest_age: Option<Duration>,
    /// Age of the newest entry.
    pub newest_age: Option<Duration>,
}

/// Bounded FIFO archive of failed operations.
#[derive(Debug)]
pub struct DeadLetterQueue {
    max_size: usize,
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    total_enqueued: AtomicU64,
    evicted: AtomicU64,
}

impl Default for DeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}

impl DeadLetterQueue {
    /// Create a queue holding at most `max_size` entries (minimum one).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            max_size,
            entries: Mutex::new(VecDeque::with_capacity(max_size.min(1024))),
            total_enqueued: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// Configured capacity.
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Archive a failure, evicting the oldest entry first if at capacity.
    pub fn enqueue(&self, input: DeadLetterInput) -> Result<DeadLetterEntry, SchedulerError> {
        if input.operation.trim().is_empty() {
            return Err(SchedulerError::InvalidInput(
                "dead-letter operation name must not be empty".into(),
            ));
        }
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            operation: input.operation,
            error: input.error,
            context: input.context,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_attempt_at: None,
        };

        let evicted = {
            let mut entries = self.entries.lock();
            let evicted = if entries.len() >= self.max_size {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(entry.clone());
            evicted
        };
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);

        if let Some(old) = evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                evicted_id = %old.id,
                evicted_operation = %old.operation,
                evicted_error = %old.error,
                max_size = self.max_size,
                "dead-letter queue full, oldest entry evicted (data loss)"
            );
        }
        info!(id = %entry.id, operation = %entry.operation, error = %entry.error, "failure archived");
        Ok(entry)
    }

    /// Snapshot of entries, oldest first, optionally for one operation.
    pub fn get_all(&self, operation: Option<&str>) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| operation.is_none_or(|op| e.operation == op))
            .cloned()
            .collect()
    }

    /// Look up one entry.
    pub fn get(&self, id: Uuid) -> Option<DeadLetterEntry> {
        self.entries.lock().iter().find(|e| e.id == id).cloned()
    }

    /// Remove one entry explicitly.
    pub fn remove(&self, id: Uuid) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| e.id == id)?;
        entries.remove(pos)
    }

    /// Drop every entry; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Retry the operation behind entry `id`.
    ///
    /// The attempt count and last-attempt time are updated whatever the
    /// outcome; the entry is removed only on success.
    pub async fn retry_operation<F, Fut, T, E>(
        &self,
        id: Uuid,
        operation: F,
    ) -> Result<T, DeadLetterError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.get(id).is_none() {
            return Err(DeadLetterError::NotFound(id));
        }

        let result = operation().await;
        self.settle_attempt(id, result.is_ok());
        result.map_err(DeadLetterError::OperationFailed)
    }

    /// Record the outcome of a retry that actually ran: remove the entry on
    /// success, otherwise bump its attempt count. Returns false if the entry
    /// is gone.
    pub(crate) fn settle_attempt(&self, id: Uuid, succeeded: bool) -> bool {
        let mut entries = self.entries.lock();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        if succeeded {
            entries.remove(pos);
            debug!(%id, "dead-letter retry succeeded, entry removed");
        } else if let Some(entry) = entries.get_mut(pos) {
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_attempt_at = Some(Utc::now());
            debug!(%id, attempts = entry.attempts, "dead-letter retry failed");
        }
        true
    }

    /// Remove entries older than `max_age`; returns how many were removed.
    pub fn clear_old_entries(&self, max_age: Duration) -> usize {
        self.clear_entries_before(saturating_sub(Utc::now(), max_age))
    }

    /// Remove entries enqueued strictly before `cutoff`.
    pub fn clear_entries_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.enqueued_at >= cutoff);
        let removed = before - entries.len();
        drop(entries);
        if removed > 0 {
            info!(removed, %cutoff, "expired dead-letter entries removed");
        }
        removed
    }

    /// Aggregate statistics.
    pub fn get_statistics(&self) -> DeadLetterStats {
        let now = Utc::now();
        let entries = self.entries.lock();
        let mut stats = DeadLetterStats {
            total: entries.len(),
            max_size: self.max_size,
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            oldest_age: entries.front().map(|e| age_at(e.enqueued_at, now)),
            newest_age: entries.back().map(|e| age_at(e.enqueued_at, now)),
            ..DeadLetterStats::default()
        };
        for entry in entries.iter() {
            *stats.by_operation.entry(entry.operation.clone()).or_default() += 1;
            *stats
                .by_error_type
                .entry(entry.error.error_type.clone())
                .or_default() += 1;
        }
        stats
    }
}
