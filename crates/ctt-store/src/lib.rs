//! Event cache store for the calendar time tracker.
//!
//! Keeps one durable, deduplicated event set per source and merges each
//! fetch cycle into it with [`ctt_core::merge_events`].
//!
//! # Backends
//!
//! Persistence goes through the [`CacheBackend`] trait so the merge logic
//! can be exercised without a filesystem:
//! - [`FileBackend`]: one CSV file per source, replaced atomically
//! - [`SqliteBackend`]: one SQLite database with a row per cached event
//! - [`MemoryBackend`]: process-local, for tests and dry runs
//!
//! # Concurrency
//!
//! [`CacheStore`] serializes reconciliations per source inside a process.
//! Backends may add cross-process locking through [`CacheBackend::lock`];
//! the file backend takes an advisory `fs2` lock next to each cache file.
//!
//! # Failure Semantics
//!
//! - An unreadable or corrupt partition is logged and treated as empty.
//! - An empty fetch leaves the partition untouched.
//! - A failed write surfaces as [`ReconcileError::Persist`], which still
//!   carries the reconciled events for the current cycle.

mod file;
mod memory;
mod sqlite;

use std::collections::HashMap;
use std::fs::File;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use ctt_core::{Event, ReconcilePolicy, SourceId, merge_events};
use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A CSV encoding or decoding error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Persisted data that cannot be turned back into events.
    #[error("corrupt cache entry for {source_id}: {message}")]
    Corrupt { source_id: String, message: String },
}

/// Errors from [`CacheStore::reconcile`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The reconciled set could not be persisted.
    ///
    /// `events` holds the in-memory result, still usable for this cycle.
    #[error("failed to persist {} reconciled events for source {source_id}", .events.len())]
    Persist {
        source_id: SourceId,
        events: Vec<Event>,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    /// Returns the reconciled events that could not be persisted.
    pub fn into_events(self) -> Vec<Event> {
        match self {
            Self::Persist { events, .. } => events,
        }
    }
}

/// Exclusive hold on one partition, released on drop.
#[derive(Debug, Default)]
pub struct PartitionLock {
    file: Option<File>,
}

impl PartitionLock {
    /// A lock that guards nothing beyond the in-process mutex.
    pub const fn none() -> Self {
        Self { file: None }
    }

    /// Wraps a file that already holds an exclusive `fs2` lock.
    pub(crate) const fn file(file: File) -> Self {
        Self { file: Some(file) }
    }
}

impl Drop for PartitionLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file
            && let Err(err) = FileExt::unlock(file)
        {
            warn!(error = %err, "failed to release cache lock");
        }
    }
}

/// Persistence interface for cached event sets.
///
/// Implementations store whole partitions; the merge happens in
/// [`CacheStore`].
pub trait CacheBackend: Send + Sync {
    /// Loads a partition. `Ok(None)` means nothing has been cached yet.
    fn load(&self, source_id: &SourceId) -> Result<Option<Vec<Event>>, StoreError>;

    /// Replaces a partition's content atomically.
    fn store(&self, source_id: &SourceId, events: &[Event]) -> Result<(), StoreError>;

    /// Deletes a partition. Returns whether it existed.
    fn clear(&self, source_id: &SourceId) -> Result<bool, StoreError>;

    /// Lists cached partitions.
    fn keys(&self) -> Result<Vec<SourceId>, StoreError>;

    /// Acquires a cross-process lock on a partition.
    fn lock(&self, _source_id: &SourceId) -> Result<PartitionLock, StoreError> {
        Ok(PartitionLock::none())
    }
}

/// Summary of one cached partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub source_id: SourceId,
    pub event_count: usize,
    pub first_start: Option<DateTime<Utc>>,
    pub last_end: Option<DateTime<Utc>>,
}

/// The per-source event cache.
pub struct CacheStore {
    backend: Box<dyn CacheBackend>,
    policy: ReconcilePolicy,
    locks: Mutex<HashMap<SourceId, Arc<Mutex<()>>>>,
}

impl CacheStore {
    /// Creates a store over `backend` using `policy` for reconciliation.
    pub fn new(backend: Box<dyn CacheBackend>, policy: ReconcilePolicy) -> Self {
        Self {
            backend,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub const fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Merges `fresh` into the cached set for `source_id` and persists it.
    ///
    /// `now` anchors the recency window of [`ReconcilePolicy::Windowed`].
    /// Fresh events tagged with another source are re-homed to `source_id`.
    pub fn reconcile(
        &self,
        source_id: &SourceId,
        fresh: Vec<Event>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, ReconcileError> {
        self.reconcile_with(source_id, fresh, self.policy, now)
    }

    /// Like [`CacheStore::reconcile`], but merges under `policy` instead of
    /// the store's own.
    ///
    /// Partial fetches such as file imports use [`ReconcilePolicy::Unbounded`]
    /// since they are not authoritative for the recency window.
    pub fn reconcile_with(
        &self,
        source_id: &SourceId,
        fresh: Vec<Event>,
        policy: ReconcilePolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, ReconcileError> {
        let partition = self.partition_mutex(source_id);
        let _in_process = partition.lock().unwrap_or_else(PoisonError::into_inner);

        let cross_process = self.backend.lock(source_id);
        let existing = self.load_partition(source_id);

        if fresh.is_empty() {
            debug!(source = %source_id, cached = existing.len(), "empty fetch, cache unchanged");
            return Ok(existing);
        }

        let fresh = rehome(source_id, fresh);
        let fresh_count = fresh.len();
        let merged = merge_events(existing, fresh, policy, now);

        let persisted = match cross_process {
            Ok(_guard) => self.backend.store(source_id, &merged),
            Err(err) => Err(err),
        };
        if let Err(source) = persisted {
            warn!(source = %source_id, error = %source, "failed to persist reconciled events");
            return Err(ReconcileError::Persist {
                source_id: source_id.clone(),
                events: merged,
                source,
            });
        }

        info!(
            source = %source_id,
            fetched = fresh_count,
            cached = merged.len(),
            "reconciled source"
        );
        Ok(merged)
    }

    /// Returns the cached set for `source_id`; corrupt data reads as empty.
    pub fn load(&self, source_id: &SourceId) -> Vec<Event> {
        let partition = self.partition_mutex(source_id);
        let _in_process = partition.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_partition(source_id)
    }

    /// Deletes the cached set for `source_id`. Returns whether it existed.
    pub fn clear(&self, source_id: &SourceId) -> Result<bool, StoreError> {
        let partition = self.partition_mutex(source_id);
        let _in_process = partition.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self.backend.lock(source_id)?;
        let existed = self.backend.clear(source_id)?;
        if existed {
            info!(source = %source_id, "cleared cache partition");
        }
        Ok(existed)
    }

    /// Deletes every cached partition. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for source_id in self.backend.keys()? {
            if self.clear(&source_id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Lists cached partitions with their event counts and spans.
    pub fn partitions(&self) -> Result<Vec<PartitionSummary>, StoreError> {
        let mut keys = self.backend.keys()?;
        keys.sort();
        Ok(keys
            .into_iter()
            .map(|source_id| {
                let events = self.load(&source_id);
                PartitionSummary {
                    event_count: events.len(),
                    first_start: events.iter().map(|e| e.start).min(),
                    last_end: events.iter().map(|e| e.end).max(),
                    source_id,
                }
            })
            .collect())
    }

    fn load_partition(&self, source_id: &SourceId) -> Vec<Event> {
        match self.backend.load(source_id) {
            Ok(Some(events)) => rehome(source_id, events),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(source = %source_id, error = %err, "unreadable cache, treating as empty");
                Vec::new()
            }
        }
    }

    fn partition_mutex(&self, source_id: &SourceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(source_id.clone()).or_default())
    }
}

/// Tags every event with `source_id`.
fn rehome(source_id: &SourceId, mut events: Vec<Event>) -> Vec<Event> {
    for event in &mut events {
        if &event.source_id != source_id {
            debug!(from = %event.source_id, to = %source_id, "re-homing event");
            event.source_id = source_id.clone();
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ctt_core::Uid;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn source() -> SourceId {
        SourceId::from_address("https://example.com/work.ics")
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn identified(uid: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event::new(Some(Uid::new(uid).unwrap()), source(), uid, start, end).unwrap()
    }

    fn memory_store(policy: ReconcilePolicy) -> CacheStore {
        CacheStore::new(Box::new(MemoryBackend::new()), policy)
    }

    /// Serves a fixed partition and fails every write.
    struct ReadOnlyBackend {
        events: Vec<Event>,
        writes: AtomicUsize,
    }

    impl CacheBackend for ReadOnlyBackend {
        fn load(&self, _: &SourceId) -> Result<Option<Vec<Event>>, StoreError> {
            Ok(Some(self.events.clone()))
        }

        fn store(&self, _: &SourceId, _: &[Event]) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn clear(&self, _: &SourceId) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn keys(&self) -> Result<Vec<SourceId>, StoreError> {
            Ok(vec![source()])
        }
    }

    /// Always reports a corrupt partition.
    struct CorruptBackend;

    impl CacheBackend for CorruptBackend {
        fn load(&self, source_id: &SourceId) -> Result<Option<Vec<Event>>, StoreError> {
            Err(StoreError::Corrupt {
                source_id: source_id.to_string(),
                message: "garbage".to_string(),
            })
        }

        fn store(&self, _: &SourceId, _: &[Event]) -> Result<(), StoreError> {
            Ok(())
        }

        fn clear(&self, _: &SourceId) -> Result<bool, StoreError> {
            Ok(true)
        }

        fn keys(&self) -> Result<Vec<SourceId>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn reconcile_persists_merged_set() {
        let store = memory_store(ReconcilePolicy::Unbounded);
        let now = at(2024, 1, 10, 0);

        store
            .reconcile(&source(), vec![identified("A", at(2024, 1, 1, 9), at(2024, 1, 1, 10))], now)
            .unwrap();
        let merged = store
            .reconcile(&source(), vec![identified("B", at(2024, 1, 2, 9), at(2024, 1, 2, 10))], now)
            .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(store.load(&source()), merged);
    }

    #[test]
    fn unbounded_override_keeps_recent_events() {
        let store = memory_store(ReconcilePolicy::Windowed { days: 30 });
        let now = at(2024, 3, 25, 0);
        store
            .reconcile(
                &source(),
                vec![
                    identified("live-1", at(2024, 3, 10, 9), at(2024, 3, 10, 10)),
                    identified("live-2", at(2024, 3, 20, 9), at(2024, 3, 20, 10)),
                ],
                now,
            )
            .unwrap();

        let merged = store
            .reconcile_with(
                &source(),
                vec![identified("old-1", at(2022, 5, 1, 9), at(2022, 5, 1, 10))],
                ReconcilePolicy::Unbounded,
                now,
            )
            .unwrap();

        let uids: Vec<_> = merged
            .iter()
            .filter_map(|e| e.uid.as_ref().map(Uid::as_str))
            .collect();
        assert_eq!(uids, ["old-1", "live-1", "live-2"]);
        assert_eq!(store.load(&source()), merged);
        // The store's own policy is untouched.
        assert_eq!(store.policy(), ReconcilePolicy::Windowed { days: 30 });
    }

    #[test]
    fn empty_fetch_preserves_cache() {
        let store = memory_store(ReconcilePolicy::default());
        let now = at(2024, 1, 10, 0);
        let cached = store
            .reconcile(&source(), vec![identified("A", at(2024, 1, 1, 9), at(2024, 1, 1, 10))], now)
            .unwrap();

        let after = store.reconcile(&source(), Vec::new(), now).unwrap();
        assert_eq!(after, cached);
        assert_eq!(store.load(&source()), cached);
    }

    #[test]
    fn write_failure_still_returns_events() {
        let backend = ReadOnlyBackend {
            events: vec![identified("A", at(2023, 1, 1, 9), at(2023, 1, 1, 10))],
            writes: AtomicUsize::new(0),
        };
        let store = CacheStore::new(Box::new(backend), ReconcilePolicy::default());

        let err = store
            .reconcile(
                &source(),
                vec![identified("B", at(2024, 1, 2, 9), at(2024, 1, 2, 10))],
                at(2024, 1, 10, 0),
            )
            .unwrap_err();

        assert!(err.to_string().contains("failed to persist 2 reconciled events"));
        let events = err.into_events();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn empty_fetch_never_writes() {
        let backend = ReadOnlyBackend {
            events: vec![identified("A", at(2023, 1, 1, 9), at(2023, 1, 1, 10))],
            writes: AtomicUsize::new(0),
        };
        let store = CacheStore::new(Box::new(backend), ReconcilePolicy::default());
        let events = store.reconcile(&source(), Vec::new(), at(2024, 1, 10, 0)).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn corrupt_partition_reads_as_empty() {
        let store = CacheStore::new(Box::new(CorruptBackend), ReconcilePolicy::default());
        assert!(store.load(&source()).is_empty());

        let fresh = vec![identified("A", at(2024, 1, 1, 9), at(2024, 1, 1, 10))];
        let merged = store.reconcile(&source(), fresh.clone(), at(2024, 1, 10, 0)).unwrap();
        assert_eq!(merged, fresh);
    }

    #[test]
    fn fresh_events_are_rehomed() {
        let store = memory_store(ReconcilePolicy::default());
        let other = SourceId::from_address("https://example.com/other.ics");
        let event = Event::new(None, other, "x", at(2024, 1, 1, 9), at(2024, 1, 1, 10)).unwrap();

        let merged = store.reconcile(&source(), vec![event], at(2024, 1, 10, 0)).unwrap();
        assert_eq!(merged[0].source_id, source());
    }

    #[test]
    fn partitions_are_isolated_and_listed() {
        let store = memory_store(ReconcilePolicy::default());
        let other = SourceId::from_address("https://example.com/gym.ics");
        let now = at(2024, 1, 10, 0);

        store
            .reconcile(&source(), vec![identified("A", at(2024, 1, 1, 9), at(2024, 1, 1, 10))], now)
            .unwrap();
        store
            .reconcile(
                &other,
                vec![
                    Event::new(None, other.clone(), "Gym", at(2024, 1, 3, 7), at(2024, 1, 3, 8)).unwrap(),
                    Event::new(None, other.clone(), "Gym", at(2024, 1, 5, 7), at(2024, 1, 5, 8)).unwrap(),
                ],
                now,
            )
            .unwrap();

        assert_eq!(store.load(&source()).len(), 1);
        let summaries = store.partitions().unwrap();
        assert_eq!(summaries.len(), 2);
        let gym = summaries.iter().find(|s| s.source_id == other).unwrap();
        assert_eq!(gym.event_count, 2);
        assert_eq!(gym.first_start, Some(at(2024, 1, 3, 7)));
        assert_eq!(gym.last_end, Some(at(2024, 1, 5, 8)));
    }

    #[test]
    fn clear_removes_one_partition() {
        let store = memory_store(ReconcilePolicy::default());
        let now = at(2024, 1, 10, 0);
        store
            .reconcile(&source(), vec![identified("A", at(2024, 1, 1, 9), at(2024, 1, 1, 10))], now)
            .unwrap();

        assert!(store.clear(&source()).unwrap());
        assert!(!store.clear(&source()).unwrap());
        assert!(store.load(&source()).is_empty());
    }

    #[test]
    fn clear_all_counts_partitions() {
        let store = memory_store(ReconcilePolicy::default());
        let now = at(2024, 1, 10, 0);
        for address in ["https://a.example/1.ics", "https://a.example/2.ics"] {
            let id = SourceId::from_address(address);
            let event = Event::new(None, id.clone(), "x", at(2024, 1, 1, 9), at(2024, 1, 1, 10)).unwrap();
            store.reconcile(&id, vec![event], now).unwrap();
        }
        assert_eq!(store.clear_all().unwrap(), 2);
        assert!(store.partitions().unwrap().is_empty());
    }

    #[test]
    fn concurrent_reconciles_do_not_lose_events() {
        let store = Arc::new(memory_store(ReconcilePolicy::Unbounded));
        let now = at(2024, 1, 10, 0);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let uid = format!("evt-{i}");
                    let event = identified(&uid, at(2024, 1, 1, i), at(2024, 1, 1, i + 1));
                    store.reconcile(&source(), vec![event], now).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load(&source()).len(), 8);
    }
}
