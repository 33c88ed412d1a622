//! In-memory cache backend.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use ctt_core::{Event, SourceId};

use crate::{CacheBackend, StoreError};

/// Keeps partitions in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: Mutex<HashMap<SourceId, Vec<Event>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, source_id: &SourceId) -> Result<Option<Vec<Event>>, StoreError> {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(partitions.get(source_id).cloned())
    }

    fn store(&self, source_id: &SourceId, events: &[Event]) -> Result<(), StoreError> {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        partitions.insert(source_id.clone(), events.to_vec());
        Ok(())
    }

    fn clear(&self, source_id: &SourceId) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(partitions.remove(source_id).is_some())
    }

    fn keys(&self) -> Result<Vec<SourceId>, StoreError> {
        let partitions = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<SourceId> = partitions.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
