//! CSV-file cache backend.
//!
//! Each partition lives in `<dir>/<source_id>.csv` with the columns
//! `start,end,duration_hours,uid,title`. Writes go to a `.tmp` sibling that
//! is renamed over the cache file, so a failed write leaves the previous
//! content in place.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ctt_core::{Event, SourceId, Uid};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{CacheBackend, PartitionLock, StoreError};

const EXTENSION: &str = "csv";

/// One cached event as a CSV row.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration_hours: f64,
    uid: Option<String>,
    title: String,
}

impl CsvRow {
    fn from_event(event: &Event) -> Self {
        Self {
            start: event.start,
            end: event.end,
            duration_hours: event.duration_hours(),
            uid: event.uid.as_ref().map(|uid| uid.as_str().to_string()),
            title: event.title.clone(),
        }
    }

    fn into_event(self, source_id: &SourceId) -> Result<Event, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            source_id: source_id.to_string(),
            message,
        };
        let uid = self
            .uid
            .filter(|uid| !uid.trim().is_empty())
            .map(Uid::new)
            .transpose()
            .map_err(|err| corrupt(err.to_string()))?;
        Event::new(uid, source_id.clone(), self.title, self.start, self.end)
            .map_err(|err| corrupt(err.to_string()))
    }
}

/// Stores each partition as a CSV file in one directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens a backend rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, source_id: &SourceId) -> PathBuf {
        self.dir.join(format!("{source_id}.{EXTENSION}"))
    }

    fn lock_path_for(&self, source_id: &SourceId) -> PathBuf {
        self.dir.join(format!("{source_id}.lock"))
    }
}

impl CacheBackend for FileBackend {
    fn load(&self, source_id: &SourceId) -> Result<Option<Vec<Event>>, StoreError> {
        let path = self.path_for(source_id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut events = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            events.push(row?.into_event(source_id)?);
        }
        Ok(Some(events))
    }

    fn store(&self, source_id: &SourceId, events: &[Event]) -> Result<(), StoreError> {
        let path = self.path_for(source_id);
        let tmp_path = path.with_extension("tmp");

        let mut writer = csv::Writer::from_path(&tmp_path)?;
        for event in events {
            writer.serialize(CsvRow::from_event(event))?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn clear(&self, source_id: &SourceId) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_for(source_id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn keys(&self) -> Result<Vec<SourceId>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| SourceId::new(stem).ok())
            {
                keys.push(id);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn lock(&self, source_id: &SourceId) -> Result<PartitionLock, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path_for(source_id))?;
        FileExt::lock_exclusive(&file)?;
        Ok(PartitionLock::file(file))
    }
}
