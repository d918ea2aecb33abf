//! Checkpoint storage
//!
//! The driver owns one checkpoint per source name. Stores only ever hold the
//! last checkpoint a source returned successfully.

use chrono::{DateTime, Utc};
use ingest_core::Checkpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is not valid JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub checkpoint: Checkpoint,
    pub updated_at: DateTime<Utc>,
}

/// Per-source checkpoint storage
pub trait CheckpointStore: Send + Sync {
    fn get(&self, source: &str) -> Option<Checkpoint>;

    /// Record the checkpoint a source returned. `None` forgets the source.
    fn set(&mut self, source: &str, checkpoint: Option<Checkpoint>) -> Result<(), StateError>;
}

fn update(entries: &mut BTreeMap<String, CheckpointEntry>, source: &str, checkpoint: Option<Checkpoint>) {
    match checkpoint {
        Some(checkpoint) => {
            entries.insert(
                source.to_string(),
                CheckpointEntry {
                    checkpoint,
                    updated_at: Utc::now(),
                },
            );
        }
        None => {
            entries.remove(source);
        }
    }
}

/// Checkpoints kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, CheckpointEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStore {
    fn get(&self, source: &str) -> Option<Checkpoint> {
        self.entries.get(source).map(|e| e.checkpoint.clone())
    }

    fn set(&mut self, source: &str, checkpoint: Option<Checkpoint>) -> Result<(), StateError> {
        update(&mut self.entries, source, checkpoint);
        Ok(())
    }
}

/// Checkpoints persisted to a JSON file, rewritten atomically on every change
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, CheckpointEntry>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file starts empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!("Loaded {} checkpoints from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CheckpointStore for JsonFileStore {
    fn get(&self, source: &str) -> Option<Checkpoint> {
        self.entries.get(source).map(|e| e.checkpoint.clone())
    }

    fn set(&mut self, source: &str, checkpoint: Option<Checkpoint>) -> Result<(), StateError> {
        update(&mut self.entries, source, checkpoint);
        self.save()
    }
}
