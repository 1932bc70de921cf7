//! File-backed spool store.
//!
//! One `<uuid>.json` file per event inside a spool directory. Writes and
//! deletes are small independent files, so a crash can at worst leave one
//! orphaned or truncated entry; unreadable entries are skipped (with a
//! warning) on load rather than failing rehydration.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use beacon_core::{Event, EventId};

use crate::{DurableStore, StoreError};

/// Durable store writing one JSON file per event.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the spool directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: EventId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// The spool directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn put(&self, event: &Event) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(event)?;
        tokio::fs::write(self.path_for(event.id), bytes).await?;
        Ok(())
    }

    async fn delete(&self, id: EventId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_all(&self) -> Result<Vec<Event>, StoreError> {
        let mut events = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable spool entry");
                    continue;
                }
            };

            match serde_json::from_slice::<Event>(&bytes) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt spool entry");
                }
            }
        }

        events.sort_by_key(|e| (e.enqueued_at, e.id));
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
