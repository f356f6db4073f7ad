//! JSON file store: one `<checkpoint-id>.json` document per checkpoint.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::models::checkpoint::Checkpoint;
use crate::models::ensure_id;
use crate::{AppError, Result};

const EXTENSION: &str = "json";

/// Checkpoint store backed by a directory of JSON documents.
///
/// The directory is created on first write. Each document is written to a
/// temporary sibling and renamed into place, so readers never observe a
/// partially written checkpoint.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the id is empty or would escape the
    /// store directory.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        ensure_id("checkpoint id", id)?;
        if id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(AppError::Validation(format!(
                "checkpoint id {id} is not a valid file name"
            )));
        }
        Ok(self.dir.join(format!("{id}.{EXTENSION}")))
    }

    /// Write `checkpoint` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be written.
    pub async fn write(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.path_for(&checkpoint.id)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|err| {
            AppError::Io(format!(
                "failed to create checkpoint dir {}: {err}",
                self.dir.display()
            ))
        })?;

        let body = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(checkpoint_id = %checkpoint.id, path = %path.display(), "checkpoint file written");
        Ok(path)
    }

    /// Read and validate the checkpoint stored under `id`.
    ///
    /// Returns `Ok(None)` when no document exists, including for ids that
    /// cannot name a file in the store.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` on read failure, or `AppError::Validation` if
    /// the document does not satisfy the checkpoint schema.
    pub async fn read(&self, id: &str) -> Result<Option<Checkpoint>> {
        let Ok(path) = self.path_for(id) else {
            return Ok(None);
        };
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let checkpoint = Checkpoint::from_json(&raw)?;
        if checkpoint.id != id {
            return Err(AppError::Validation(format!(
                "checkpoint file {} holds id {}",
                path.display(),
                checkpoint.id
            )));
        }
        Ok(Some(checkpoint))
    }

    /// Ids of every stored checkpoint, sorted.
    ///
    /// A missing directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be listed.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                ids.push(stem.to_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
