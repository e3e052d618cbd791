//! Durable session checkpoint.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::harvest::HarvestError;
use crate::models::SessionState;

/// Single-file store for the current [`SessionState`]
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl ToString) -> HarvestError {
        HarvestError::Checkpoint {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    /// Load the saved state, or `None` on a first run.
    ///
    /// A file that exists but cannot be read or decoded is an error. Older
    /// checkpoints may record an offset past the end of the result set; it
    /// is clamped to `total_count`.
    pub fn load(&self) -> Result<Option<SessionState>, HarvestError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };

        let mut state: SessionState = serde_json::from_str(&content).map_err(|e| self.error(e))?;
        state.next_offset = state.next_offset.min(state.total_count);
        Ok(Some(state))
    }

    /// Replace the saved state.
    ///
    /// The state is written to a temporary file next to the checkpoint and
    /// renamed over it, so a reader sees either the old or the new state.
    pub fn save(&self, state: &SessionState) -> Result<(), HarvestError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.error(e))?;

        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.error(e))?;
        serde_json::to_writer(&mut file, state).map_err(|e| self.error(e))?;
        file.flush().map_err(|e| self.error(e))?;
        file.as_file().sync_all().map_err(|e| self.error(e))?;
        file.persist(&self.path).map_err(|e| self.error(e.error))?;

        tracing::trace!(
            "Checkpoint saved at offset {}/{}",
            state.next_offset,
            state.total_count
        );
        Ok(())
    }

    /// Delete the checkpoint. Returns whether one existed.
    pub fn clear(&self) -> Result<bool, HarvestError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error(e)),
        }
    }
}
