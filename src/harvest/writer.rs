//! Per-batch JSON output.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::harvest::HarvestError;
use crate::models::ArticleRecord;

/// Writes each batch to `papers_chunk_<offset>.json` in one directory
#[derive(Debug, Clone)]
pub struct BatchWriter {
    output_dir: PathBuf,
}

impl BatchWriter {
    /// Create the writer, creating `output_dir` if needed
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// File name for the batch starting at `offset`
    pub fn chunk_path(&self, offset: u64) -> PathBuf {
        self.output_dir.join(format!("papers_chunk_{}.json", offset))
    }

    /// Write one batch as a pretty-printed JSON array.
    ///
    /// An existing file for the same offset is overwritten.
    pub fn write(&self, offset: u64, records: &[ArticleRecord]) -> Result<PathBuf, HarvestError> {
        let path = self.chunk_path(offset);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(path)
    }
}
