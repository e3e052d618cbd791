//! Resumable harvesting loop.
//!
//! [`Harvester::run`] restores or creates a session, then repeatedly fetches
//! a page at the checkpointed offset, parses it, writes it to its own file,
//! advances the offset and saves the checkpoint. The checkpoint is only
//! written after a batch file is complete, so an interrupted run repeats at
//! most the batch that was in flight.

mod checkpoint;
mod writer;

pub use checkpoint::CheckpointStore;
pub use writer::BatchWriter;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HarvestConfig;
use crate::models::{ArticleRecord, SessionState};
use crate::sources::{parse_article_set, ResultSetSource, SourceError};
use crate::utils::{with_retry, ProgressReporter, RetryPolicy};

/// Errors that end a harvest run
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Search, fetch or parse failure at the remote boundary
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Checkpoint could not be read or written
    #[error("Checkpoint error ({path}): {message}")]
    Checkpoint { path: PathBuf, message: String },

    /// Output file or directory error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestSummary {
    /// Batch files written by this run
    pub batches_written: u64,
    /// Articles written by this run
    pub articles: u64,
    /// Final checkpoint offset
    pub next_offset: u64,
    /// Size of the result set
    pub total_count: u64,
}

/// Drives search, paginated fetch, parse, write and checkpoint.
#[derive(Debug)]
pub struct Harvester {
    source: Arc<dyn ResultSetSource>,
    checkpoints: CheckpointStore,
    writer: BatchWriter,
    retry: RetryPolicy,
    query: String,
    page_size: u64,
    max_results: u64,
    batch_pause: Duration,
    progress: ProgressReporter,
}

impl Harvester {
    /// Create a harvester; the output directory is created here.
    pub fn new(
        source: Arc<dyn ResultSetSource>,
        config: &HarvestConfig,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            source,
            checkpoints: CheckpointStore::new(&config.checkpoint_path),
            writer: BatchWriter::new(&config.output_dir)?,
            retry: RetryPolicy::from_config(&config.retry),
            query: config.query.clone(),
            page_size: config.page_size.max(1),
            max_results: config.max_results,
            batch_pause: config.batch_pause(),
            progress: ProgressReporter::hidden(),
        })
    }

    /// Report batch progress through `progress`
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the fetch retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn writer(&self) -> &BatchWriter {
        &self.writer
    }

    /// Run until every page of the result set has been written.
    ///
    /// Resumes from the checkpoint when one exists. Any error that survives
    /// the retry policy ends the run with the checkpoint left at the last
    /// completed batch.
    pub async fn run(&self) -> Result<HarvestSummary, HarvestError> {
        let mut state = self.restore_or_start().await?;

        if state.total_count > self.max_results {
            tracing::warn!(
                "Result set has {} articles, above the configured max_results of {}; fetching all of them",
                state.total_count,
                self.max_results
            );
        }

        self.progress.start(
            batch_count(state.total_count, self.page_size),
            batch_count(state.next_offset, self.page_size),
        );

        let mut summary = HarvestSummary {
            batches_written: 0,
            articles: 0,
            next_offset: state.next_offset,
            total_count: state.total_count,
        };

        while !state.is_complete() {
            let offset = state.next_offset;
            let records = self.fetch_batch(&state).await?;
            let path = self.writer.write(offset, &records)?;
            tracing::debug!("Wrote {} articles to {}", records.len(), path.display());

            state.advance(self.page_size);
            self.checkpoints.save(&state)?;

            summary.batches_written += 1;
            summary.articles += records.len() as u64;
            summary.next_offset = state.next_offset;
            self.progress.batch_done(offset, records.len());

            tokio::time::sleep(self.batch_pause).await;
        }

        self.progress.finish();
        tracing::info!(
            "Harvest complete: {} batches ({} articles) written this run, offset {}/{}",
            summary.batches_written,
            summary.articles,
            summary.next_offset,
            summary.total_count
        );
        Ok(summary)
    }

    /// Load the checkpoint, or search and persist a new session
    async fn restore_or_start(&self) -> Result<SessionState, HarvestError> {
        if let Some(state) = self.checkpoints.load()? {
            tracing::info!(
                "Resuming from {} at offset {}/{}",
                self.checkpoints.path().display(),
                state.next_offset,
                state.total_count
            );
            return Ok(state);
        }

        tracing::info!("No checkpoint found, starting a new {} search", self.source.id());
        let state = self.source.search(&self.query).await?;
        self.checkpoints.save(&state)?;
        Ok(state)
    }

    /// Fetch and parse the page at the session's current offset
    async fn fetch_batch(&self, state: &SessionState) -> Result<Vec<ArticleRecord>, HarvestError> {
        let offset = state.next_offset;
        let source = self.source.as_ref();
        let page_size = self.page_size;

        let xml = with_retry(&self.retry, || source.fetch_page(state, offset, page_size)).await?;
        let records = parse_article_set(&xml)?;

        let expected = state.remaining().min(page_size);
        if records.len() as u64 != expected {
            tracing::debug!(
                "Batch at offset {} returned {} articles, expected {}",
                offset,
                records.len(),
                expected
            );
        }
        Ok(records)
    }
}

/// Number of pages needed to cover `count` results
fn batch_count(count: u64, page_size: u64) -> u64 {
    count.div_ceil(page_size)
}
