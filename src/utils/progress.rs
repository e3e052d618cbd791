//! Batch progress reporting.
//!
//! Wraps an `indicatif` bar counting batches of the current result set. The
//! bar is hidden in quiet mode and when stderr is not a terminal, so log
//! output stays clean under cron or in CI.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Progress reporter over the batches of one harvest run
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("position", &self.bar.position())
            .field("length", &self.bar.length())
            .field("hidden", &self.bar.is_hidden())
            .finish()
    }
}

impl ProgressReporter {
    /// Create a reporter; `quiet` suppresses all output
    pub fn new(quiet: bool) -> Self {
        if quiet || !std::io::stderr().is_terminal() {
            return Self::hidden();
        }

        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} batches {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        Self { bar }
    }

    /// Create a reporter that never draws
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Set the batch totals, accounting for batches completed by an earlier run
    pub fn start(&self, total_batches: u64, completed_batches: u64) {
        self.bar.set_length(total_batches);
        self.bar.set_position(completed_batches.min(total_batches));
    }

    /// Record one written batch
    pub fn batch_done(&self, offset: u64, articles: usize) {
        self.bar.set_message(format!("offset {} ({} articles)", offset, articles));
        self.bar.inc(1);
    }

    /// Finish the bar
    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }

    /// Current position, in batches
    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::hidden()
    }
}
