//! Progress reporting for block runs

use indicatif::{ProgressBar, ProgressStyle};

/// Wraps a progress bar counting processed blocks
pub struct ProgressTracker {
    bar: ProgressBar,
}

impl ProgressTracker {
    /// Create a tracker for a run over `total_blocks` blocks
    pub fn new(total_blocks: u64, description: &str) -> Self {
        let bar = ProgressBar::new(total_blocks);
        bar.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"));
        bar.set_message(description.to_string());

        ProgressTracker {
            bar,
        }
    }

    /// Advance the bar by a number of completed blocks
    pub fn increment(&self, blocks: u64) {
        self.bar.inc(blocks);
    }

    /// Close the bar after a successful run
    pub fn finish(&self) {
        self.bar.finish_with_message("Completed");
    }

    /// Abandon the bar, leaving it at its current position
    pub fn abandon(&self, msg: &str) {
        self.bar.abandon_with_message(msg.to_string());
    }
}
