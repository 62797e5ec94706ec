//! CLI-specific progress handling for splitdl
//!
//! Renders the byte counts reported by the library as an indicatif bar.

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use splitdl::ProgressCallback;

/// Creates a progress bar for CLI display with transfer rate and ETA
pub fn create_progress_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {bytes_per_sec} ETA: {eta}")
            .expect("Failed to create progress style")
            .progress_chars("#>-")
    );
    pb
}

/// Owns the bar and hands out the callback the library reports into
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager; the length is set once the plan is known
    pub fn new(message: &str) -> Self {
        let pb = create_progress_bar(0);
        eprintln!("{}", message);
        Self { pb }
    }

    /// Callback receiving `(downloaded, total)` from every part worker.
    ///
    /// Only moves the bar; reaching `total` does not finish it, since parts
    /// may still be retrying.
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Arc::new(move |downloaded, total| {
            if total > 0 && pb.length() != Some(total) {
                pb.set_length(total);
            }
            pb.set_position(downloaded);
        })
    }

    /// Mark the bar complete once the download has succeeded
    pub fn finish(&self) {
        if !self.pb.is_finished() {
            self.pb.finish_with_message("✅ Download completed!");
        }
    }

    /// Leave the bar where it is after a failure
    pub fn abandon(&self) {
        if !self.pb.is_finished() {
            self.pb.abandon();
        }
    }
}
