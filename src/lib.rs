//! # splitdl Library
//!
//! Downloads one HTTP(S) resource to a local file, splitting the transfer
//! into concurrent byte-range requests when the server supports them.
//!
//! ## Features
//!
//! - **Multipart transfers**: one range request per part, all in flight at once
//! - **Resumable**: complete part files from an interrupted run are reused
//! - **Bounded retry**: per-part exponential backoff with an attempt budget
//! - **All-or-nothing**: the destination is written only after every part succeeded
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Destination derived from the URL ("image.iso")
//!     splitdl::get("https://example.com/image.iso", None).await?;
//!
//!     // Explicit destination
//!     splitdl::get("https://example.com/image.iso", Some("./image.iso")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Jobs
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use splitdl::DownloadJob;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = DownloadJob::new("https://example.com/image.iso")
//!     .with_concurrency(8)
//!     .with_max_retries(5)
//!     .with_attempt_timeout(Duration::from_secs(120));
//!
//! let report = splitdl::get_with_job(&job, None).await?;
//! println!("{} bytes in {} part(s)", report.total_bytes, report.parts);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use crate::core::error::{Error, Result};
pub use crate::core::fingerprint::fingerprint;
pub use crate::core::job::{DEFAULT_MAX_RETRIES, DEFAULT_MULTIPART_THRESHOLD};
pub use crate::core::plan::{part_specs, partition, PartSpec, TransferPlan};
pub use crate::core::stream::{Progress, ProgressCallback};
pub use crate::core::worker::{PartOutcome, PartResult};
pub use crate::core::{resolve_output_filename, DownloadJob, Downloader, Strategy, TransferReport};

// Internal modules
mod core;

/// Download `url` with default settings
///
/// # Arguments
/// * `url` - Source URL (http or https)
/// * `dest` - Optional destination file path. If None, uses the URL's last path segment
pub async fn get(url: &str, dest: Option<&str>) -> Result<TransferReport> {
    let job = job_for(url, dest);
    get_with_job(&job, None).await
}

/// Download with a progress callback receiving `(downloaded, total)` bytes
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// splitdl::get_with_progress(
///     "https://example.com/image.iso",
///     Some("image.iso"),
///     |downloaded, total| {
///         println!("{downloaded}/{total}");
///     },
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn get_with_progress<F>(url: &str, dest: Option<&str>, progress: F) -> Result<TransferReport>
where
    F: Fn(u64, u64) + Send + Sync + 'static,
{
    let job = job_for(url, dest);
    get_with_job(&job, Some(Arc::new(progress))).await
}

/// Run a fully specified job with an optional progress callback
pub async fn get_with_job(job: &DownloadJob, progress: Option<ProgressCallback>) -> Result<TransferReport> {
    let downloader = Downloader::for_job(job)?;
    downloader
        .run(job, Progress::new(progress), CancellationToken::new())
        .await
}

fn job_for(url: &str, dest: Option<&str>) -> DownloadJob {
    let job = DownloadJob::new(url);
    match dest {
        Some(path) => job.with_destination(path),
        None => job,
    }
}
