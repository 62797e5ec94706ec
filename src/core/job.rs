//! Download job description for splitdl
//!
//! A `DownloadJob` is created once per invocation and is never mutated after
//! the transfer starts; every derived path (staging directory, part files)
//! is computed from it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;

use crate::core::error::{Error, Result};
use crate::core::fingerprint::fingerprint;

/// Default number of retries per part after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Below this size one stream beats N range requests
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024;

/// Filename used when the URL has no usable last path segment
const FALLBACK_FILENAME: &str = "download";

/// Immutable descriptor of one download
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Source URL (http or https)
    pub url: String,

    /// Final output file
    pub destination: PathBuf,

    /// Number of concurrent range requests
    pub concurrency: usize,

    /// Retries per part after the first attempt
    pub max_retries: u32,

    /// Bound on a single attempt; `None` means unbounded
    pub attempt_timeout: Option<Duration>,

    /// Backoff before retry `n` is `retry_base_delay * 2^n`
    pub retry_base_delay: Duration,

    /// Minimum advertised size for a multipart transfer
    pub multipart_threshold: u64,

    /// Optional HTTP/HTTPS proxy for every request
    pub proxy: Option<String>,

    /// Parent of the staging directory; defaults to the destination's directory
    pub staging_root: Option<PathBuf>,
}

impl DownloadJob {
    /// Create a job with defaults, deriving the destination from the URL
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let destination = PathBuf::from(resolve_output_filename(&url));
        Self {
            url,
            destination,
            concurrency: num_cpus::get().max(1),
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_timeout: None,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            proxy: None,
            staging_root: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// A zero duration means unbounded
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_multipart_threshold(mut self, threshold: u64) -> Self {
        self.multipart_threshold = threshold;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Check the job before any network activity
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported scheme '{}' (expected http or https)",
                url.scheme()
            )));
        }

        if self.concurrency == 0 {
            return Err(Error::InvalidInput(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        if let Some(proxy) = &self.proxy {
            Url::parse(proxy)
                .map_err(|e| Error::InvalidInput(format!("Invalid proxy URL '{proxy}': {e}")))?;
        }

        if self.destination.file_name().is_none() {
            return Err(Error::InvalidInput(format!(
                "Destination '{}' does not name a file",
                self.destination.display()
            )));
        }

        Ok(())
    }

    /// Fingerprint of the source URL
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.url)
    }

    /// Directory holding this job's part files
    pub fn staging_dir(&self) -> PathBuf {
        let root = match &self.staging_root {
            Some(root) => root.clone(),
            None => parent_dir(&self.destination).to_path_buf(),
        };
        root.join(self.fingerprint())
    }

    /// Destination file name as used in part file names
    pub fn destination_name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Generates an output filename from the last path segment of a URL
pub fn resolve_output_filename(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}
