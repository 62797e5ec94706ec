//! Part workers for splitdl
//!
//! A worker fetches one byte range into its own part file. Every attempt
//! starts from scratch; failures are retried with exponential backoff until
//! the job's retry budget is spent.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::job::DownloadJob;
use crate::core::plan::PartSpec;
use crate::core::resume::remove_if_present;
use crate::core::stream::{create_http_stream, Progress, COPY_BUFFER_SIZE};

/// Backoff exponent cap, keeps the shift and multiply in range
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Terminal state of one part
#[derive(Debug)]
pub enum PartOutcome {
    Completed,
    Failed(Error),
}

/// What a worker reports back to the coordinator
#[derive(Debug)]
pub struct PartResult {
    pub index: usize,
    pub attempts: u32,
    pub outcome: PartOutcome,
}

impl PartResult {
    pub fn into_result(self) -> Result<()> {
        match self.outcome {
            PartOutcome::Completed => Ok(()),
            PartOutcome::Failed(err) => Err(err),
        }
    }
}

/// Delay before retry number `attempt + 1`
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Fetches ranges (or the whole body) for one job
pub struct PartWorker<'a> {
    client: &'a Client,
    job: &'a DownloadJob,
    progress: &'a Progress,
    cancel: &'a CancellationToken,
}

impl<'a> PartWorker<'a> {
    pub fn new(
        client: &'a Client,
        job: &'a DownloadJob,
        progress: &'a Progress,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            job,
            progress,
            cancel,
        }
    }

    /// Fetch one range into its part file, retrying per the job's budget
    pub async fn fetch(&self, spec: &PartSpec) -> PartResult {
        debug!("Part {} starting ({})", spec.index, spec.range_header());
        let (attempts, result) = self
            .run_with_retry(spec.index, &spec.path, || self.fetch_range_once(spec))
            .await;

        let outcome = match result {
            Ok(()) => {
                debug!("Part {} complete after {attempts} attempt(s)", spec.index);
                PartOutcome::Completed
            }
            Err(err) => PartOutcome::Failed(err),
        };
        PartResult {
            index: spec.index,
            attempts,
            outcome,
        }
    }

    /// Fetch the whole resource with a plain GET into `path`
    pub async fn fetch_whole(&self, path: &Path) -> Result<u64> {
        let (_, result) = self
            .run_with_retry(0, path, || self.fetch_whole_once(path))
            .await;
        result
    }

    /// Bounded retry loop shared by ranged and whole-body fetches.
    ///
    /// Returns the number of attempts made alongside the outcome.
    async fn run_with_retry<F, Fut, T>(&self, part: usize, path: &Path, operation: F) -> (u32, Result<T>)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return (attempt + 1, Err(Error::Cancelled)),
                result = with_timeout(part, self.job.attempt_timeout, operation()) => result,
            };

            match result {
                Ok(value) => return (attempt + 1, Ok(value)),
                Err(err) if err.is_retryable() && attempt < self.job.max_retries => {
                    remove_if_present(path).await;
                    let delay = backoff_delay(self.job.retry_base_delay, attempt);
                    warn!(
                        "⚠️  Part {part} attempt {} failed: {err}. Retrying in {delay:?}...",
                        attempt + 1
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return (attempt + 1, Err(Error::Cancelled)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    remove_if_present(path).await;
                    let attempts = attempt + 1;
                    return (
                        attempts,
                        Err(Error::RetryExhausted {
                            part,
                            attempts,
                            last: Box::new(err),
                        }),
                    );
                }
                Err(err) => return (attempt + 1, Err(err)),
            }
        }
    }

    async fn fetch_range_once(&self, spec: &PartSpec) -> Result<()> {
        let response = self
            .client
            .get(&self.job.url)
            .header(RANGE, spec.range_header())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(Error::RangeRejected {
                part: spec.index,
                status: status.as_u16(),
            });
        }

        let written = self.stream_to_file(response, &spec.path).await?;
        if written != spec.range_len() {
            return Err(Error::HttpError(format!(
                "Part {} received {written} of {} bytes",
                spec.index,
                spec.range_len()
            )));
        }
        Ok(())
    }

    async fn fetch_whole_once(&self, path: &Path) -> Result<u64> {
        let response = self.client.get(&self.job.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!(
                "GET {} returned {status}",
                self.job.url
            )));
        }

        let expected = response.content_length();
        let written = self.stream_to_file(response, path).await?;
        if let Some(expected) = expected {
            if written != expected {
                return Err(Error::HttpError(format!(
                    "Received {written} of {expected} bytes"
                )));
            }
        }
        Ok(written)
    }

    /// Stream a response body into a freshly truncated file, reporting progress
    async fn stream_to_file(&self, response: reqwest::Response, path: &Path) -> Result<u64> {
        let mut stream = create_http_stream(response);
        let mut file = tokio::fs::File::create(path).await?;
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| Error::NetworkError(format!("Stream read error: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            file.write_all(&buffer[..bytes_read]).await?;
            written += bytes_read as u64;
            self.progress.advance(bytes_read as u64);
        }

        file.flush().await?;
        Ok(written)
    }
}

async fn with_timeout<Fut, T>(part: usize, timeout: Option<Duration>, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::AttemptTimeout { part, timeout })?,
        None => fut.await,
    }
}
