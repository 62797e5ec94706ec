//! Transfer coordination for splitdl
//!
//! Probes the resource, skips ranges already on disk, runs one worker per
//! remaining range, and merges only when every part has completed.

use std::time::Duration;

use futures::StreamExt;
use log::{error, info, warn};
use reqwest::{Client, ClientBuilder, Proxy};
use tokio_util::sync::CancellationToken;

use crate::core::error::{Error, Result};
use crate::core::job::DownloadJob;
use crate::core::merge::merge;
use crate::core::plan::{probe, sanitize_file_name, PartSpec, TransferPlan};
use crate::core::resume::{is_reusable, prepare_staging, remove_dir_if_empty, remove_if_present};
use crate::core::stream::Progress;
use crate::core::worker::{PartOutcome, PartWorker};

/// How a job was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SingleStream,
    Multipart,
}

/// Summary of a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub strategy: Strategy,
    pub total_bytes: u64,
    /// Parts planned (1 for a single stream)
    pub parts: usize,
    /// Parts taken from a previous run instead of fetched
    pub reused_parts: usize,
}

/// Builds the HTTP client used for every request of a job
fn build_client(proxy: Option<&str>) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .tcp_keepalive(Duration::from_secs(60))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(20)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(format!("splitdl/{}", env!("SPLITDL_VERSION")));

    if let Some(proxy) = proxy {
        let proxy = Proxy::all(proxy)
            .map_err(|e| Error::InvalidInput(format!("Invalid proxy '{proxy}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {e}")))
}

/// Runs download jobs; owns one HTTP client
pub struct Downloader {
    client: Client,
}

impl Downloader {
    /// Create a downloader using the job's proxy setting
    pub fn for_job(job: &DownloadJob) -> Result<Self> {
        Ok(Self {
            client: build_client(job.proxy.as_deref())?,
        })
    }

    /// Create a downloader with a caller-supplied client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Probe the resource without transferring anything
    pub async fn plan(&self, job: &DownloadJob) -> Result<TransferPlan> {
        job.validate()?;
        probe(&self.client, &job.url).await
    }

    /// Run a job to completion.
    ///
    /// Either the destination holds the complete resource, or an error is
    /// returned and no destination is written. Staging files survive
    /// failures and cancellation so the next run can resume.
    pub async fn run(
        &self,
        job: &DownloadJob,
        progress: Progress,
        cancel: CancellationToken,
    ) -> Result<TransferReport> {
        let plan = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            plan = self.plan(job) => plan?,
        };

        match (plan.parts(job), plan.total_size) {
            (Some(specs), Some(total_size)) => {
                info!(
                    "Multipart transfer: {total_size} bytes in {} part(s)",
                    specs.len()
                );
                self.run_multipart(job, total_size, specs, progress, cancel)
                    .await
            }
            _ => {
                info!(
                    "Single-stream transfer (size: {:?}, ranges: {})",
                    plan.total_size, plan.supports_ranges
                );
                self.run_single(job, plan, progress, cancel).await
            }
        }
    }

    async fn run_multipart(
        &self,
        job: &DownloadJob,
        total_size: u64,
        specs: Vec<PartSpec>,
        progress: Progress,
        cancel: CancellationToken,
    ) -> Result<TransferReport> {
        progress.set_total(total_size);
        prepare_staging(job, total_size, &specs).await?;

        let mut pending = Vec::with_capacity(specs.len());
        for spec in &specs {
            if is_reusable(&spec.path, spec.range_len()).await {
                progress.advance(spec.range_len());
            } else {
                pending.push(spec);
            }
        }
        let reused_parts = specs.len() - pending.len();
        if reused_parts > 0 {
            info!("Resuming: {reused_parts} of {} part(s) already complete", specs.len());
        }

        let worker = PartWorker::new(&self.client, job, &progress, &cancel);
        let concurrency = pending.len().max(1);
        let mut results = futures::stream::iter(pending)
            .map(|spec| worker.fetch(spec))
            .buffer_unordered(concurrency);

        // First terminal failure aborts the job; dropping the stream drops
        // every in-flight request.
        while let Some(result) = results.next().await {
            if let PartOutcome::Failed(err) = result.outcome {
                error!("Part {} failed after {} attempt(s)", result.index, result.attempts);
                return Err(err);
            }
        }
        drop(results);

        let written = merge(&job.staging_dir(), &job.destination, total_size).await?;
        progress.finish();

        Ok(TransferReport {
            strategy: Strategy::Multipart,
            total_bytes: written,
            parts: specs.len(),
            reused_parts,
        })
    }

    async fn run_single(
        &self,
        job: &DownloadJob,
        plan: TransferPlan,
        progress: Progress,
        cancel: CancellationToken,
    ) -> Result<TransferReport> {
        progress.set_total(plan.total_size.unwrap_or(0));

        let staging = job.staging_dir();
        tokio::fs::create_dir_all(&staging).await?;
        let temp = staging.join(format!("stream-{}", sanitize_file_name(&job.destination_name())));

        let worker = PartWorker::new(&self.client, job, &progress, &cancel);
        let written = match worker.fetch_whole(&temp).await {
            Ok(written) => written,
            Err(err) => {
                // A single stream restarts from byte 0, so nothing is kept
                remove_if_present(&temp).await;
                remove_dir_if_empty(&staging).await;
                return Err(err);
            }
        };

        move_into_place(&temp, &job.destination).await?;
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!("Failed to clean up {}: {e}", staging.display());
        }
        progress.finish();

        Ok(TransferReport {
            strategy: Strategy::SingleStream,
            total_bytes: written,
            parts: 1,
            reused_parts: 0,
        })
    }
}

/// Rename, falling back to copy when staging lives on another filesystem
async fn move_into_place(from: &std::path::Path, to: &std::path::Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(from, to).await {
        remove_if_present(to).await;
        return Err(Error::MergeError(format!(
            "moving download into {}: {e}",
            to.display()
        )));
    }
    tokio::fs::remove_file(from).await?;
    Ok(())
}
