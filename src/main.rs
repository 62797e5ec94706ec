//! # splitdl CLI
//!
//! Command-line interface for the splitdl library.
//! Downloads one URL, splitting it into concurrent range requests when possible.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use splitdl::{DownloadJob, Downloader, Progress, Strategy, DEFAULT_MAX_RETRIES};
use tokio_util::sync::CancellationToken;

mod cli;

/// Command-line interface for splitdl
#[derive(Parser, Debug)]
#[command(name = "splitdl")]
#[command(about = "Concurrent byte-range HTTP(S) downloader with resumable part files")]
#[command(long_about = "Downloads one resource, splitting it into concurrent range requests:
  splitdl https://example.com/image.iso              # Save as ./image.iso
  splitdl https://example.com/image.iso -o disk.iso  # Custom destination
  splitdl https://example.com/image.iso -c 16 -r 5   # 16 parts, 5 retries each

Re-running an interrupted download with the same URL, destination and
concurrency only fetches the parts that are still missing.")]
#[command(version = env!("SPLITDL_VERSION"))]
struct Cli {
    /// Source URL (http or https)
    url: String,

    /// Output file path (defaults to the last segment of the URL path)
    #[arg(short, long)]
    output: Option<String>,

    /// Number of concurrent range requests (defaults to the number of CPU cores)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Retries per part after the first attempt
    #[arg(short, long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Per-attempt timeout in seconds (0 = unbounded)
    #[arg(short, long, default_value_t = 0)]
    timeout: u64,

    /// HTTP/HTTPS proxy for all requests, e.g. http://127.0.0.1:3128
    #[arg(long)]
    proxy: Option<String>,

    /// Probe the resource and print the plan without downloading
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the job described by the command line
fn build_job(cli: &Cli) -> DownloadJob {
    let mut job = DownloadJob::new(cli.url.clone())
        .with_max_retries(cli.retries)
        .with_attempt_timeout(Duration::from_secs(cli.timeout));

    if let Some(output) = &cli.output {
        job = job.with_destination(output);
    }
    if let Some(concurrency) = cli.concurrency {
        job = job.with_concurrency(concurrency);
    }
    if let Some(proxy) = &cli.proxy {
        job = job.with_proxy(proxy.clone());
    }
    job
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_filter = if cli.verbose { "splitdl=debug" } else { "splitdl=info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("splitdl v{} starting...", env!("SPLITDL_VERSION"));
    }

    let job = build_job(&cli);
    job.validate()?;
    let downloader = Downloader::for_job(&job)?;

    if cli.dry_run {
        let plan = downloader
            .plan(&job)
            .await
            .with_context(|| format!("failed to probe {}", job.url))?;
        eprintln!("🔍 [DRY RUN] Would download: {} to {}", job.url, job.destination.display());
        match plan.parts(&job) {
            Some(parts) => {
                for part in parts {
                    eprintln!("   part {:>3}: bytes {}-{}", part.index, part.start, part.end);
                }
            }
            None => eprintln!("   single stream (size: {:?})", plan.total_size),
        }
        return Ok(());
    }

    eprintln!("📁 Saving to: {}", job.destination.display());
    let progress_manager = cli::ProgressManager::new(&format!("🌐 Downloading {}", job.url));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Interrupted, keeping completed parts for resume");
            on_signal.cancel();
        }
    });

    let progress = Progress::new(Some(progress_manager.callback()));
    match downloader.run(&job, progress, cancel).await {
        Ok(report) => {
            progress_manager.finish();
            let how = match report.strategy {
                Strategy::Multipart => format!("{} part(s), {} resumed", report.parts, report.reused_parts),
                Strategy::SingleStream => "single stream".to_string(),
            };
            info!(
                "Saved {} ({} bytes, {how})",
                job.destination.display(),
                report.total_bytes
            );
            Ok(())
        }
        Err(e) => {
            progress_manager.abandon();
            Err(e).with_context(|| format!("failed to download {}", job.url))
        }
    }
}
