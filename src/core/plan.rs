//! Transfer planning for splitdl
//!
//! Probes the resource with HEAD, decides between a single stream and a
//! multipart transfer, and partitions `[0, size)` into inclusive byte ranges.
//! Part file names carry their range so resumption needs no external state.

use std::path::{Path, PathBuf};

use log::{debug, info};
use reqwest::{Client, StatusCode};

use crate::core::error::{Error, Result};
use crate::core::job::DownloadJob;

/// Result of the metadata probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    /// Advertised Content-Length, if any
    pub total_size: Option<u64>,

    /// Server advertised `Accept-Ranges: bytes`
    pub supports_ranges: bool,
}

impl TransferPlan {
    /// Multipart only with known size above the threshold and range support
    pub fn is_multipart(&self, threshold: u64) -> bool {
        self.supports_ranges && self.total_size.is_some_and(|size| size > threshold)
    }

    /// Part specs for this plan, or `None` for a single-stream transfer
    pub fn parts(&self, job: &DownloadJob) -> Option<Vec<PartSpec>> {
        if !self.is_multipart(job.multipart_threshold) {
            return None;
        }
        let size = self.total_size?;
        Some(part_specs(job, size))
    }
}

/// One byte range assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSpec {
    /// 0-based, dense
    pub index: usize,

    /// First byte, inclusive
    pub start: u64,

    /// Last byte, inclusive
    pub end: u64,

    /// Part file inside the staging directory
    pub path: PathBuf,
}

impl PartSpec {
    /// Number of bytes in the range
    pub fn range_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Issue the HEAD probe and derive the plan
pub async fn probe(client: &Client, url: &str) -> Result<TransferPlan> {
    let response = client
        .head(url)
        .send()
        .await
        .map_err(|e| Error::ProbeError(format!("HEAD {url} failed: {e}")))?;

    let status = response.status();
    if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::NOT_IMPLEMENTED {
        info!("Server does not support HEAD ({status}), falling back to a single stream");
        return Ok(TransferPlan {
            total_size: None,
            supports_ranges: false,
        });
    }
    if !status.is_success() {
        return Err(Error::ProbeError(format!("HEAD {url} returned {status}")));
    }

    let headers = response.headers();
    let total_size = headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let supports_ranges = headers
        .get(reqwest::header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("bytes"));

    debug!("Probe {url}: size={total_size:?} ranges={supports_ranges}");

    Ok(TransferPlan {
        total_size,
        supports_ranges,
    })
}

/// Split `[0, total_size)` into contiguous inclusive ranges.
///
/// Each range gets `total_size / parts` bytes and the last absorbs the
/// remainder. The part count is capped at `total_size` so no range is empty.
pub fn partition(total_size: u64, concurrency: usize) -> Vec<(u64, u64)> {
    if total_size == 0 {
        return Vec::new();
    }
    let parts = (concurrency.max(1) as u64).min(total_size);
    let chunk_size = total_size / parts;

    (0..parts)
        .map(|i| {
            let start = i * chunk_size;
            let end = if i == parts - 1 {
                total_size - 1
            } else {
                start + chunk_size - 1
            };
            (start, end)
        })
        .collect()
}

/// Full part specs, including part file paths, for a job of known size
pub fn part_specs(job: &DownloadJob, total_size: u64) -> Vec<PartSpec> {
    let staging = job.staging_dir();
    let name = job.destination_name();

    partition(total_size, job.concurrency)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| PartSpec {
            index,
            start,
            end,
            path: staging.join(part_file_name(index, &name, start, end)),
        })
        .collect()
}

/// Replace characters that would make the encoded suffix ambiguous
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// `part<index>-<sanitized name>.<start>-<end>`
pub fn part_file_name(index: usize, destination_name: &str, start: u64, end: u64) -> String {
    format!(
        "part{index}-{}.{start}-{end}",
        sanitize_file_name(destination_name)
    )
}

/// Recover `(index, start, end)` from a part file name
pub fn parse_part_file_name(name: &str) -> Option<(usize, u64, u64)> {
    let rest = name.strip_prefix("part")?;
    let (index, rest) = rest.split_once('-')?;
    let (_, range) = rest.rsplit_once('.')?;
    let (start, end) = range.split_once('-')?;

    let index = index.parse().ok()?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = end.parse().ok()?;
    (start <= end).then_some((index, start, end))
}

/// Parsed view of a part file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFile {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub path: PathBuf,
}

impl PartFile {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (index, start, end) = parse_part_file_name(name)?;
        Some(Self {
            index,
            start,
            end,
            path: path.to_path_buf(),
        })
    }

    pub fn expected_len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn assert_exact_partition(size: u64, concurrency: usize) {
        let ranges = partition(size, concurrency);
        assert_eq!(ranges.first().map(|r| r.0), Some(0));
        assert_eq!(ranges.last().map(|r| r.1), Some(size - 1));
        for pair in ranges.windows(2) {
            assert_eq!(pair[1].0, pair[0].1 + 1, "gap or overlap at {pair:?}");
        }
        let total: u64 = ranges.iter().map(|(s, e)| e - s + 1).sum();
        assert_eq!(total, size);
    }

    #[test]
    fn test_partition_one_million_four_ways() {
        assert_eq!(
            partition(1_000_000, 4),
            vec![
                (0, 249_999),
                (250_000, 499_999),
                (500_000, 749_999),
                (750_000, 999_999)
            ]
        );
    }

    #[test]
    fn test_partition_last_part_absorbs_remainder() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![(0, 2), (3, 5), (6, 9)]);
    }

    #[test]
    fn test_partition_is_gapless_for_many_inputs() {
        for size in [1u64, 2, 7, 100, 1023, 102_401, 1_000_003] {
            for concurrency in [1usize, 2, 3, 4, 7, 16, 64] {
                assert_exact_partition(size, concurrency);
            }
        }
    }

    #[test]
    fn test_partition_caps_parts_at_size() {
        assert_eq!(partition(3, 8), vec![(0, 0), (1, 1), (2, 2)]);
        assert!(partition(0, 4).is_empty());
    }

    #[test]
    fn test_is_multipart_rules() {
        let plan = TransferPlan {
            total_size: Some(200 * 1024),
            supports_ranges: true,
        };
        assert!(plan.is_multipart(100 * 1024));
        assert!(!plan.is_multipart(200 * 1024));

        let no_ranges = TransferPlan {
            supports_ranges: false,
            ..plan
        };
        assert!(!no_ranges.is_multipart(100 * 1024));

        let unknown = TransferPlan {
            total_size: None,
            supports_ranges: true,
        };
        assert!(!unknown.is_multipart(0));
    }

    #[test]
    fn test_part_file_name_round_trip() {
        let name = part_file_name(12, "archive.tar.gz", 1000, 1999);
        assert_eq!(name, "part12-archive_tar_gz.1000-1999");
        assert_eq!(parse_part_file_name(&name), Some((12, 1000, 1999)));
    }

    #[test]
    fn test_parse_part_file_name_rejects_foreign_files() {
        assert_eq!(parse_part_file_name("manifest.json"), None);
        assert_eq!(parse_part_file_name("partX-a.1-2"), None);
        assert_eq!(parse_part_file_name("part1-a.9-2"), None);
        assert_eq!(parse_part_file_name("part1-a"), None);
    }

    #[test]
    fn test_part_specs_paths_live_in_staging() {
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new("https://example.com/x.bin")
            .with_destination(dir.path().join("x.bin"))
            .with_concurrency(3);
        let specs = part_specs(&job, 300);
        assert_eq!(specs.len(), 3);
        for (i, spec) in specs.iter().enumerate() {
            assert_eq!(spec.index, i);
            assert_eq!(spec.range_len(), 100);
            assert_eq!(spec.path.parent().unwrap(), job.staging_dir());
            let parsed = PartFile::from_path(&spec.path).unwrap();
            assert_eq!((parsed.index, parsed.start, parsed.end), (i, spec.start, spec.end));
        }
        assert_eq!(specs[1].range_header(), "bytes=100-199");
    }

    #[tokio::test]
    async fn test_probe_reads_length_and_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "500000")
                    .insert_header("accept-ranges", "bytes"),
            )
            .mount(&server)
            .await;

        let plan = probe(&Client::new(), &format!("{}/file.bin", server.uri()))
            .await
            .unwrap();
        assert_eq!(plan.total_size, Some(500_000));
        assert!(plan.supports_ranges);
    }

    #[tokio::test]
    async fn test_probe_without_accept_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-length", "500000"))
            .mount(&server)
            .await;

        let plan = probe(&Client::new(), &format!("{}/file.bin", server.uri()))
            .await
            .unwrap();
        assert!(!plan.supports_ranges);
        assert!(!plan.is_multipart(100 * 1024));
    }

    #[tokio::test]
    async fn test_probe_not_found_is_probe_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = probe(&Client::new(), &format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProbeError(_)), "got {err:?}");
    }
}
