//! Resume support for splitdl
//!
//! Resumption is driven by what is on disk: a part file is reused only when
//! its size equals the range length encoded in its name. A small manifest in
//! the staging directory detects a remote resource that changed size between
//! runs.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::job::DownloadJob;
use crate::core::plan::{PartFile, PartSpec};

/// Manifest file kept alongside part files
pub const MANIFEST_FILE: &str = "manifest.json";

/// What the previous run planned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingManifest {
    pub url: String,
    pub total_size: u64,
    pub parts: usize,
}

/// Whether `path` holds a complete previous attempt of `expected_len` bytes.
///
/// Anything else found at `path` is removed so the range is fetched fresh.
pub async fn is_reusable(path: &Path, expected_len: u64) -> bool {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return false,
        Err(e) => {
            warn!("Cannot inspect {}: {e}", path.display());
            remove_if_present(path).await;
            return false;
        }
    };

    if metadata.is_dir() {
        warn!("Removing directory in place of part file: {}", path.display());
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            warn!("Failed to remove {}: {e}", path.display());
        }
        return false;
    }

    if metadata.len() != expected_len {
        warn!(
            "Discarding incomplete part {} ({} of {} bytes)",
            path.display(),
            metadata.len(),
            expected_len
        );
        remove_if_present(path).await;
        return false;
    }

    true
}

/// Best-effort file removal; only failures other than a missing file are logged
pub(crate) async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}

/// Remove a staging directory that holds nothing worth resuming
pub(crate) async fn remove_dir_if_empty(path: &Path) {
    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!("Cannot inspect {}: {e}", path.display());
            return;
        }
    };
    match entries.next_entry().await {
        Ok(None) => {}
        Ok(Some(_)) => {
            debug!("Keeping non-empty staging directory {}", path.display());
            return;
        }
        Err(e) => {
            warn!("Cannot inspect {}: {e}", path.display());
            return;
        }
    }
    match tokio::fs::remove_dir(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}

/// Part files currently present in a staging directory, unsorted
pub async fn list_part_files(staging: &Path) -> Result<Vec<PartFile>> {
    let mut parts = Vec::new();
    let mut entries = tokio::fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(part) = PartFile::from_path(&entry.path()) {
            parts.push(part);
        }
    }
    Ok(parts)
}

/// Make the staging directory consistent with the current plan.
///
/// Creates it if needed, wipes every part file when the manifest records a
/// different resource, removes part files that are not part of `specs`, and
/// writes the current manifest.
pub async fn prepare_staging(job: &DownloadJob, total_size: u64, specs: &[PartSpec]) -> Result<()> {
    let staging = job.staging_dir();
    tokio::fs::create_dir_all(&staging).await?;

    let manifest_path = staging.join(MANIFEST_FILE);
    let current = StagingManifest {
        url: job.url.clone(),
        total_size,
        parts: specs.len(),
    };

    let previous = read_manifest(&manifest_path).await;
    let resource_changed = previous
        .as_ref()
        .is_some_and(|m| m.url != current.url || m.total_size != current.total_size);
    if resource_changed {
        info!(
            "Remote resource changed since last run, discarding staged parts in {}",
            staging.display()
        );
    }

    let planned: HashSet<&PathBuf> = specs.iter().map(|s| &s.path).collect();
    for part in list_part_files(&staging).await? {
        if resource_changed || !planned.contains(&part.path) {
            debug!("Removing stale part file {}", part.path.display());
            remove_if_present(&part.path).await;
        }
    }

    let json = serde_json::to_vec_pretty(&current)
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
    tokio::fs::write(&manifest_path, json).await?;
    Ok(())
}

async fn read_manifest(path: &Path) -> Option<StagingManifest> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!("Ignoring unreadable manifest {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::part_specs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_not_reusable() {
        let dir = tempdir().unwrap();
        assert!(!is_reusable(&dir.path().join("part0-x.0-9"), 10).await);
    }

    #[tokio::test]
    async fn test_complete_file_is_reusable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part0-x.0-9");
        std::fs::write(&path, [7u8; 10]).unwrap();
        assert!(is_reusable(&path, 10).await);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_size_mismatch_is_deleted() {
        let dir = tempdir().unwrap();
        let short = dir.path().join("part0-x.0-9");
        let long = dir.path().join("part1-x.10-19");
        std::fs::write(&short, [1u8; 4]).unwrap();
        std::fs::write(&long, [1u8; 11]).unwrap();

        assert!(!is_reusable(&short, 10).await);
        assert!(!is_reusable(&long, 10).await);
        assert!(!short.exists());
        assert!(!long.exists());
    }

    #[tokio::test]
    async fn test_directory_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part0-x.0-9");
        std::fs::create_dir(&path).unwrap();
        assert!(!is_reusable(&path, 10).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_prepare_staging_removes_foreign_partition() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("https://example.com/f.bin")
            .with_destination(dir.path().join("f.bin"))
            .with_concurrency(4);
        let old = part_specs(&job, 1000);
        prepare_staging(&job, 1000, &old).await.unwrap();
        for spec in &old {
            std::fs::write(&spec.path, vec![0u8; spec.range_len() as usize]).unwrap();
        }

        let job = job.with_concurrency(2);
        let new = part_specs(&job, 1000);
        prepare_staging(&job, 1000, &new).await.unwrap();

        // part0 of the 4-way split is not part0 of the 2-way split
        for spec in &old {
            assert!(!spec.path.exists(), "{} should be gone", spec.path.display());
        }
        let manifest: StagingManifest = serde_json::from_slice(
            &std::fs::read(job.staging_dir().join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.parts, 2);
    }

    #[tokio::test]
    async fn test_prepare_staging_keeps_matching_parts() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("https://example.com/f.bin")
            .with_destination(dir.path().join("f.bin"))
            .with_concurrency(2);
        let specs = part_specs(&job, 1000);
        prepare_staging(&job, 1000, &specs).await.unwrap();
        std::fs::write(&specs[0].path, vec![0u8; 500]).unwrap();

        prepare_staging(&job, 1000, &specs).await.unwrap();
        assert!(specs[0].path.exists());
    }

    #[tokio::test]
    async fn test_prepare_staging_wipes_when_size_changes() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("https://example.com/f.bin")
            .with_destination(dir.path().join("f.bin"))
            .with_concurrency(1);

        let first = part_specs(&job, 1000);
        prepare_staging(&job, 1000, &first).await.unwrap();
        std::fs::write(&first[0].path, vec![0u8; 1000]).unwrap();

        // Same partition shape is impossible with a new size, but a stale file
        // at a colliding name must still go.
        let collide = job.staging_dir().join("part0-f_bin.0-1999");
        std::fs::write(&collide, vec![0u8; 2000]).unwrap();
        let second = part_specs(&job, 2000);
        assert_eq!(second[0].path, collide);
        prepare_staging(&job, 2000, &second).await.unwrap();

        assert!(!first[0].path.exists());
        assert!(!collide.exists());
    }

    #[tokio::test]
    async fn test_cleanup_helpers() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("stream-blob");
        std::fs::write(&file, b"partial").unwrap();

        remove_if_present(&file).await;
        assert!(!file.exists());
        // Already gone: nothing to do
        remove_if_present(&file).await;

        let kept = dir.path().join("kept");
        std::fs::create_dir(&kept).unwrap();
        std::fs::write(kept.join("part0-blob.0-9"), [0u8; 10]).unwrap();
        remove_dir_if_empty(&kept).await;
        assert!(kept.exists());

        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        remove_dir_if_empty(&empty).await;
        assert!(!empty.exists());
        remove_dir_if_empty(&empty).await;
    }
}
