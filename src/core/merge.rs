//! Reassembly of part files into the destination
//!
//! Parts are ordered by the numeric index in their file name, never by the
//! file name itself, and must tile `[0, total_size)` exactly before a single
//! byte of the destination is written.

use std::path::Path;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;

use crate::core::error::{Error, Result};
use crate::core::plan::PartFile;
use crate::core::resume::{list_part_files, remove_if_present};

/// Concatenate the part files in `staging` into `destination`.
///
/// On success the staging directory is removed. On failure it is left in
/// place for a later run, and a half-written destination is deleted.
pub async fn merge(staging: &Path, destination: &Path, total_size: u64) -> Result<u64> {
    let mut parts = list_part_files(staging)
        .await
        .map_err(|e| Error::MergeError(format!("cannot list {}: {e}", staging.display())))?;
    parts.sort_by_key(|p| p.index);

    check_layout(&parts, total_size).await?;

    info!(
        "Merging {} part(s) into {}",
        parts.len(),
        destination.display()
    );
    match concatenate(&parts, destination).await {
        Ok(written) => {
            if let Err(e) = tokio::fs::remove_dir_all(staging).await {
                warn!("Failed to clean up {}: {e}", staging.display());
            }
            Ok(written)
        }
        Err(e) => {
            remove_if_present(destination).await;
            Err(Error::MergeError(format!(
                "writing {}: {e}",
                destination.display()
            )))
        }
    }
}

/// Parts must be dense from index 0, contiguous, complete, and sum to the size
async fn check_layout(parts: &[PartFile], total_size: u64) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::MergeError("no part files to merge".to_string()));
    }

    let mut next_start = 0u64;
    for (position, part) in parts.iter().enumerate() {
        if part.index != position {
            return Err(Error::MergeError(format!(
                "missing part {position} (found part {})",
                part.index
            )));
        }
        if part.start != next_start {
            return Err(Error::MergeError(format!(
                "part {} starts at {} but {} was expected",
                part.index, part.start, next_start
            )));
        }

        let actual = tokio::fs::metadata(&part.path)
            .await
            .map_err(|e| Error::MergeError(format!("{}: {e}", part.path.display())))?
            .len();
        if actual != part.expected_len() {
            return Err(Error::MergeError(format!(
                "part {} holds {actual} of {} bytes",
                part.index,
                part.expected_len()
            )));
        }
        next_start = part.end + 1;
    }

    if next_start != total_size {
        return Err(Error::MergeError(format!(
            "parts cover {next_start} of {total_size} bytes"
        )));
    }
    Ok(())
}

async fn concatenate(parts: &[PartFile], destination: &Path) -> std::io::Result<u64> {
    let mut output = tokio::fs::File::create(destination).await?;
    let mut written = 0u64;

    for part in parts {
        let mut input = tokio::fs::File::open(&part.path).await?;
        let copied = tokio::io::copy(&mut input, &mut output).await?;
        debug!("Appended part {} ({copied} bytes)", part.index);
        written += copied;
    }

    output.flush().await?;
    output.sync_all().await?;
    Ok(written)
}
