//! Core library modules for splitdl
//!
//! This module contains the transfer engine: planning, resumption, part
//! workers, coordination, and merging.

pub mod downloader;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod merge;
pub mod plan;
pub mod resume;
pub mod stream;
pub mod worker;

// Re-export main types for internal use
pub use downloader::{Downloader, Strategy, TransferReport};
pub use job::{resolve_output_filename, DownloadJob};
