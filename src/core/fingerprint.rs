//! Stable identifiers for source URLs
//!
//! The fingerprint names the staging directory that holds a job's part files,
//! so it depends only on the URL string and never on the content.

/// Hex-encoded MD5 digest of the URL string (32 lowercase hex chars)
pub fn fingerprint(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}
