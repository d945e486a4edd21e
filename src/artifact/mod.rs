//! Filesystem and archive plumbing shared by the pipeline stages.
//!
//! - [`filesystem`] - Robust directory removal and tree moves
//! - [`mirror`] - Directory mirroring (robocopy or in-process)
//! - [`tarball`] - tar.gz creation, extraction and mode rewriting
//! - [`zipfile`] - zip creation and extraction
//! - [`permissions`] - Permission-fix strategies for produced tarballs

pub mod filesystem;
pub mod mirror;
pub mod permissions;
pub mod tarball;
pub mod zipfile;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Top-level folder name inside every distributable archive.
pub const ARCHIVE_ROOT: &str = "go";

/// Hex sha256 and size of a file.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    let sha = format!("{:x}", hasher.finalize());
    Ok((sha, size))
}
