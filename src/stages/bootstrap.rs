//! Bootstrap toolchain acquisition.
//!
//! Building Go needs an existing Go. A release archive for the host is
//! downloaded once and unpacked into the bootstrap directory; later runs
//! reuse whatever is there without touching the network.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::artifact::{sha256_file, tarball, zipfile, ARCHIVE_ROOT};
use crate::net::HttpClient;
use crate::platform::{ArchiveFormat, Platform};

/// What [`ensure_bootstrap`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    AlreadyPresent,
    Downloaded { url: String, sha256: String },
}

/// Release download for one bootstrap toolchain.
#[derive(Debug, Clone)]
pub struct BootstrapRequest<'a> {
    pub version: &'a str,
    pub host: Platform,
    pub download_base: &'a str,
    pub expected_sha256: Option<&'a str>,
}

impl BootstrapRequest<'_> {
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.download_base.trim_end_matches('/'),
            self.host.archive_file_name(self.version)
        )
    }
}

/// Make sure `bootstrap_dir` holds a toolchain, downloading one if the
/// directory does not exist. An existing directory is trusted as is.
pub fn ensure_bootstrap(
    client: &HttpClient,
    bootstrap_dir: &Path,
    request: &BootstrapRequest<'_>,
) -> Result<BootstrapOutcome> {
    if bootstrap_dir.exists() {
        info!(dir = %bootstrap_dir.display(), "bootstrap toolchain present");
        return Ok(BootstrapOutcome::AlreadyPresent);
    }

    let parent = parent_dir(bootstrap_dir);
    fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    let staging = tempfile::Builder::new()
        .prefix(".go-bootstrap-")
        .tempdir_in(&parent)
        .with_context(|| format!("creating staging directory in {}", parent.display()))?;

    let url = request.url();
    let archive = staging.path().join(request.host.archive_file_name(request.version));
    info!(url = %url, "downloading bootstrap toolchain");
    client
        .download(&url, &archive)
        .with_context(|| format!("downloading bootstrap toolchain from {url}"))?;

    let (sha256, size) = sha256_file(&archive)?;
    if let Some(expected) = request.expected_sha256 {
        if !sha256.eq_ignore_ascii_case(expected) {
            bail!(
                "bootstrap archive checksum mismatch for {}: expected {}, got {}",
                url,
                expected,
                sha256
            );
        }
    }
    info!(size, sha256 = %sha256, "bootstrap archive downloaded");

    let extract_dir = staging.path().join("extract");
    match request.host.archive_format() {
        ArchiveFormat::Zip => zipfile::extract_zip(&archive, &extract_dir)?,
        ArchiveFormat::TarGz => tarball::unpack_tar_gz(&archive, &extract_dir)?,
    }
    fs::remove_file(&archive)
        .with_context(|| format!("Failed to remove {}", archive.display()))?;

    let wrapper = extract_dir.join(ARCHIVE_ROOT);
    let root = if wrapper.is_dir() { wrapper } else { extract_dir };
    fs::rename(&root, bootstrap_dir).with_context(|| {
        format!(
            "Failed to move extracted toolchain {} to {}",
            root.display(),
            bootstrap_dir.display()
        )
    })?;

    info!(dir = %bootstrap_dir.display(), "bootstrap toolchain ready");
    Ok(BootstrapOutcome::Downloaded { url, sha256 })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
