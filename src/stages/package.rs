//! Packaging.
//!
//! A staged output directory becomes `<version>.<os>-<arch>.<zip|tar.gz>`
//! in the output root, with all content under a top-level `go/` folder, plus
//! a `<archive>.sha256` checksum file.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::artifact::mirror::Mirror;
use crate::artifact::permissions::{fix_tar_permissions, HelperScript, PermissionFix};
use crate::artifact::{sha256_file, tarball, zipfile, ARCHIVE_ROOT};
use crate::platform::{ArchiveFormat, Platform};

#[derive(Debug, Clone)]
pub struct PackageRequest<'a> {
    pub version: &'a str,
    pub target: Platform,
    pub mirror: &'a Mirror,
    pub permission_fix: &'a [PermissionFix],
    pub helper: Option<&'a HelperScript>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    pub sha256: String,
    pub size: u64,
    /// Strategy that fixed tarball permissions; `None` for zip archives.
    pub permission_fix: Option<PermissionFix>,
}

/// Package `out_dir` into an archive in `output_root`, replacing any archive
/// of the same name.
pub fn package_output(
    out_dir: &Path,
    output_root: &Path,
    request: &PackageRequest<'_>,
) -> Result<PackageReport> {
    fs::create_dir_all(output_root)
        .with_context(|| format!("Failed to create directory: {}", output_root.display()))?;
    let staging = tempfile::Builder::new()
        .prefix(".package-")
        .tempdir_in(output_root)
        .with_context(|| format!("creating staging directory in {}", output_root.display()))?;
    let staged_root = staging.path().join(ARCHIVE_ROOT);
    request
        .mirror
        .mirror(out_dir, &staged_root, &[])
        .with_context(|| format!("staging {} for packaging", out_dir.display()))?;

    let format = request.target.archive_format();
    let archive = output_root.join(request.target.archive_file_name(request.version));
    if archive.exists() {
        fs::remove_file(&archive)
            .with_context(|| format!("Failed to remove old archive {}", archive.display()))?;
    }

    info!(archive = %archive.display(), "creating archive");
    let permission_fix = match format {
        ArchiveFormat::Zip => {
            zipfile::create_zip(&staged_root, &archive, ARCHIVE_ROOT)?;
            None
        }
        ArchiveFormat::TarGz => {
            tarball::create_tar_gz(&staged_root, &archive, ARCHIVE_ROOT)?;
            fix_tar_permissions(
                &archive,
                request.permission_fix,
                request.helper,
                ARCHIVE_ROOT,
            )?
        }
    };

    let (sha256, size) = sha256_file(&archive)?;
    write_checksum_file(&archive, &sha256)?;
    staging
        .close()
        .with_context(|| format!("removing packaging staging for {}", archive.display()))?;

    info!(archive = %archive.display(), size, sha256 = %sha256, "archive created");
    Ok(PackageReport {
        archive,
        format,
        sha256,
        size,
        permission_fix,
    })
}

/// `<archive>.sha256` in `sha256sum` format.
pub fn checksum_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".sha256");
    PathBuf::from(name)
}

fn write_checksum_file(archive: &Path, sha256: &str) -> Result<()> {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let path = checksum_path(archive);
    fs::write(&path, format!("{sha256}  {file_name}\n"))
        .with_context(|| format!("Failed to write {}", path.display()))
}
