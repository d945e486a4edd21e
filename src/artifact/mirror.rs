//! Directory mirroring.
//!
//! A mirror makes the destination tree match the source exactly: files are
//! added or overwritten and entries missing from the source are deleted.
//! Entries whose name is in the exclusion list are neither copied nor
//! deleted.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::{DirEntry, WalkDir};

use crate::process::Cmd;

/// Robocopy exit codes 0-7 mean "done" (with various amounts of copying
/// and extra-file deletion); 8 and above mean at least one failure.
pub const ROBOCOPY_OK_CODES: RangeInclusive<i32> = 0..=7;

/// How directories are mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mirror {
    /// In-process walk and copy.
    Native,
    /// External `robocopy /MIR`.
    Robocopy { program: PathBuf },
}

impl Mirror {
    /// Robocopy on Windows hosts, in-process elsewhere.
    pub fn host_default() -> Self {
        if cfg!(windows) {
            Mirror::Robocopy {
                program: PathBuf::from("robocopy"),
            }
        } else {
            Mirror::Native
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mirror::Native => "native",
            Mirror::Robocopy { .. } => "robocopy",
        }
    }

    /// External program this mirror needs on PATH, if any.
    pub fn required_tool(&self) -> Option<&Path> {
        match self {
            Mirror::Native => None,
            Mirror::Robocopy { program } => Some(program),
        }
    }

    /// Make `dst` an exact copy of `src`, skipping entries named in `exclude`.
    pub fn mirror(&self, src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
        if !src.is_dir() {
            bail!("mirror source is not a directory: '{}'", src.display());
        }
        match self {
            Mirror::Native => native_mirror(src, dst, exclude),
            Mirror::Robocopy { program } => robocopy_mirror(program, src, dst, exclude),
        }
    }

    /// Empty `target` by mirroring an empty directory over it.
    pub fn purge(&self, target: &Path) -> Result<()> {
        let empty = tempfile::Builder::new()
            .prefix(".go-builder-empty-")
            .tempdir()
            .context("creating empty directory for purge")?;
        self.mirror(empty.path(), target, &[])
    }
}

impl FromStr for Mirror {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(Mirror::Native),
            "robocopy" => Ok(Mirror::Robocopy {
                program: PathBuf::from("robocopy"),
            }),
            other => bail!("unsupported mirror '{}'; expected 'native' or 'robocopy'", other),
        }
    }
}

fn robocopy_mirror(program: &Path, src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    let mut cmd = Cmd::new(program)
        .arg_path(src)
        .arg_path(dst)
        .arg("/MIR");
    if !exclude.is_empty() {
        cmd = cmd.arg("/XD").args(exclude);
    }
    cmd.args(["/R:2", "/W:1", "/NFL", "/NDL", "/NJH", "/NJS", "/NP"])
        .ok_codes(ROBOCOPY_OK_CODES)
        .error_msg(&format!(
            "mirroring '{}' to '{}' failed",
            src.display(),
            dst.display()
        ))
        .run()?;
    Ok(())
}

fn is_excluded(entry: &DirEntry, exclude: &[&str]) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| exclude.contains(&name))
}

fn native_mirror(src: &Path, dst: &Path, exclude: &[&str]) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    let mut present: HashSet<PathBuf> = HashSet::new();
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e, exclude));

    for entry in walker {
        let entry = entry.with_context(|| format!("walking '{}'", src.display()))?;
        let rel = entry.path().strip_prefix(src)?.to_path_buf();
        let target = dst.join(&rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if target.is_symlink() || target.is_file() {
                fs::remove_file(&target)
                    .with_context(|| format!("Failed to replace {}", target.display()))?;
            }
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else {
            if target.is_dir() && !target.is_symlink() {
                fs::remove_dir_all(&target)
                    .with_context(|| format!("Failed to replace {}", target.display()))?;
            }
            if file_type.is_symlink() {
                copy_symlink(entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target).with_context(|| {
                    format!(
                        "Failed to copy {} to {}",
                        entry.path().display(),
                        target.display()
                    )
                })?;
            }
        }
        present.insert(rel);
    }

    delete_extras(dst, &present, exclude)
}

fn delete_extras(dst: &Path, present: &HashSet<PathBuf>, exclude: &[&str]) -> Result<()> {
    let mut extras = Vec::new();
    let mut walker = WalkDir::new(dst).min_depth(1).follow_links(false).into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("walking '{}'", dst.display()))?;
        let is_dir = entry.file_type().is_dir();
        if is_excluded(&entry, exclude) || !present.contains(entry.path().strip_prefix(dst)?) {
            if is_dir {
                walker.skip_current_dir();
            }
            if !is_excluded(&entry, exclude) {
                extras.push((entry.path().to_path_buf(), is_dir));
            }
        }
    }

    for (path, is_dir) in extras {
        if is_dir {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to delete extra {}", path.display()))?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete extra {}", path.display()))?;
        }
    }
    Ok(())
}

fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() || dst.is_symlink() {
        fs::remove_file(dst).with_context(|| format!("Failed to replace {}", dst.display()))?;
    }

    #[cfg(unix)]
    {
        let target = fs::read_link(src)?;
        std::os::unix::fs::symlink(&target, dst)
            .with_context(|| format!("Failed to create symlink: {}", dst.display()))?;
    }
    #[cfg(not(unix))]
    {
        fs::copy(src, dst).with_context(|| {
            format!("Failed to copy {} to {}", src.display(), dst.display())
        })?;
    }
    Ok(())
}
