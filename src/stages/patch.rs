//! Patch application.
//!
//! Patches are applied with `git apply --reject`: hunks that apply land in
//! the tree, hunks that do not are written next to their target as `.rej`
//! files. What happens next is the caller's [`RejectPolicy`]. Only a missing
//! patch file is fatal regardless of policy.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::net::HttpClient;
use crate::process::{ensure_exists, Cmd};

/// Where a patch comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchSource {
    /// Diff of a numbered pull request, downloaded and discarded after use.
    PullRequest(u64),
    /// Local patch file.
    File { path: PathBuf, delete_after: bool },
}

/// What to do when some hunks were rejected or the patch tool failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Warn and keep going with the hunks that applied.
    #[default]
    Continue,
    /// Fail the run.
    Abort,
}

impl FromStr for RejectPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(RejectPolicy::Continue),
            "abort" => Ok(RejectPolicy::Abort),
            other => bail!("unknown reject policy '{}'; expected continue or abort", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Clean,
    /// Some hunks did not apply; paths are the new `.rej` files.
    Rejected { rejects: Vec<PathBuf> },
    /// `git apply` exited non-zero without writing rejects, e.g. for a hunk
    /// against a file this tree does not have. Other hunks may have landed.
    ToolFailed { code: Option<i32>, stderr: String },
}

/// Apply `source` to the checkout at `source_dir`.
pub fn apply_patch(
    client: &HttpClient,
    source_dir: &Path,
    source: &PatchSource,
    pull_request_base: &str,
    policy: RejectPolicy,
) -> Result<PatchOutcome> {
    match source {
        PatchSource::PullRequest(id) => {
            let url = format!("{}/{}.diff", pull_request_base.trim_end_matches('/'), id);
            let download = tempfile::Builder::new()
                .prefix(&format!("go-pr-{id}-"))
                .suffix(".diff")
                .tempfile()
                .context("creating temporary patch file")?;
            info!(url = %url, "downloading pull request diff");
            client
                .download(&url, download.path())
                .with_context(|| format!("downloading patch from {url}"))?;
            apply_patch_file(source_dir, download.path(), policy)
        }
        PatchSource::File { path, delete_after } => {
            ensure_exists(path, "Patch file")?;
            let result = apply_patch_file(source_dir, path, policy);
            if *delete_after {
                match fs::remove_file(path) {
                    Ok(()) => info!(patch = %path.display(), "patch file deleted"),
                    Err(e) => warn!(patch = %path.display(), "could not delete patch file: {e}"),
                }
            }
            result
        }
    }
}

/// Apply the patch at `patch` with reject-on-conflict semantics.
pub fn apply_patch_file(
    source_dir: &Path,
    patch: &Path,
    policy: RejectPolicy,
) -> Result<PatchOutcome> {
    let patch = fs::canonicalize(patch)
        .with_context(|| format!("Patch file not found at: {}", patch.display()))?;
    clear_stale_rejects(source_dir)?;

    info!(patch = %patch.display(), dir = %source_dir.display(), "applying patch");
    let result = Cmd::new("git")
        .args(["apply", "--reject", "--whitespace=nowarn"])
        .arg_path(&patch)
        .dir(source_dir)
        .allow_fail()
        .run()?;

    let rejects: Vec<PathBuf> = find_rejects(source_dir)?.into_iter().collect();

    if rejects.is_empty() {
        if result.success() {
            info!("patch applied cleanly");
            return Ok(PatchOutcome::Clean);
        }
        let stderr = result.stderr.trim().to_string();
        return match policy {
            RejectPolicy::Continue => {
                warn!(
                    patch = %patch.display(),
                    code = %result.code_display(),
                    "patch tool failed, continuing: {stderr}"
                );
                Ok(PatchOutcome::ToolFailed {
                    code: result.code,
                    stderr,
                })
            }
            RejectPolicy::Abort => bail!(
                "patch '{}' could not be applied: `{}` exited with {}\n{}",
                patch.display(),
                result.command,
                result.code_display(),
                stderr
            ),
        };
    }

    match policy {
        RejectPolicy::Continue => {
            for rej in &rejects {
                warn!(reject = %rej.display(), "patch hunk rejected, continuing");
            }
            Ok(PatchOutcome::Rejected { rejects })
        }
        RejectPolicy::Abort => {
            let list = rejects
                .iter()
                .map(|r| format!("  {}", r.display()))
                .collect::<Vec<_>>()
                .join("\n");
            bail!(
                "patch '{}' left rejected hunks:\n{}",
                patch.display(),
                list
            )
        }
    }
}

/// Remove `.rej` files left by an earlier run so every reject found after
/// applying belongs to this patch.
fn clear_stale_rejects(dir: &Path) -> Result<()> {
    for rej in find_rejects(dir)? {
        fs::remove_file(&rej)
            .with_context(|| format!("removing stale reject file {}", rej.display()))?;
        debug!(reject = %rej.display(), "removed stale reject file");
    }
    Ok(())
}

fn find_rejects(dir: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut found = BTreeSet::new();
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "rej")
        {
            found.insert(entry.path().to_path_buf());
        }
    }
    Ok(found)
}
