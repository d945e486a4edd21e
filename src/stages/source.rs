//! Source synchronization.
//!
//! The source directory is a single checkout reused across runs and
//! platforms. The first run clones it shallowly; later runs bring it to the
//! requested revision in place.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::process::Cmd;

/// Where the sources come from and which revision to build.
#[derive(Debug, Clone)]
pub struct SourceSpec<'a> {
    pub repository: &'a str,
    /// Branch or tag.
    pub revision: &'a str,
    /// Hard-reset and clean an existing checkout before fetching.
    pub reset: bool,
}

/// What [`sync_source`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Updated { on_branch: bool },
}

/// Bring `dir` to `spec.revision`, cloning only when there is no checkout.
pub fn sync_source(dir: &Path, spec: &SourceSpec<'_>) -> Result<SyncOutcome> {
    if dir.join(".git").exists() {
        let on_branch = update_checkout(dir, spec)?;
        return Ok(SyncOutcome::Updated { on_branch });
    }

    if dir.exists() && !is_empty_dir(dir)? {
        bail!(
            "source directory '{}' exists but is not a git checkout",
            dir.display()
        );
    }

    info!(
        repository = spec.repository,
        revision = spec.revision,
        dir = %dir.display(),
        "cloning sources"
    );
    Cmd::new("git")
        .args(["clone", "--depth", "1", "--branch", spec.revision, spec.repository])
        .arg_path(dir)
        .error_msg("git clone failed")
        .run_interactive()?;
    Ok(SyncOutcome::Cloned)
}

fn update_checkout(dir: &Path, spec: &SourceSpec<'_>) -> Result<bool> {
    info!(revision = spec.revision, dir = %dir.display(), "updating existing checkout");

    if spec.reset {
        git(dir, &["reset", "--hard"], "git reset failed")?;
        git(dir, &["clean", "-fdx"], "git clean failed")?;
    }

    git(dir, &["fetch", "origin", spec.revision], "git fetch failed")?;

    let checkout = Cmd::new("git")
        .args(["checkout", "--force", spec.revision])
        .dir(dir)
        .allow_fail()
        .run()?;
    if !checkout.success() {
        warn!(
            revision = spec.revision,
            "revision not available locally, checking out fetched commit"
        );
        git(
            dir,
            &["checkout", "--force", "FETCH_HEAD"],
            "git checkout failed",
        )?;
    }

    let on_branch = Cmd::new("git")
        .args(["symbolic-ref", "-q", "HEAD"])
        .dir(dir)
        .allow_fail()
        .run()?
        .success();
    if on_branch {
        git(
            dir,
            &["pull", "--ff-only", "origin", spec.revision],
            "git pull failed",
        )?;
    }

    Ok(on_branch)
}

fn git(dir: &Path, args: &[&str], msg: &str) -> Result<()> {
    Cmd::new("git").args(args).dir(dir).error_msg(msg).run()?;
    Ok(())
}

fn is_empty_dir(dir: &Path) -> Result<bool> {
    let mut entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    Ok(entries.next().is_none())
}
