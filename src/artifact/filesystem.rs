//! Filesystem utilities: robust directory removal and tree moves.
//!
//! Build trees on Windows hosts are frequently left with open handles by
//! interrupted compiler processes, so a single `remove_dir_all` is not
//! enough. [`remove_dir_robust`] retries a fixed number of times with a fixed
//! delay, and inside each attempt falls back from plain deletion to a
//! mirror-based purge (mirroring an empty directory over the target empties
//! it file by file, which gets past most sharing violations).

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::mirror::Mirror;

/// Retry bounds for directory removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// One way of deleting a directory tree.
pub trait RemoveStrategy {
    fn name(&self) -> &'static str;
    fn remove(&self, path: &Path) -> Result<()>;
}

/// `fs::remove_dir_all`.
pub struct PlainRemove;

impl RemoveStrategy for PlainRemove {
    fn name(&self) -> &'static str {
        "remove-dir-all"
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path).with_context(|| format!("removing '{}'", path.display()))
    }
}

/// Empty the tree by mirroring an empty directory over it, then delete it.
pub struct MirrorPurge<'a> {
    mirror: &'a Mirror,
}

impl<'a> MirrorPurge<'a> {
    pub fn new(mirror: &'a Mirror) -> Self {
        Self { mirror }
    }
}

impl RemoveStrategy for MirrorPurge<'_> {
    fn name(&self) -> &'static str {
        "mirror-purge"
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.mirror
            .purge(path)
            .with_context(|| format!("purging '{}' via {}", path.display(), self.mirror.name()))?;
        fs::remove_dir_all(path)
            .with_context(|| format!("removing purged '{}'", path.display()))
    }
}

/// How a removal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    AlreadyAbsent,
    Removed {
        strategy: &'static str,
        attempt: u32,
    },
}

/// Remove `path` with plain deletion, falling back to a mirror purge, retried
/// per `policy`.
pub fn remove_dir_robust(
    path: &Path,
    policy: RemovalPolicy,
    mirror: &Mirror,
) -> Result<RemovalOutcome> {
    let plain = PlainRemove;
    let purge = MirrorPurge::new(mirror);
    remove_dir_with_strategies(path, policy, &[&plain, &purge])
}

/// Try each strategy in order on every attempt; the first one that leaves
/// the path gone wins. Fails only after `policy.attempts` full rounds.
pub fn remove_dir_with_strategies(
    path: &Path,
    policy: RemovalPolicy,
    strategies: &[&dyn RemoveStrategy],
) -> Result<RemovalOutcome> {
    if !path.exists() && !path.is_symlink() {
        return Ok(RemovalOutcome::AlreadyAbsent);
    }
    if policy.attempts == 0 {
        bail!("removal policy allows zero attempts for '{}'", path.display());
    }

    let mut last_error = None;
    for attempt in 1..=policy.attempts {
        for strategy in strategies {
            let result = strategy.remove(path);
            if !path.exists() && !path.is_symlink() {
                if attempt > 1 || strategy.name() != PlainRemove.name() {
                    info!(
                        path = %path.display(),
                        strategy = strategy.name(),
                        attempt,
                        "directory removed"
                    );
                } else {
                    debug!(path = %path.display(), "directory removed");
                }
                return Ok(RemovalOutcome::Removed {
                    strategy: strategy.name(),
                    attempt,
                });
            }

            let error = match result {
                Ok(()) => anyhow!(
                    "{} reported success but '{}' still exists",
                    strategy.name(),
                    path.display()
                ),
                Err(error) => error,
            };
            warn!(
                path = %path.display(),
                strategy = strategy.name(),
                attempt,
                attempts = policy.attempts,
                "removal failed: {error:#}"
            );
            last_error = Some(error);
        }

        if attempt < policy.attempts {
            thread::sleep(policy.delay);
        }
    }

    let error = last_error.unwrap_or_else(|| anyhow!("no removal strategy configured"));
    Err(error.context(format!(
        "removing '{}' failed after {} attempts",
        path.display(),
        policy.attempts
    )))
}

/// Move every entry of `src` into `dst`, replacing same-named entries, then
/// remove the emptied `src`.
pub fn move_dir_contents(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if to.is_dir() && !to.is_symlink() {
            fs::remove_dir_all(&to)
                .with_context(|| format!("Failed to replace {}", to.display()))?;
        } else if to.exists() || to.is_symlink() {
            fs::remove_file(&to).with_context(|| format!("Failed to replace {}", to.display()))?;
        }

        fs::rename(&from, &to).with_context(|| {
            format!("Failed to move {} to {}", from.display(), to.display())
        })?;
    }

    fs::remove_dir(src).with_context(|| format!("Failed to remove {}", src.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn instant(attempts: u32) -> RemovalPolicy {
        RemovalPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    fn populated_tree(root: &Path) -> std::path::PathBuf {
        let tree = root.join("go-src");
        fs::create_dir_all(tree.join("pkg/tool/windows_amd64")).unwrap();
        fs::write(tree.join("pkg/tool/windows_amd64/compile.exe"), b"held open").unwrap();
        fs::write(tree.join("VERSION"), b"go1.23.5").unwrap();
        tree
    }

    /// Deletion always refused, as if a handle were held on a file inside.
    struct LockedHandle {
        calls: Cell<u32>,
    }

    impl RemoveStrategy for LockedHandle {
        fn name(&self) -> &'static str {
            "remove-dir-all"
        }

        fn remove(&self, path: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            bail!(
                "The process cannot access the file because it is being used by another process: {}",
                path.join("pkg/tool/windows_amd64/compile.exe").display()
            )
        }
    }

    /// Purge that fails until the handle is released after `failures` calls.
    struct ReleasingPurge {
        failures: u32,
        calls: Cell<u32>,
    }

    impl RemoveStrategy for ReleasingPurge {
        fn name(&self) -> &'static str {
            "mirror-purge"
        }

        fn remove(&self, path: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() <= self.failures {
                bail!("robocopy exited with 8");
            }
            fs::remove_dir_all(path)?;
            Ok(())
        }
    }

    #[test]
    fn missing_path_is_already_absent() {
        let temp = TempDir::new().unwrap();
        let outcome =
            remove_dir_robust(&temp.path().join("nope"), instant(3), &Mirror::Native).unwrap();
        assert_eq!(outcome, RemovalOutcome::AlreadyAbsent);
    }

    #[test]
    fn plain_removal_succeeds_first_try() {
        let temp = TempDir::new().unwrap();
        let tree = populated_tree(temp.path());

        let outcome = remove_dir_robust(&tree, instant(3), &Mirror::Native).unwrap();
        assert_eq!(
            outcome,
            RemovalOutcome::Removed {
                strategy: "remove-dir-all",
                attempt: 1
            }
        );
        assert!(!tree.exists());
    }

    #[test]
    fn native_mirror_purge_removes_tree() {
        let temp = TempDir::new().unwrap();
        let tree = populated_tree(temp.path());

        MirrorPurge::new(&Mirror::Native).remove(&tree).unwrap();
        assert!(!tree.exists());
    }

    #[test]
    fn locked_tree_is_removed_by_fallback_within_retry_bound() {
        let temp = TempDir::new().unwrap();
        let tree = populated_tree(temp.path());
        let locked = LockedHandle {
            calls: Cell::new(0),
        };
        let purge = ReleasingPurge {
            failures: 1,
            calls: Cell::new(0),
        };

        let outcome = remove_dir_with_strategies(&tree, instant(3), &[&locked, &purge]).unwrap();

        assert_eq!(
            outcome,
            RemovalOutcome::Removed {
                strategy: "mirror-purge",
                attempt: 2
            }
        );
        assert_eq!(locked.calls.get(), 2);
        assert!(!tree.exists());
    }

    #[test]
    fn locked_tree_fails_only_after_all_attempts() {
        let temp = TempDir::new().unwrap();
        let tree = populated_tree(temp.path());
        let locked = LockedHandle {
            calls: Cell::new(0),
        };
        let purge = ReleasingPurge {
            failures: u32::MAX,
            calls: Cell::new(0),
        };

        let err = remove_dir_with_strategies(&tree, instant(4), &[&locked, &purge]).unwrap_err();

        assert!(
            format!("{err:#}").contains("failed after 4 attempts"),
            "{err:#}"
        );
        assert_eq!(locked.calls.get(), 4);
        assert_eq!(purge.calls.get(), 4);
        assert!(tree.exists());
    }

    #[test]
    fn move_dir_contents_replaces_existing_entries() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        let nested = bin.join("linux_amd64");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("go"), b"target go").unwrap();
        fs::write(nested.join("gofmt"), b"target gofmt").unwrap();
        fs::write(bin.join("go"), b"host go").unwrap();

        move_dir_contents(&nested, &bin).unwrap();

        assert!(!nested.exists());
        assert_eq!(fs::read(bin.join("go")).unwrap(), b"target go");
        assert_eq!(fs::read(bin.join("gofmt")).unwrap(), b"target gofmt");
    }
}
