//! Permission fixing for produced tarballs.
//!
//! Archives built on hosts without POSIX modes (or from trees that lost their
//! execute bits while being mirrored) must still unpack with executable
//! tools. Fixing runs an ordered chain of [`PermissionFix`] strategies; the
//! first one that succeeds wins and is reported back.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use super::tarball;
use crate::process::Cmd;

/// One way of fixing modes inside a tar.gz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionFix {
    /// External helper script, invoked as `<interpreter> <script> <archive>`.
    Helper,
    /// In-process rewrite with the full permission rules.
    Rules,
    /// In-process rewrite adding 0755 to every directory and regular file.
    ForceExecutable,
}

impl PermissionFix {
    pub fn default_chain() -> Vec<PermissionFix> {
        vec![
            PermissionFix::Helper,
            PermissionFix::Rules,
            PermissionFix::ForceExecutable,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            PermissionFix::Helper => "helper",
            PermissionFix::Rules => "rules",
            PermissionFix::ForceExecutable => "force-executable",
        }
    }
}

impl FromStr for PermissionFix {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "helper" => Ok(PermissionFix::Helper),
            "rules" => Ok(PermissionFix::Rules),
            "force-executable" | "force_executable" => Ok(PermissionFix::ForceExecutable),
            other => bail!(
                "unknown permission fix '{}'; expected helper, rules or force-executable",
                other
            ),
        }
    }
}

/// External permission-fix script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperScript {
    pub interpreter: String,
    pub script: PathBuf,
}

/// Kind of a tar entry, as far as mode decisions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

/// In-process mode rules applied while rewriting an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModePolicy {
    /// Directories 0755; regular files under `<base>/bin/`, `<base>/pkg/tool/`
    /// or `<base>/tools/`, or already executable, 0755; other files 0644.
    /// Links and special entries keep their mode.
    Rules { base_name: String },
    /// Every directory and regular file gains 0755 on top of its recorded
    /// mode. Links and special entries keep their mode.
    ForceExecutable,
}

impl ModePolicy {
    pub fn mode_for(&self, name: &str, kind: EntryKind, current: u32) -> u32 {
        let name = name.strip_prefix("./").unwrap_or(name);
        match self {
            ModePolicy::Rules { base_name } => match kind {
                EntryKind::Directory => 0o755,
                EntryKind::File => {
                    let tool_dir = ["bin/", "pkg/tool/", "tools/"]
                        .iter()
                        .any(|dir| under(name, base_name, dir));
                    if tool_dir || current & 0o111 != 0 {
                        0o755
                    } else {
                        0o644
                    }
                }
                EntryKind::Symlink | EntryKind::Other => current,
            },
            ModePolicy::ForceExecutable => match kind {
                EntryKind::Directory | EntryKind::File => current | 0o755,
                EntryKind::Symlink | EntryKind::Other => current,
            },
        }
    }
}

fn under(name: &str, base_name: &str, dir: &str) -> bool {
    name.strip_prefix(base_name)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| rest.starts_with(dir))
}

/// Run `chain` against `archive` until one strategy succeeds.
///
/// Returns the winning strategy, or `None` for an empty chain. A missing or
/// failing helper is a warning; the chain moves on.
pub fn fix_tar_permissions(
    archive: &Path,
    chain: &[PermissionFix],
    helper: Option<&HelperScript>,
    base_name: &str,
) -> Result<Option<PermissionFix>> {
    for &strategy in chain {
        let attempt = match strategy {
            PermissionFix::Helper => run_helper(archive, helper),
            PermissionFix::Rules => tarball::rewrite_tar_gz_modes(
                archive,
                &ModePolicy::Rules {
                    base_name: base_name.to_string(),
                },
            ),
            PermissionFix::ForceExecutable => {
                tarball::rewrite_tar_gz_modes(archive, &ModePolicy::ForceExecutable)
            }
        };

        match attempt {
            Ok(()) => {
                info!(
                    archive = %archive.display(),
                    strategy = strategy.name(),
                    "archive permissions fixed"
                );
                return Ok(Some(strategy));
            }
            Err(e) => warn!(
                archive = %archive.display(),
                strategy = strategy.name(),
                "permission fix unavailable, trying next: {e:#}"
            ),
        }
    }

    if chain.is_empty() {
        return Ok(None);
    }
    bail!(
        "every permission fix strategy failed for '{}'",
        archive.display()
    )
}

fn run_helper(archive: &Path, helper: Option<&HelperScript>) -> Result<()> {
    let Some(helper) = helper else {
        bail!("no helper script configured");
    };
    if !helper.script.is_file() {
        bail!("helper script not found at: {}", helper.script.display());
    }

    Cmd::new(&helper.interpreter)
        .arg_path(&helper.script)
        .arg_path(archive)
        .error_msg("permission helper failed")
        .run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ModePolicy {
        ModePolicy::Rules {
            base_name: "go".into(),
        }
    }

    #[test]
    fn rules_make_tool_directories_executable() {
        let p = rules();
        assert_eq!(p.mode_for("go/bin/go", EntryKind::File, 0o644), 0o755);
        assert_eq!(p.mode_for("./go/bin/gofmt", EntryKind::File, 0o600), 0o755);
        assert_eq!(
            p.mode_for("go/pkg/tool/linux_amd64/compile", EntryKind::File, 0o644),
            0o755
        );
        assert_eq!(p.mode_for("go/tools/fix", EntryKind::File, 0o644), 0o755);
    }

    #[test]
    fn rules_keep_existing_execute_bits_and_normalize_the_rest() {
        let p = rules();
        assert_eq!(p.mode_for("go/src/make.bash", EntryKind::File, 0o775), 0o755);
        assert_eq!(p.mode_for("go/VERSION", EntryKind::File, 0o600), 0o644);
        assert_eq!(p.mode_for("go/src", EntryKind::Directory, 0o700), 0o755);
        assert_eq!(p.mode_for("go/bin/link", EntryKind::Symlink, 0o777), 0o777);
    }

    #[test]
    fn rules_ignore_lookalike_prefixes() {
        let p = rules();
        assert_eq!(p.mode_for("gopher/bin/go", EntryKind::File, 0o644), 0o644);
        assert_eq!(p.mode_for("go/src/cmd/go/bin/x", EntryKind::File, 0o644), 0o644);
    }

    #[test]
    fn force_executable_opens_every_file_and_directory() {
        let p = ModePolicy::ForceExecutable;
        assert_eq!(p.mode_for("go/bin/go", EntryKind::File, 0o600), 0o755);
        assert_eq!(p.mode_for("go/VERSION", EntryKind::File, 0o600), 0o755);
        assert_eq!(p.mode_for("go/src/make.bash", EntryKind::File, 0o775), 0o775);
        assert_eq!(p.mode_for("go/src", EntryKind::Directory, 0o000), 0o755);
        assert_eq!(p.mode_for("go/bin/link", EntryKind::Symlink, 0o777), 0o777);
    }

    #[test]
    fn parses_chain_names() {
        assert_eq!(
            "force-executable".parse::<PermissionFix>().unwrap(),
            PermissionFix::ForceExecutable
        );
        assert_eq!("Rules".parse::<PermissionFix>().unwrap(), PermissionFix::Rules);
        assert!("chmod".parse::<PermissionFix>().is_err());
    }
}
