//! Output staging.
//!
//! The built tree is mirrored out of the shared checkout into a per-platform
//! directory. Cross builds leave host tools next to the target ones, so those
//! are cleaned up afterwards.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::artifact::filesystem::move_dir_contents;
use crate::artifact::mirror::Mirror;
use crate::platform::Platform;

/// Directory names never copied out of the checkout.
pub const STAGE_EXCLUDES: &[&str] = &[".git"];

/// What [`cleanup_cross_artifacts`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossCleanup {
    /// Host executables removed from `bin/`.
    pub removed_host_binaries: Vec<String>,
    /// Target executables moved from `bin/<os>_<arch>/` into `bin/`.
    pub promoted_binaries: Vec<String>,
    /// Whether `pkg/tool/<host_os>_<host_arch>` was deleted.
    pub removed_host_tools: bool,
}

/// Mirror `source_dir` into `<output_root>/<prefix>-<os>-<arch>` and tidy it
/// for `target`. Returns the staged directory.
pub fn stage_output(
    source_dir: &Path,
    output_root: &Path,
    prefix: &str,
    target: Platform,
    host: Platform,
    mirror: &Mirror,
) -> Result<PathBuf> {
    let out = output_root.join(target.output_dir_name(prefix));
    fs::create_dir_all(output_root)
        .with_context(|| format!("Failed to create directory: {}", output_root.display()))?;

    info!(
        target = %target,
        from = %source_dir.display(),
        to = %out.display(),
        mirror = mirror.name(),
        "staging build output"
    );
    mirror
        .mirror(source_dir, &out, STAGE_EXCLUDES)
        .with_context(|| format!("staging output for {target}"))?;

    if target != host {
        let cleanup = cleanup_cross_artifacts(&out, target, host)?;
        info!(
            target = %target,
            removed = cleanup.removed_host_binaries.len(),
            promoted = cleanup.promoted_binaries.len(),
            removed_host_tools = cleanup.removed_host_tools,
            "cross-build output cleaned"
        );
    }

    Ok(out)
}

/// Turn a cross build's layout into a native-looking one: host executables
/// out of `bin/`, target executables up from `bin/<os>_<arch>/`, host tool
/// directory gone.
pub fn cleanup_cross_artifacts(out: &Path, target: Platform, host: Platform) -> Result<CrossCleanup> {
    let mut cleanup = CrossCleanup::default();
    if target == host {
        return Ok(cleanup);
    }

    let bin = out.join("bin");
    let nested = bin.join(target.go_dir_tag());
    if nested.is_dir() {
        for entry in
            fs::read_dir(&bin).with_context(|| format!("Failed to read directory: {}", bin.display()))?
        {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_file() || file_type.is_symlink() {
                fs::remove_file(entry.path()).with_context(|| {
                    format!("Failed to remove host binary {}", entry.path().display())
                })?;
                cleanup
                    .removed_host_binaries
                    .push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        for entry in fs::read_dir(&nested)
            .with_context(|| format!("Failed to read directory: {}", nested.display()))?
        {
            cleanup
                .promoted_binaries
                .push(entry?.file_name().to_string_lossy().into_owned());
        }
        cleanup.promoted_binaries.sort();
        move_dir_contents(&nested, &bin)?;
    } else {
        warn!(
            dir = %nested.display(),
            "no cross-compiled binaries directory, leaving bin/ as built"
        );
    }

    let host_tools = out.join("pkg").join("tool").join(host.go_dir_tag());
    if host.go_dir_tag() != target.go_dir_tag() && host_tools.is_dir() {
        fs::remove_dir_all(&host_tools)
            .with_context(|| format!("Failed to remove {}", host_tools.display()))?;
        cleanup.removed_host_tools = true;
    }

    Ok(cleanup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{TargetArch, TargetOs};
    use tempfile::TempDir;

    const LINUX: Platform = Platform {
        os: TargetOs::Linux,
        arch: TargetArch::Amd64,
    };
    const WINDOWS: Platform = Platform {
        os: TargetOs::Windows,
        arch: TargetArch::Amd64,
    };

    /// Checkout after a Linux-hosted build for Windows.
    fn cross_built_checkout(root: &Path) -> PathBuf {
        let src = root.join("go-src");
        for dir in [
            ".git/objects",
            "bin/windows_amd64",
            "pkg/tool/linux_amd64",
            "pkg/tool/windows_amd64",
            "src/runtime",
        ] {
            fs::create_dir_all(src.join(dir)).unwrap();
        }
        fs::write(src.join("bin/go"), b"host go").unwrap();
        fs::write(src.join("bin/gofmt"), b"host gofmt").unwrap();
        fs::write(src.join("bin/windows_amd64/go.exe"), b"MZ go").unwrap();
        fs::write(src.join("bin/windows_amd64/gofmt.exe"), b"MZ gofmt").unwrap();
        fs::write(src.join("pkg/tool/linux_amd64/compile"), b"host").unwrap();
        fs::write(src.join("pkg/tool/windows_amd64/compile.exe"), b"MZ").unwrap();
        fs::write(src.join("src/runtime/proc.go"), b"package runtime").unwrap();
        src
    }

    #[test]
    fn output_directory_is_prefix_os_arch() {
        let temp = TempDir::new().unwrap();
        let src = cross_built_checkout(temp.path());
        let output = temp.path().join("output");

        let out = stage_output(&src, &output, "go-build", LINUX, LINUX, &Mirror::Native).unwrap();

        assert_eq!(out, output.join("go-build-linux-amd64"));
        assert!(out.join("src/runtime/proc.go").is_file());
        assert!(!out.join(".git").exists());
        assert!(out.join("bin/go").is_file());
    }

    #[test]
    fn cross_output_has_only_target_binaries() {
        let temp = TempDir::new().unwrap();
        let src = cross_built_checkout(temp.path());
        let output = temp.path().join("output");

        let out =
            stage_output(&src, &output, "go-build", WINDOWS, LINUX, &Mirror::Native).unwrap();

        let mut bin: Vec<String> = fs::read_dir(out.join("bin"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        bin.sort();
        assert_eq!(bin, vec!["go.exe", "gofmt.exe"]);
        assert_eq!(fs::read(out.join("bin/go.exe")).unwrap(), b"MZ go");
        assert!(!out.join("pkg/tool/linux_amd64").exists());
        assert!(out.join("pkg/tool/windows_amd64/compile.exe").is_file());
        // The shared checkout is untouched.
        assert!(src.join("bin/windows_amd64/go.exe").is_file());
    }

    #[test]
    fn cleanup_reports_changes() {
        let temp = TempDir::new().unwrap();
        let src = cross_built_checkout(temp.path());

        let cleanup = cleanup_cross_artifacts(&src, WINDOWS, LINUX).unwrap();

        let mut removed = cleanup.removed_host_binaries.clone();
        removed.sort();
        assert_eq!(removed, vec!["go", "gofmt"]);
        assert_eq!(cleanup.promoted_binaries, vec!["go.exe", "gofmt.exe"]);
        assert!(cleanup.removed_host_tools);
    }

    #[test]
    fn missing_nested_bin_leaves_host_binaries() {
        let temp = TempDir::new().unwrap();
        let src = cross_built_checkout(temp.path());
        fs::remove_dir_all(src.join("bin/windows_amd64")).unwrap();

        let cleanup = cleanup_cross_artifacts(&src, WINDOWS, LINUX).unwrap();

        assert!(cleanup.removed_host_binaries.is_empty());
        assert!(src.join("bin/go").is_file());
    }

    #[test]
    fn restaging_replaces_stale_output() {
        let temp = TempDir::new().unwrap();
        let src = cross_built_checkout(temp.path());
        let output = temp.path().join("output");
        let stale = output.join("go-build-linux-amd64/stale.txt");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old run").unwrap();

        stage_output(&src, &output, "go-build", LINUX, LINUX, &Mirror::Native).unwrap();

        assert!(!stale.exists());
    }
}
