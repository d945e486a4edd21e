//! Build invocation.
//!
//! The source tree's own driver (`src/make.bash`, `src/make.bat` on Windows)
//! does the work. It takes no arguments; the target is selected through
//! environment variables set on the child only.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::platform::{Platform, TargetOs};
use crate::process::{ensure_exists, Cmd};

/// Environment of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnv {
    /// Existing toolchain used to compile the new one (`GOROOT_BOOTSTRAP`).
    pub bootstrap_root: PathBuf,
    /// Tree being built (`GOROOT`).
    pub target_root: PathBuf,
    /// `GOOS`/`GOARCH`.
    pub target: Platform,
}

impl BuildEnv {
    pub fn vars(&self) -> Vec<(&'static str, OsString)> {
        vec![
            ("GOROOT_BOOTSTRAP", self.bootstrap_root.clone().into_os_string()),
            ("GOROOT", self.target_root.clone().into_os_string()),
            ("GOOS", self.target.os.as_str().into()),
            ("GOARCH", self.target.arch.as_str().into()),
        ]
    }

    /// `cmd` with this environment added.
    pub fn apply(&self, cmd: Cmd) -> Cmd {
        self.vars()
            .into_iter()
            .fold(cmd, |cmd, (key, value)| cmd.env(key, value))
    }
}

/// Driver path relative to the source root for builds on `host`.
pub fn default_driver(host: Platform) -> PathBuf {
    match host.os {
        TargetOs::Windows => PathBuf::from("src").join("make.bat"),
        _ => PathBuf::from("src").join("make.bash"),
    }
}

/// Run the build driver for `target`. Any non-zero exit is fatal.
pub fn build_platform(
    source_dir: &Path,
    bootstrap_dir: &Path,
    target: Platform,
    driver: &Path,
) -> Result<()> {
    let source_root = fs::canonicalize(source_dir)
        .with_context(|| format!("Source directory not found at: {}", source_dir.display()))?;
    let bootstrap_root = fs::canonicalize(bootstrap_dir).with_context(|| {
        format!(
            "Bootstrap toolchain not found at: {}",
            bootstrap_dir.display()
        )
    })?;

    let driver_path = source_root.join(driver);
    ensure_exists(&driver_path, "Build driver")?;
    let work_dir = driver_path.parent().unwrap_or(&source_root).to_path_buf();

    let env = BuildEnv {
        bootstrap_root,
        target_root: source_root,
        target,
    };

    info!(
        target = %target,
        driver = %driver_path.display(),
        "building toolchain"
    );
    env.apply(Cmd::new(&driver_path))
        .dir(&work_dir)
        .error_msg(&format!("build for {target} failed"))
        .run_interactive()?;
    info!(target = %target, "build finished");
    Ok(())
}
