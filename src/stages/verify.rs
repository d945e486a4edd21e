//! Output verification.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::platform::Platform;
use crate::process::{ensure_exists, Cmd};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub executable: PathBuf,
    /// `go version` output; only collected for host builds.
    pub version_output: Option<String>,
}

/// Check that `out` holds the target's `go` executable, and for host builds
/// that it runs.
pub fn verify_output(out: &Path, target: Platform, host: Platform) -> Result<VerifyReport> {
    let executable = out.join("bin").join(target.executable_name("go"));
    ensure_exists(&executable, "Expected executable")?;

    if target != host {
        info!(target = %target, exe = %executable.display(), "output verified (cross build, not run)");
        return Ok(VerifyReport {
            executable,
            version_output: None,
        });
    }

    let result = Cmd::new(&executable)
        .arg("version")
        .error_msg("built toolchain failed to run")
        .run()?;
    let version_output = result.stdout.trim().to_string();
    info!(target = %target, version = %version_output, "output verified");
    Ok(VerifyReport {
        executable,
        version_output: Some(version_output),
    })
}
