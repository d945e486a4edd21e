//! External command execution.
//!
//! Every tool the pipeline drives (git, the build driver, the mirroring
//! utility, the permission helper) is spawned through [`Cmd`]. A run yields a
//! [`CommandResult`] carrying the exit code and captured output, so callers
//! decide between "fatal" and "warn and continue" without string matching.
//!
//! Environment set with [`Cmd::env`] only reaches the spawned child; the
//! parent process environment is never modified.

use anyhow::{bail, Context, Result};
use std::ffi::{OsStr, OsString};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Outcome of a finished external command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Rendered command line, for messages.
    pub command: String,
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout (empty for interactive runs).
    pub stdout: String,
    /// Captured stderr (empty for interactive runs).
    pub stderr: String,
    success: bool,
}

impl CommandResult {
    /// Whether the exit code fell inside the accepted range.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Exit code rendered for messages ("3", "signal").
    pub fn code_display(&self) -> String {
        match self.code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// Builder for an external command.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    ok_codes: RangeInclusive<i32>,
    allow_fail: bool,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            dir: None,
            envs: Vec::new(),
            ok_codes: 0..=0,
            allow_fail: false,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Working directory of the child.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Exit codes treated as success. Defaults to `0..=0`.
    ///
    /// Mirroring utilities such as robocopy report "files copied" and
    /// "extras deleted" through exit codes 1-7.
    pub fn ok_codes(mut self, codes: RangeInclusive<i32>) -> Self {
        self.ok_codes = codes;
        self
    }

    /// Return the result instead of failing on a rejected exit code.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Message prefixed to the error when the command fails.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    /// Command line rendered for logs and errors.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run with captured stdout/stderr.
    pub fn run(&self) -> Result<CommandResult> {
        let rendered = self.display();
        debug!(command = %rendered, "running");

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute `{rendered}`"))?;

        self.finish(
            rendered,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    }

    /// Run with stdio inherited from the parent, for long builds whose
    /// progress the user should see.
    pub fn run_interactive(&self) -> Result<CommandResult> {
        let rendered = self.display();
        debug!(command = %rendered, "running (interactive)");

        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("failed to execute `{rendered}`"))?;

        self.finish(rendered, status.code(), String::new(), String::new())
    }

    fn finish(
        &self,
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    ) -> Result<CommandResult> {
        let success = code.is_some_and(|c| self.ok_codes.contains(&c));
        let result = CommandResult {
            command,
            code,
            stdout,
            stderr,
            success,
        };

        if result.success || self.allow_fail {
            return Ok(result);
        }

        let prefix = self.error_msg.as_deref().unwrap_or("command failed");
        let detail = if result.stderr.trim().is_empty() {
            result.stdout.trim()
        } else {
            result.stderr.trim()
        };
        if detail.is_empty() {
            bail!(
                "{}: `{}` exited with {}",
                prefix,
                result.command,
                result.code_display()
            );
        }
        bail!(
            "{}: `{}` exited with {}\n{}",
            prefix,
            result.command,
            result.code_display(),
            detail
        )
    }
}

/// Fail with a readable message when `path` does not exist.
pub fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} not found at: {}", what, path.display());
    }
    Ok(())
}
