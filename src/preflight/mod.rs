//! Preflight checks for build validation.
//!
//! Validates that the host has the tools a run will shell out to before any
//! network or filesystem work starts, so a missing tool is reported up front
//! instead of halfway through a build.
//!
//! # Example
//!
//! ```rust
//! use go_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("git") {
//!     println!("git not installed");
//! }
//!
//! let tools = &[("git", "git")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};
use tracing::warn;

use crate::config::Config;

/// Check if a command exists on PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools every run needs. Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("git", "git")];

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push((*tool, *package));
        }
    }

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Tools a run with `config` cannot do without.
pub fn tools_for(config: &Config) -> Vec<(String, String)> {
    let mut tools: Vec<(String, String)> = REQUIRED_TOOLS
        .iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect();

    if let Some(program) = config.mirror.required_tool() {
        tools.push((
            program.to_string_lossy().into_owned(),
            "robocopy (Windows)".to_string(),
        ));
    }
    tools
}

/// Check every tool a run with `config` needs.
///
/// A missing helper interpreter only warns: the permission chain falls back
/// to the in-process rules.
pub fn check_host_tools(config: &Config) -> Result<()> {
    if let Some(helper) = &config.helper {
        if !command_exists(&helper.interpreter) {
            warn!(
                interpreter = %helper.interpreter,
                "permission helper interpreter not found"
            );
        }
    }

    let tools = tools_for(config);
    let tools: Vec<(&str, &str)> = tools
        .iter()
        .map(|(t, p)| (t.as_str(), p.as_str()))
        .collect();
    check_required_tools(&tools)
}
