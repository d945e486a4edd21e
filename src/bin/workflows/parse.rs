use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use go_builder::artifact::mirror::Mirror;
use go_builder::artifact::permissions::HelperScript;
use go_builder::config::{Config, DEFAULT_HELPER_INTERPRETER};
use go_builder::stages::patch::{PatchSource, RejectPolicy};
use go_builder::Platform;

#[derive(Args, Debug, Default)]
pub(crate) struct BuildArgs {
    /// Version to build, e.g. go1.23.5. Defaults to the latest release.
    #[arg(long)]
    pub version: Option<String>,

    /// Branch or tag to check out instead of the version tag.
    #[arg(long)]
    pub revision: Option<String>,

    /// Release to use as bootstrap toolchain.
    #[arg(long)]
    pub bootstrap_version: Option<String>,

    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    #[arg(long)]
    pub bootstrap_dir: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Target platforms: windows, linux, darwin or <os>-<arch>.
    #[arg(long = "platform", value_delimiter = ',')]
    pub platforms: Vec<Platform>,

    #[arg(long)]
    pub output_prefix: Option<String>,

    /// Apply the diff of this pull request.
    #[arg(long, conflicts_with = "patch_file")]
    pub pull_request: Option<u64>,

    /// Apply a local patch file.
    #[arg(long)]
    pub patch_file: Option<PathBuf>,

    /// Delete the local patch file after applying it.
    #[arg(long, requires = "patch_file")]
    pub delete_patch: bool,

    /// What to do with rejected hunks: continue or abort.
    #[arg(long)]
    pub on_reject: Option<RejectPolicy>,

    /// Keep local changes in an existing checkout.
    #[arg(long)]
    pub no_reset: bool,

    /// Remove the source directory and clone again.
    #[arg(long)]
    pub fresh_source: bool,

    /// Kill processes still running from the source or output directories.
    #[arg(long)]
    pub sweep: bool,

    /// Directory mirroring: native or robocopy.
    #[arg(long)]
    pub mirror: Option<Mirror>,

    /// Build entry point relative to the source directory.
    #[arg(long)]
    pub build_driver: Option<PathBuf>,

    /// Permission-fix script for tar.gz archives.
    #[arg(long)]
    pub helper_script: Option<PathBuf>,

    #[arg(long, requires = "helper_script")]
    pub helper_interpreter: Option<String>,
}

impl BuildArgs {
    /// Overlay flags on top of `config`.
    pub(crate) fn apply(self, config: &mut Config) -> Result<()> {
        if self.version.is_some() {
            config.version = self.version;
        }
        if self.revision.is_some() {
            config.revision = self.revision;
        }
        if self.bootstrap_version.is_some() {
            config.bootstrap_version = self.bootstrap_version;
        }
        if let Some(dir) = self.source_dir {
            config.source_dir = dir;
        }
        if let Some(dir) = self.bootstrap_dir {
            config.bootstrap_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if !self.platforms.is_empty() {
            config.set_platforms(self.platforms)?;
        }
        if let Some(prefix) = self.output_prefix {
            config.output_prefix = prefix;
        }
        if let Some(id) = self.pull_request {
            config.patch = Some(PatchSource::PullRequest(id));
        }
        if let Some(path) = self.patch_file {
            config.patch = Some(PatchSource::File {
                path,
                delete_after: self.delete_patch,
            });
        }
        if let Some(policy) = self.on_reject {
            config.reject_policy = policy;
        }
        if self.no_reset {
            config.reset_checkout = false;
        }
        if self.fresh_source {
            config.fresh_source = true;
        }
        if self.sweep {
            config.sweep_stale_processes = true;
        }
        if let Some(mirror) = self.mirror {
            config.mirror = mirror;
        }
        if let Some(driver) = self.build_driver {
            config.build_driver = Some(driver);
        }
        if let Some(script) = self.helper_script {
            config.helper = Some(HelperScript {
                interpreter: self
                    .helper_interpreter
                    .unwrap_or_else(|| DEFAULT_HELPER_INTERPRETER.to_string()),
                script,
            });
        }
        Ok(())
    }
}
