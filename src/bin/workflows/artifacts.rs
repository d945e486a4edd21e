use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use go_builder::artifact::filesystem::{remove_dir_robust, RemovalOutcome};
use go_builder::config::Config;
use go_builder::stages::package::{checksum_path, package_output, PackageRequest};
use go_builder::Platform;

#[derive(Args, Debug)]
pub(crate) struct PackageArgs {
    /// Staged output directory, e.g. output/go-build-linux-amd64.
    pub dir: PathBuf,

    /// Platform the directory was built for.
    pub platform: Platform,

    /// Version used in the archive name, e.g. go1.23.5.
    #[arg(long)]
    pub version: String,

    /// Where the archive goes. Defaults to the configured output directory.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CleanArgs {
    /// Directories to remove.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

pub(crate) fn package(config_path: Option<&Path>, args: PackageArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());

    let report = package_output(
        &args.dir,
        &output,
        &PackageRequest {
            version: &args.version,
            target: args.platform,
            mirror: &config.mirror,
            permission_fix: &config.permission_fix,
            helper: config.helper.as_ref(),
        },
    )
    .with_context(|| format!("packaging '{}'", args.dir.display()))?;

    println!("{}", report.archive.display());
    println!("{}", checksum_path(&report.archive).display());
    Ok(())
}

pub(crate) fn clean(config_path: Option<&Path>, args: CleanArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    for path in &args.paths {
        match remove_dir_robust(path, config.removal, &config.mirror)? {
            RemovalOutcome::AlreadyAbsent => println!("{}: already absent", path.display()),
            RemovalOutcome::Removed { strategy, attempt } => println!(
                "{}: removed ({strategy}, attempt {attempt})",
                path.display()
            ),
        }
    }
    Ok(())
}
