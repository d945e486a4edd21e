//! Pipeline orchestration.
//!
//! ```text
//! ResolveVersion -> AcquireBootstrap -> SyncSource -> ApplyPatch
//!     -> { Build -> StageOutput -> Verify -> Package } per platform
//! ```
//!
//! Stages run strictly in order, one external command at a time. The first
//! fatal error stops the run; later platforms are not attempted. Either way
//! a `build-report.json` is left in the output directory.

pub mod report;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::artifact::filesystem::{remove_dir_robust, RemovalOutcome};
use crate::config::Config;
use crate::lock::RunLock;
use crate::net::HttpClient;
use crate::platform::Platform;
use crate::preflight;
use crate::stages::bootstrap::{ensure_bootstrap, BootstrapOutcome, BootstrapRequest};
use crate::stages::build::{build_platform, default_driver};
use crate::stages::package::{package_output, PackageRequest};
use crate::stages::patch::{apply_patch, PatchOutcome};
use crate::stages::source::{sync_source, SourceSpec, SyncOutcome};
use crate::stages::stage_output::stage_output;
use crate::stages::verify::verify_output;
use crate::stages::version::resolve_version;
use crate::sweep::sweep_stale_processes;

pub use report::{RunReport, RunStatus, Stage};

/// Run every stage for every configured platform.
///
/// The report is written whether the run succeeds or not; on failure the
/// original error is returned after writing it.
pub fn run(config: &Config) -> Result<RunReport> {
    let host = Platform::host()?;
    let _lock = RunLock::acquire(&config.output_dir)?;
    let client = HttpClient::new()?;

    let mut report = RunReport::new(host);
    let result = execute(config, &client, host, &mut report);
    report.finish(&result);
    let path = report.write(&config.output_dir)?;
    info!(report = %path.display(), status = ?report.status, "run report written");

    result.map(|()| report)
}

fn execute(
    config: &Config,
    client: &HttpClient,
    host: Platform,
    report: &mut RunReport,
) -> Result<()> {
    preflight::check_host_tools(config)?;
    report.record(Stage::Preflight, None, "host tools present");

    let version = resolve_version(
        config.version.as_deref(),
        client,
        &config.endpoints.version_url,
    )?;
    report.version = Some(version.clone());
    report.record(Stage::ResolveVersion, None, version.clone());

    let bootstrap = ensure_bootstrap(
        client,
        &config.bootstrap_dir,
        &BootstrapRequest {
            version: config.bootstrap_version_for(&version),
            host,
            download_base: &config.endpoints.download_base,
            expected_sha256: config.bootstrap_sha256.as_deref(),
        },
    )?;
    report.record(
        Stage::AcquireBootstrap,
        None,
        match bootstrap {
            BootstrapOutcome::AlreadyPresent => "already present".to_string(),
            BootstrapOutcome::Downloaded { url, .. } => format!("downloaded {url}"),
        },
    );

    if config.sweep_stale_processes {
        let roots: Vec<PathBuf> = vec![config.source_dir.clone(), config.output_dir.clone()];
        match sweep_stale_processes(&roots) {
            Ok(sweep) => report.record(
                Stage::SweepProcesses,
                None,
                format!("{} killed via {}", sweep.killed.len(), sweep.strategy),
            ),
            Err(e) => {
                warn!("stale process sweep failed: {e:#}");
                report.record(Stage::SweepProcesses, None, format!("skipped: {e:#}"));
            }
        }
    }

    if config.fresh_source {
        let outcome = remove_dir_robust(&config.source_dir, config.removal, &config.mirror)
            .context("removing source directory for a fresh clone")?;
        report.record(
            Stage::RemoveSource,
            None,
            match outcome {
                RemovalOutcome::AlreadyAbsent => "already absent".to_string(),
                RemovalOutcome::Removed { strategy, attempt } => {
                    format!("removed via {strategy} on attempt {attempt}")
                }
            },
        );
    }

    let sync = sync_source(
        &config.source_dir,
        &SourceSpec {
            repository: &config.endpoints.repository,
            revision: config.revision_for(&version),
            reset: config.reset_checkout,
        },
    )?;
    report.record(
        Stage::SyncSource,
        None,
        match sync {
            SyncOutcome::Cloned => "cloned".to_string(),
            SyncOutcome::Updated { on_branch: true } => "updated (branch, pulled)".to_string(),
            SyncOutcome::Updated { on_branch: false } => "updated (detached)".to_string(),
        },
    );

    if let Some(patch) = &config.patch {
        let outcome = apply_patch(
            client,
            &config.source_dir,
            patch,
            &config.endpoints.pull_request_base,
            config.reject_policy,
        )?;
        report.record(
            Stage::ApplyPatch,
            None,
            match outcome {
                PatchOutcome::Clean => "applied cleanly".to_string(),
                PatchOutcome::Rejected { rejects } => {
                    format!("applied with {} rejected file(s)", rejects.len())
                }
                PatchOutcome::ToolFailed { code, .. } => format!(
                    "patch tool exited with {}, continuing",
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
                ),
            },
        );
    }

    let driver = config
        .build_driver
        .clone()
        .unwrap_or_else(|| default_driver(host));

    for &target in &config.platforms {
        info!(target = %target, "platform started");

        build_platform(&config.source_dir, &config.bootstrap_dir, target, &driver)?;
        report.record(Stage::Build, Some(target), "driver exited 0");

        let out = stage_output(
            &config.source_dir,
            &config.output_dir,
            &config.output_prefix,
            target,
            host,
            &config.mirror,
        )?;
        report.platform_mut(target).output_dir = Some(out.clone());
        report.record(Stage::StageOutput, Some(target), out.display().to_string());

        let verified = verify_output(&out, target, host)?;
        report.record(
            Stage::Verify,
            Some(target),
            verified
                .version_output
                .clone()
                .unwrap_or_else(|| "executable present (cross build)".to_string()),
        );
        report.platform_mut(target).version_output = verified.version_output;

        let package = package_output(
            &out,
            &config.output_dir,
            &PackageRequest {
                version: &version,
                target,
                mirror: &config.mirror,
                permission_fix: &config.permission_fix,
                helper: config.helper.as_ref(),
            },
        )?;
        report.record(
            Stage::Package,
            Some(target),
            package.archive.display().to_string(),
        );
        let record = report.platform_mut(target);
        record.archive = Some(package.archive);
        record.sha256 = Some(package.sha256);
        record.size = Some(package.size);
        record.permission_fix = package.permission_fix.map(|p| p.name().to_string());
    }

    Ok(())
}
