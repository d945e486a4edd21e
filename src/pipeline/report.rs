//! Run report: `build-report.json` in the output directory.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::platform::Platform;

pub const REPORT_FILE_NAME: &str = "build-report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preflight,
    ResolveVersion,
    AcquireBootstrap,
    SweepProcesses,
    RemoveSource,
    SyncSource,
    ApplyPatch,
    Build,
    StageOutput,
    Verify,
    Package,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub detail: String,
    pub at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformRecord {
    pub platform: String,
    pub output_dir: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub sha256: Option<String>,
    pub size: Option<u64>,
    pub permission_fix: Option<String>,
    pub version_output: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tool_version: String,
    pub version: Option<String>,
    pub host: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub stages: Vec<StageRecord>,
    pub platforms: Vec<PlatformRecord>,
}

impl RunReport {
    pub fn new(host: Platform) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            version: None,
            host: host.to_string(),
            started_at: now_utc_compact(),
            finished_at: None,
            status: RunStatus::Running,
            error: None,
            stages: Vec::new(),
            platforms: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, platform: Option<Platform>, detail: impl Into<String>) {
        self.stages.push(StageRecord {
            stage,
            platform: platform.map(|p| p.to_string()),
            detail: detail.into(),
            at: now_utc_compact(),
        });
    }

    /// Record for `platform`, created on first use.
    pub fn platform_mut(&mut self, platform: Platform) -> &mut PlatformRecord {
        let key = platform.to_string();
        let idx = match self.platforms.iter().position(|p| p.platform == key) {
            Some(idx) => idx,
            None => {
                self.platforms.push(PlatformRecord {
                    platform: key,
                    ..PlatformRecord::default()
                });
                self.platforms.len() - 1
            }
        };
        &mut self.platforms[idx]
    }

    pub fn finish<T>(&mut self, result: &Result<T>) {
        self.finished_at = Some(now_utc_compact());
        match result {
            Ok(_) => self.status = RunStatus::Succeeded,
            Err(e) => {
                self.status = RunStatus::Failed;
                self.error = Some(format!("{e:#}"));
            }
        }
    }

    pub fn stages_for(&self, stage: Stage) -> impl Iterator<Item = &StageRecord> {
        self.stages.iter().filter(move |r| r.stage == stage)
    }

    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(REPORT_FILE_NAME);
        write_json_atomic(&path, self)
            .with_context(|| format!("writing run report '{}'", path.display()))?;
        Ok(path)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).with_context(|| "serializing run report")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

pub(crate) fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
