//! Run configuration.
//!
//! A [`Config`] starts from built-in defaults, is optionally overlaid with a
//! TOML file and is finally adjusted by command-line flags in the binary.
//! Relative paths in a config file resolve against the file's directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::filesystem::RemovalPolicy;
use crate::artifact::mirror::Mirror;
use crate::artifact::permissions::{HelperScript, PermissionFix};
use crate::platform::Platform;
use crate::stages::patch::{PatchSource, RejectPolicy};

pub const DEFAULT_VERSION_URL: &str = "https://go.dev/VERSION?m=text";
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://go.dev/dl";
pub const DEFAULT_REPOSITORY: &str = "https://go.googlesource.com/go";
pub const DEFAULT_PULL_REQUEST_BASE: &str = "https://github.com/golang/go/pull";
pub const DEFAULT_OUTPUT_PREFIX: &str = "go-build";
pub const DEFAULT_HELPER_INTERPRETER: &str = "python3";

/// Remote endpoints the pipeline talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Plaintext endpoint whose first line is the latest stable version.
    pub version_url: String,
    /// Base URL of release archives (`<base>/<version>.<os>-<arch>.<ext>`).
    pub download_base: String,
    /// Git repository of the Go sources.
    pub repository: String,
    /// Base URL of pull requests (`<base>/<id>.diff`).
    pub pull_request_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_url: DEFAULT_VERSION_URL.to_string(),
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            pull_request_base: DEFAULT_PULL_REQUEST_BASE.to_string(),
        }
    }
}

/// Everything a pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    /// Version to build; resolved from `endpoints.version_url` when absent.
    pub version: Option<String>,
    /// Git revision to check out; defaults to the version tag.
    pub revision: Option<String>,
    /// Release downloaded as bootstrap toolchain; defaults to the version.
    pub bootstrap_version: Option<String>,
    /// Expected sha256 of the bootstrap archive.
    pub bootstrap_sha256: Option<String>,
    pub source_dir: PathBuf,
    pub bootstrap_dir: PathBuf,
    pub output_dir: PathBuf,
    pub platforms: Vec<Platform>,
    pub output_prefix: String,
    pub endpoints: Endpoints,
    pub patch: Option<PatchSource>,
    pub reject_policy: RejectPolicy,
    /// Hard-reset and clean an existing checkout before fetching.
    pub reset_checkout: bool,
    /// Remove the source directory before syncing.
    pub fresh_source: bool,
    /// Kill processes still running from the source/output trees.
    pub sweep_stale_processes: bool,
    /// Build entry point relative to the source directory.
    pub build_driver: Option<PathBuf>,
    pub mirror: Mirror,
    pub permission_fix: Vec<PermissionFix>,
    pub helper: Option<HelperScript>,
    pub removal: RemovalPolicy,
}

impl Config {
    /// Built-in defaults for the current host.
    pub fn defaults() -> Result<Self> {
        Ok(Self {
            version: None,
            revision: None,
            bootstrap_version: None,
            bootstrap_sha256: None,
            source_dir: PathBuf::from("go-src"),
            bootstrap_dir: default_bootstrap_dir(),
            output_dir: PathBuf::from("output"),
            platforms: vec![Platform::host()?],
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            endpoints: Endpoints::default(),
            patch: None,
            reject_policy: RejectPolicy::Continue,
            reset_checkout: true,
            fresh_source: false,
            sweep_stale_processes: false,
            build_driver: None,
            mirror: Mirror::host_default(),
            permission_fix: PermissionFix::default_chain(),
            helper: None,
            removal: RemovalPolicy::default(),
        })
    }

    /// Defaults overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::defaults()?;
        if let Some(path) = path {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config '{}'", path.display()))?;
            let parsed: ConfigToml = toml::from_str(&raw)
                .with_context(|| format!("parsing config '{}'", path.display()))?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config
                .apply_toml(parsed, base)
                .with_context(|| format!("applying config '{}'", path.display()))?;
        }
        Ok(config)
    }

    /// The revision to check out: explicit revision, else the version tag.
    pub fn revision_for<'a>(&'a self, version: &'a str) -> &'a str {
        self.revision.as_deref().unwrap_or(version)
    }

    /// The bootstrap release to download.
    pub fn bootstrap_version_for<'a>(&'a self, version: &'a str) -> &'a str {
        self.bootstrap_version.as_deref().unwrap_or(version)
    }

    /// Replace the platform list, dropping duplicates but keeping order.
    pub fn set_platforms(&mut self, platforms: Vec<Platform>) -> Result<()> {
        if platforms.is_empty() {
            bail!("at least one target platform is required");
        }
        let mut unique = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if !unique.contains(&platform) {
                unique.push(platform);
            }
        }
        self.platforms = unique;
        Ok(())
    }

    fn apply_toml(&mut self, file: ConfigToml, base: &Path) -> Result<()> {
        if let Some(v) = non_empty(file.version) {
            self.version = Some(v);
        }
        if let Some(v) = non_empty(file.revision) {
            self.revision = Some(v);
        }
        if let Some(dir) = file.source_dir {
            self.source_dir = resolve_path(base, &dir);
        }
        if let Some(dir) = file.bootstrap_dir {
            self.bootstrap_dir = resolve_path(base, &dir);
        }
        if let Some(dir) = file.output_dir {
            self.output_dir = resolve_path(base, &dir);
        }
        if let Some(platforms) = file.platforms {
            let parsed = platforms
                .iter()
                .map(|p| p.parse::<Platform>())
                .collect::<Result<Vec<_>>>()?;
            self.set_platforms(parsed)?;
        }
        if let Some(prefix) = non_empty(file.output_prefix) {
            self.output_prefix = prefix;
        }
        if let Some(v) = file.reset_checkout {
            self.reset_checkout = v;
        }
        if let Some(v) = file.fresh_source {
            self.fresh_source = v;
        }
        if let Some(v) = file.sweep_stale_processes {
            self.sweep_stale_processes = v;
        }
        if let Some(driver) = file.build_driver {
            self.build_driver = Some(PathBuf::from(driver));
        }

        if let Some(endpoints) = file.endpoints {
            if let Some(v) = non_empty(endpoints.version_url) {
                self.endpoints.version_url = v;
            }
            if let Some(v) = non_empty(endpoints.download_base) {
                self.endpoints.download_base = v;
            }
            if let Some(v) = non_empty(endpoints.repository) {
                self.endpoints.repository = v;
            }
            if let Some(v) = non_empty(endpoints.pull_request_base) {
                self.endpoints.pull_request_base = v;
            }
        }

        if let Some(bootstrap) = file.bootstrap {
            if let Some(v) = non_empty(bootstrap.version) {
                self.bootstrap_version = Some(v);
            }
            if let Some(v) = non_empty(bootstrap.sha256) {
                self.bootstrap_sha256 = Some(v.to_ascii_lowercase());
            }
        }

        if let Some(patch) = file.patch {
            self.patch = match (patch.pull_request, patch.file) {
                (Some(_), Some(_)) => {
                    bail!("patch.pull_request and patch.file are mutually exclusive")
                }
                (Some(id), None) => Some(PatchSource::PullRequest(id)),
                (None, Some(file)) => Some(PatchSource::File {
                    path: resolve_path(base, &file),
                    delete_after: patch.delete_after.unwrap_or(false),
                }),
                (None, None) => None,
            };
            if let Some(policy) = patch.on_reject {
                self.reject_policy = policy.parse()?;
            }
        }

        if let Some(packaging) = file.packaging {
            if let Some(mirror) = packaging.mirror {
                self.mirror = mirror.parse()?;
            }
            if let Some(chain) = packaging.permission_fix {
                self.permission_fix = chain
                    .iter()
                    .map(|s| s.parse::<PermissionFix>())
                    .collect::<Result<Vec<_>>>()?;
            }
            if let Some(script) = packaging.helper_script {
                self.helper = Some(HelperScript {
                    interpreter: packaging
                        .helper_interpreter
                        .unwrap_or_else(|| DEFAULT_HELPER_INTERPRETER.to_string()),
                    script: resolve_path(base, &script),
                });
            }
        }

        if let Some(removal) = file.removal {
            if let Some(attempts) = removal.attempts {
                if attempts == 0 {
                    bail!("removal.attempts must be at least 1");
                }
                self.removal.attempts = attempts;
            }
            if let Some(delay_ms) = removal.delay_ms {
                self.removal.delay = Duration::from_millis(delay_ms);
            }
        }

        Ok(())
    }
}

fn default_bootstrap_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("go-builder").join("go-bootstrap"))
        .unwrap_or_else(|| PathBuf::from("go-bootstrap"))
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    version: Option<String>,
    revision: Option<String>,
    source_dir: Option<String>,
    bootstrap_dir: Option<String>,
    output_dir: Option<String>,
    platforms: Option<Vec<String>>,
    output_prefix: Option<String>,
    reset_checkout: Option<bool>,
    fresh_source: Option<bool>,
    sweep_stale_processes: Option<bool>,
    build_driver: Option<String>,
    endpoints: Option<EndpointsToml>,
    bootstrap: Option<BootstrapToml>,
    patch: Option<PatchToml>,
    packaging: Option<PackagingToml>,
    removal: Option<RemovalToml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointsToml {
    version_url: Option<String>,
    download_base: Option<String>,
    repository: Option<String>,
    pull_request_base: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BootstrapToml {
    version: Option<String>,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatchToml {
    pull_request: Option<u64>,
    file: Option<String>,
    delete_after: Option<bool>,
    on_reject: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackagingToml {
    mirror: Option<String>,
    permission_fix: Option<Vec<String>>,
    helper_script: Option<String>,
    helper_interpreter: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemovalToml {
    attempts: Option<u32>,
    delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{TargetArch, TargetOs};
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("go-builder.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_target_the_host() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.platforms, vec![Platform::host().unwrap()]);
        assert_eq!(config.output_prefix, "go-build");
        assert_eq!(config.reject_policy, RejectPolicy::Continue);
        assert!(config.reset_checkout);
        assert_eq!(config.removal.attempts, 5);
    }

    #[test]
    fn file_overrides_defaults_and_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version = "go1.23.5"
platforms = ["windows", "linux", "linux"]
source_dir = "src-tree"
output_dir = "/abs/out"

[patch]
file = "fixes/arm.patch"
delete_after = true
on_reject = "abort"

[packaging]
mirror = "native"
permission_fix = ["helper", "force-executable"]
helper_script = "scripts/fix_tar_execs.py"

[removal]
attempts = 3
delay_ms = 10
"#,
        );

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.version.as_deref(), Some("go1.23.5"));
        assert_eq!(
            config.platforms,
            vec![
                Platform::new(TargetOs::Windows, TargetArch::Amd64),
                Platform::new(TargetOs::Linux, TargetArch::Amd64),
            ]
        );
        assert_eq!(config.source_dir, temp.path().join("src-tree"));
        assert_eq!(config.output_dir, PathBuf::from("/abs/out"));
        assert_eq!(
            config.patch,
            Some(PatchSource::File {
                path: temp.path().join("fixes/arm.patch"),
                delete_after: true,
            })
        );
        assert_eq!(config.reject_policy, RejectPolicy::Abort);
        assert_eq!(config.mirror, Mirror::Native);
        assert_eq!(
            config.permission_fix,
            vec![PermissionFix::Helper, PermissionFix::ForceExecutable]
        );
        let helper = config.helper.unwrap();
        assert_eq!(helper.interpreter, "python3");
        assert_eq!(helper.script, temp.path().join("scripts/fix_tar_execs.py"));
        assert_eq!(config.removal.attempts, 3);
        assert_eq!(config.removal.delay, Duration::from_millis(10));
    }

    #[test]
    fn revision_and_bootstrap_default_to_version() {
        let mut config = Config::defaults().unwrap();
        assert_eq!(config.revision_for("go1.22.0"), "go1.22.0");
        assert_eq!(config.bootstrap_version_for("go1.22.0"), "go1.22.0");
        config.revision = Some("master".into());
        config.bootstrap_version = Some("go1.21.13".into());
        assert_eq!(config.revision_for("go1.22.0"), "master");
        assert_eq!(config.bootstrap_version_for("go1.22.0"), "go1.21.13");
    }

    #[test]
    fn rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "flavour = \"spicy\"\n");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn rejects_conflicting_patch_sources() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            "[patch]\npull_request = 42\nfile = \"x.patch\"\n",
        );
        let err = format!("{:#}", Config::load(Some(&path)).unwrap_err());
        assert!(err.contains("mutually exclusive"), "{err}");
    }

    #[test]
    fn rejects_zero_removal_attempts() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "[removal]\nattempts = 0\n");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn empty_platform_list_is_rejected() {
        let mut config = Config::defaults().unwrap();
        assert!(config.set_platforms(Vec::new()).is_err());
    }
}
