//! Fixtures shared by the integration tests: a local origin repository with a
//! fake build driver, and a config pointing every endpoint at the temp dir.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use go_builder::artifact::mirror::Mirror;
use go_builder::config::Config;
use go_builder::Platform;

pub const VERSION: &str = "go1.99.0";

pub fn have_git() -> bool {
    which::which("git").is_ok()
}

pub fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=go-builder", "-c", "user.email=builder@example.com"])
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

/// Driver that lays out a Go-like tree the way a real build does: native
/// builds put tools in `bin/`, cross builds put target tools in
/// `bin/<os>_<arch>/` and leave host tools in `bin/`. Each invocation is
/// logged to `<root>/builds.log`.
fn driver_script(host: Platform, exit_code: i32) -> String {
    format!(
        r#"#!/bin/sh
set -e
echo "$GOOS-$GOARCH" >> "$GOROOT/../builds.log"
if [ {exit_code} -ne 0 ]; then
  echo "compile error" >&2
  exit {exit_code}
fi
host_tag="{host_tag}"
target_tag="${{GOOS}}_${{GOARCH}}"
exe=""
if [ "$GOOS" = windows ]; then exe=".exe"; fi

mkdir -p "$GOROOT/bin" "$GOROOT/pkg/tool/$host_tag"
printf '#!/bin/sh\necho "go version {version} {host_os}/{host_arch}"\n' > "$GOROOT/bin/go"
chmod 755 "$GOROOT/bin/go"
printf 'host tool' > "$GOROOT/pkg/tool/$host_tag/compile"

if [ "$target_tag" != "$host_tag" ]; then
  mkdir -p "$GOROOT/bin/$target_tag" "$GOROOT/pkg/tool/$target_tag"
  printf 'target go' > "$GOROOT/bin/$target_tag/go$exe"
  printf 'target gofmt' > "$GOROOT/bin/$target_tag/gofmt$exe"
  printf 'target tool' > "$GOROOT/pkg/tool/$target_tag/compile$exe"
fi
"#,
        exit_code = exit_code,
        host_tag = host.go_dir_tag(),
        host_os = host.os.as_str(),
        host_arch = host.arch.as_str(),
        version = VERSION,
    )
}

pub struct Fixture {
    pub root: PathBuf,
    pub origin: PathBuf,
    pub config: Config,
    pub host: Platform,
}

impl Fixture {
    /// Origin repo tagged [`VERSION`] with a driver exiting `exit_code`.
    pub fn new(root: &Path, exit_code: i32) -> Self {
        let host = Platform::host().unwrap();
        let origin = root.join("origin");
        fs::create_dir_all(origin.join("src")).unwrap();
        git(&origin, &["init", "-q"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(origin.join("VERSION"), format!("{VERSION}\n")).unwrap();
        fs::write(origin.join("a.txt"), "one\ntwo\nthree\n").unwrap();
        fs::write(origin.join("b.txt"), "alpha\nbravo\ngamma\n").unwrap();
        let driver = origin.join("src/make.bash");
        fs::write(&driver, driver_script(host, exit_code)).unwrap();
        fs::set_permissions(&driver, fs::Permissions::from_mode(0o755)).unwrap();
        git(&origin, &["add", "."]);
        git(&origin, &["commit", "-q", "-m", "initial"]);
        git(&origin, &["tag", VERSION]);

        let bootstrap = root.join("go-bootstrap");
        fs::create_dir_all(bootstrap.join("bin")).unwrap();

        let mut config = Config::defaults().unwrap();
        config.version = Some(VERSION.to_string());
        config.source_dir = root.join("go-src");
        config.bootstrap_dir = bootstrap;
        config.output_dir = root.join("output");
        config.endpoints.repository = format!("file://{}", origin.display());
        config.endpoints.version_url = "file:///unused/VERSION".to_string();
        config.endpoints.download_base = "file:///unused/dl".to_string();
        config.mirror = Mirror::Native;
        config.removal.delay = Duration::from_millis(10);

        Self {
            root: root.to_path_buf(),
            origin,
            config,
            host,
        }
    }

    pub fn builds(&self) -> Vec<String> {
        fs::read_to_string(self.root.join("builds.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn output_dirs(&self) -> Vec<String> {
        match fs::read_dir(&self.config.output_dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with("go-build-"))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub const MIXED_PATCH: &str = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
diff --git a/b.txt b/b.txt
--- a/b.txt
+++ b/b.txt
@@ -1,3 +1,3 @@
 alpha
-beta
+BETA
 gamma
";

/// Patches `a.txt` and a file the origin does not have.
pub const MISSING_FILE_PATCH: &str = "\
diff --git a/a.txt b/a.txt
--- a/a.txt
+++ b/a.txt
@@ -1,3 +1,3 @@
 one
-two
+TWO
 three
diff --git a/arch_only.s b/arch_only.s
--- a/arch_only.s
+++ b/arch_only.s
@@ -1,2 +1,2 @@
 TEXT
-old
+new
";
