//! Stale-process sweep.
//!
//! An interrupted build can leave compiler processes running from the source
//! or output trees, and on Windows those hold files open long enough to break
//! the next run. Before syncing, the sweep finds such processes and kills
//! them.
//!
//! Discovery is an ordered list of strategies: match on executable path
//! first, and when that cannot be done on this host, fall back to matching
//! well-known tool names.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::process::Cmd;

/// Tool names matched by [`ByName`].
pub const TOOL_NAMES: &[&str] = &["go", "gofmt", "compile", "link", "asm", "cgo", "vet"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleProcess {
    pub pid: u32,
    pub name: String,
    pub executable: Option<PathBuf>,
}

/// One way of finding stale processes.
pub trait ProcessDiscovery {
    fn name(&self) -> &'static str;
    fn discover(&self, roots: &[PathBuf]) -> Result<Vec<StaleProcess>>;
}

/// Processes whose executable lives under one of the roots.
pub struct ByExecutablePath;

impl ProcessDiscovery for ByExecutablePath {
    fn name(&self) -> &'static str {
        "executable-path"
    }

    fn discover(&self, roots: &[PathBuf]) -> Result<Vec<StaleProcess>> {
        let roots: Vec<PathBuf> = roots
            .iter()
            .filter_map(|r| fs::canonicalize(r).ok())
            .collect();
        let all = list_with_paths()?;
        Ok(all
            .into_iter()
            .filter(|p| {
                p.executable
                    .as_deref()
                    .is_some_and(|exe| roots.iter().any(|root| exe.starts_with(root)))
            })
            .collect())
    }
}

/// Processes named like Go toolchain binaries, wherever they run from.
pub struct ByName {
    pub names: &'static [&'static str],
}

impl Default for ByName {
    fn default() -> Self {
        Self { names: TOOL_NAMES }
    }
}

impl ProcessDiscovery for ByName {
    fn name(&self) -> &'static str {
        "tool-name"
    }

    fn discover(&self, _roots: &[PathBuf]) -> Result<Vec<StaleProcess>> {
        let all = list_with_names()?;
        Ok(all
            .into_iter()
            .filter(|p| {
                let bare = p.name.strip_suffix(".exe").unwrap_or(&p.name);
                self.names.contains(&bare)
            })
            .collect())
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub strategy: &'static str,
    pub killed: Vec<StaleProcess>,
}

/// Find stale processes under `roots` with the default strategies and kill
/// them. Failure to kill one process is a warning.
pub fn sweep_stale_processes(roots: &[PathBuf]) -> Result<SweepReport> {
    let by_path = ByExecutablePath;
    let by_name = ByName::default();
    let (strategy, found) = discover_with(&[&by_path, &by_name], roots)?;

    let own_pid = std::process::id();
    let mut killed = Vec::new();
    for process in found.into_iter().filter(|p| p.pid != own_pid) {
        match kill(process.pid) {
            Ok(()) => {
                info!(pid = process.pid, name = %process.name, "killed stale process");
                killed.push(process);
            }
            Err(e) => warn!(pid = process.pid, name = %process.name, "could not kill: {e:#}"),
        }
    }
    Ok(SweepReport { strategy, killed })
}

/// Run strategies in order; the first that can enumerate processes wins.
pub fn discover_with(
    strategies: &[&dyn ProcessDiscovery],
    roots: &[PathBuf],
) -> Result<(&'static str, Vec<StaleProcess>)> {
    for strategy in strategies {
        match strategy.discover(roots) {
            Ok(found) => {
                info!(
                    strategy = strategy.name(),
                    found = found.len(),
                    "stale process discovery finished"
                );
                return Ok((strategy.name(), found));
            }
            Err(e) => warn!(
                strategy = strategy.name(),
                "process discovery failed, falling back: {e:#}"
            ),
        }
    }
    bail!("no process discovery strategy succeeded")
}

#[cfg(target_os = "linux")]
fn list_with_paths() -> Result<Vec<StaleProcess>> {
    let mut out = Vec::new();
    for entry in fs::read_dir("/proc").context("reading /proc")? {
        let entry = entry?;
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        // Other users' processes and kernel threads have no readable exe.
        let Ok(exe) = fs::read_link(entry.path().join("exe")) else {
            continue;
        };
        let name = exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push(StaleProcess {
            pid,
            name,
            executable: Some(exe),
        });
    }
    Ok(out)
}

#[cfg(windows)]
fn list_with_paths() -> Result<Vec<StaleProcess>> {
    let result = Cmd::new("powershell")
        .args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "Get-CimInstance Win32_Process | Select-Object ProcessId,Name,ExecutablePath | ConvertTo-Json -Compress",
        ])
        .error_msg("process query failed")
        .run()?;
    parse_cim_json(&result.stdout)
}

#[cfg(not(any(target_os = "linux", windows)))]
fn list_with_paths() -> Result<Vec<StaleProcess>> {
    bail!("executable-path discovery is not supported on this host")
}

#[cfg(windows)]
fn list_with_names() -> Result<Vec<StaleProcess>> {
    let result = Cmd::new("tasklist")
        .args(["/FO", "CSV", "/NH"])
        .error_msg("tasklist failed")
        .run()?;
    Ok(parse_tasklist_csv(&result.stdout))
}

#[cfg(not(windows))]
fn list_with_names() -> Result<Vec<StaleProcess>> {
    let result = Cmd::new("ps")
        .args(["-axo", "pid=,comm="])
        .error_msg("ps failed")
        .run()?;
    Ok(parse_ps_output(&result.stdout))
}

#[cfg(unix)]
fn kill(pid: u32) -> Result<()> {
    let pid = libc::pid_t::try_from(pid).context("pid out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error()).context("kill failed");
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill(pid: u32) -> Result<()> {
    Cmd::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .error_msg("taskkill failed")
        .run()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimProcess {
    process_id: u32,
    name: Option<String>,
    executable_path: Option<String>,
}

/// `ConvertTo-Json` emits a bare object for one process and an array for
/// several.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CimOutput {
    Many(Vec<CimProcess>),
    One(CimProcess),
}

pub fn parse_cim_json(raw: &str) -> Result<Vec<StaleProcess>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: CimOutput = serde_json::from_str(raw).context("parsing process list JSON")?;
    let list = match parsed {
        CimOutput::Many(list) => list,
        CimOutput::One(one) => vec![one],
    };
    Ok(list
        .into_iter()
        .map(|p| StaleProcess {
            pid: p.process_id,
            name: p.name.unwrap_or_default(),
            executable: p.executable_path.filter(|s| !s.is_empty()).map(PathBuf::from),
        })
        .collect())
}

/// Parse `tasklist /FO CSV /NH` lines: `"go.exe","1234",...`.
pub fn parse_tasklist_csv(raw: &str) -> Vec<StaleProcess> {
    raw.lines()
        .filter_map(|line| {
            let mut fields = line.split("\",\"");
            let name = fields.next()?.trim().trim_start_matches('"').to_string();
            let pid = fields.next()?.trim_matches('"').parse().ok()?;
            Some(StaleProcess {
                pid,
                name,
                executable: None,
            })
        })
        .collect()
}

/// Parse `ps -axo pid=,comm=` output. `comm` may be a full path.
pub fn parse_ps_output(raw: &str) -> Vec<StaleProcess> {
    raw.lines()
        .filter_map(|line| {
            let (pid, comm) = line.trim().split_once(char::is_whitespace)?;
            let pid = pid.parse().ok()?;
            let comm = comm.trim();
            let name = Path::new(comm)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| comm.to_string());
            Some(StaleProcess {
                pid,
                name,
                executable: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    impl ProcessDiscovery for Unavailable {
        fn name(&self) -> &'static str {
            "executable-path"
        }
        fn discover(&self, _roots: &[PathBuf]) -> Result<Vec<StaleProcess>> {
            bail!("Get-CimInstance is not recognized")
        }
    }

    struct Fixed(Vec<StaleProcess>);

    impl ProcessDiscovery for Fixed {
        fn name(&self) -> &'static str {
            "tool-name"
        }
        fn discover(&self, _roots: &[PathBuf]) -> Result<Vec<StaleProcess>> {
            Ok(self.0.clone())
        }
    }

    fn compile(pid: u32) -> StaleProcess {
        StaleProcess {
            pid,
            name: "compile.exe".into(),
            executable: None,
        }
    }

    #[test]
    fn falls_back_to_next_strategy() {
        let fallback = Fixed(vec![compile(42)]);
        let (strategy, found) = discover_with(&[&Unavailable, &fallback], &[]).unwrap();
        assert_eq!(strategy, "tool-name");
        assert_eq!(found, vec![compile(42)]);
    }

    #[test]
    fn fails_when_every_strategy_fails() {
        assert!(discover_with(&[&Unavailable], &[]).is_err());
    }

    #[test]
    fn parses_single_and_multiple_cim_objects() {
        let one = r#"{"ProcessId":10,"Name":"go.exe","ExecutablePath":"C:\\go-src\\bin\\go.exe"}"#;
        let parsed = parse_cim_json(one).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].pid, 10);
        assert_eq!(
            parsed[0].executable,
            Some(PathBuf::from("C:\\go-src\\bin\\go.exe"))
        );

        let many = r#"[{"ProcessId":4,"Name":"System","ExecutablePath":null},
                       {"ProcessId":11,"Name":"link.exe","ExecutablePath":""}]"#;
        let parsed = parse_cim_json(many).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "link.exe");
        assert_eq!(parsed[1].executable, None);

        assert!(parse_cim_json("").unwrap().is_empty());
        assert!(parse_cim_json("not json").is_err());
    }

    #[test]
    fn parses_tasklist_rows() {
        let raw = "\"go.exe\",\"1234\",\"Console\",\"1\",\"10,240 K\"\r\n\"svchost.exe\",\"88\",\"Services\",\"0\",\"5,000 K\"\r\n";
        let parsed = parse_tasklist_csv(raw);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "go.exe");
        assert_eq!(parsed[0].pid, 1234);
    }

    #[test]
    fn parses_ps_rows() {
        let raw = "    1 init\n  812 /usr/local/go/bin/go\n  900 compile\n";
        let parsed = parse_ps_output(raw);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].name, "go");
        assert_eq!(parsed[2].pid, 900);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn finds_and_kills_process_running_from_root() {
        let Ok(sleep) = which::which("sleep") else {
            return;
        };
        let temp = tempfile::TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let copy = bin.join("compile");
        fs::copy(&sleep, &copy).unwrap();

        let mut child = std::process::Command::new(&copy).arg("30").spawn().unwrap();

        let found = ByExecutablePath
            .discover(&[temp.path().to_path_buf()])
            .unwrap();
        assert!(found.iter().any(|p| p.pid == child.id()), "{found:?}");

        let report = sweep_stale_processes(&[temp.path().to_path_buf()]).unwrap();
        assert_eq!(report.strategy, "executable-path");
        assert!(report.killed.iter().any(|p| p.pid == child.id()));
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
