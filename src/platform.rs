//! Target platforms: the `GOOS`/`GOARCH` pair a build is run for.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// Operating systems a toolchain can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOs {
    Windows,
    Linux,
    Darwin,
}

impl TargetOs {
    /// The `GOOS` value.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetOs::Windows => "windows",
            TargetOs::Linux => "linux",
            TargetOs::Darwin => "darwin",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "windows" | "win" => Some(TargetOs::Windows),
            "linux" => Some(TargetOs::Linux),
            "darwin" | "macos" => Some(TargetOs::Darwin),
            _ => None,
        }
    }
}

/// CPU architectures a toolchain can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetArch {
    Amd64,
    Arm64,
    I386,
}

impl TargetArch {
    /// The `GOARCH` value.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetArch::Amd64 => "amd64",
            TargetArch::Arm64 => "arm64",
            TargetArch::I386 => "386",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "amd64" | "x86_64" | "x64" => Some(TargetArch::Amd64),
            "arm64" | "aarch64" => Some(TargetArch::Arm64),
            "386" | "i386" | "x86" => Some(TargetArch::I386),
            _ => None,
        }
    }
}

/// Distributable archive format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// A `GOOS`/`GOARCH` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: TargetOs,
    pub arch: TargetArch,
}

impl Platform {
    pub fn new(os: TargetOs, arch: TargetArch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary was compiled for.
    pub fn host() -> Result<Self> {
        let os = if cfg!(target_os = "windows") {
            TargetOs::Windows
        } else if cfg!(target_os = "linux") {
            TargetOs::Linux
        } else if cfg!(target_os = "macos") {
            TargetOs::Darwin
        } else {
            bail!("unsupported host operating system '{}'", std::env::consts::OS);
        };

        let arch = match TargetArch::parse(std::env::consts::ARCH) {
            Some(arch) => arch,
            None => bail!(
                "unsupported host architecture '{}'",
                std::env::consts::ARCH
            ),
        };

        Ok(Self { os, arch })
    }

    /// Suffix of executables on this platform.
    pub fn exe_suffix(&self) -> &'static str {
        match self.os {
            TargetOs::Windows => ".exe",
            _ => "",
        }
    }

    /// File name of a tool binary, e.g. `go.exe`.
    pub fn executable_name(&self, tool: &str) -> String {
        format!("{}{}", tool, self.exe_suffix())
    }

    /// Directory tag the Go build uses for cross-compiled output,
    /// e.g. `linux_amd64` in `bin/linux_amd64/`.
    pub fn go_dir_tag(&self) -> String {
        format!("{}_{}", self.os.as_str(), self.arch.as_str())
    }

    /// Per-platform output directory name, e.g. `go-build-linux-amd64`.
    pub fn output_dir_name(&self, prefix: &str) -> String {
        format!("{}-{}-{}", prefix, self.os.as_str(), self.arch.as_str())
    }

    pub fn archive_format(&self) -> ArchiveFormat {
        match self.os {
            TargetOs::Windows => ArchiveFormat::Zip,
            _ => ArchiveFormat::TarGz,
        }
    }

    /// Distributable archive name, e.g. `go1.23.5.linux-amd64.tar.gz`.
    pub fn archive_file_name(&self, version: &str) -> String {
        format!(
            "{}.{}-{}.{}",
            version,
            self.os.as_str(),
            self.arch.as_str(),
            self.archive_format().extension()
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    /// Accepts `windows`, `linux`, `darwin` (architecture defaults to
    /// `amd64`) or an explicit `<os>-<arch>` / `<os>/<arch>` / `<os>_<arch>`.
    fn from_str(raw: &str) -> Result<Self> {
        let token = raw.trim().to_ascii_lowercase();
        // Split on the first separator only; `x86_64` keeps its underscore.
        let (os_part, arch_part) = match token.split_once(['-', '/', '_']) {
            Some((os, arch)) => (os, Some(arch)),
            None => (token.as_str(), None),
        };

        let Some(os) = TargetOs::parse(os_part) else {
            bail!(
                "unsupported platform '{}'; expected windows, linux, darwin or <os>-<arch>",
                raw
            );
        };

        let arch = match arch_part {
            None => TargetArch::Amd64,
            Some(arch) => match TargetArch::parse(arch) {
                Some(arch) => arch,
                None => bail!(
                    "unsupported platform '{}': unknown architecture '{}' (expected amd64, arm64 or 386)",
                    raw,
                    arch
                ),
            },
        };

        Ok(Self { os, arch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_os_tokens() {
        let p: Platform = "linux".parse().unwrap();
        assert_eq!(p, Platform::new(TargetOs::Linux, TargetArch::Amd64));

        let p: Platform = "Windows".parse().unwrap();
        assert_eq!(p, Platform::new(TargetOs::Windows, TargetArch::Amd64));
    }

    #[test]
    fn parses_os_arch_pairs() {
        assert_eq!(
            "linux-arm64".parse::<Platform>().unwrap(),
            Platform::new(TargetOs::Linux, TargetArch::Arm64)
        );
        assert_eq!(
            "darwin/arm64".parse::<Platform>().unwrap(),
            Platform::new(TargetOs::Darwin, TargetArch::Arm64)
        );
        assert_eq!(
            "linux_x86_64".parse::<Platform>().unwrap(),
            Platform::new(TargetOs::Linux, TargetArch::Amd64)
        );
        assert_eq!(
            "windows-386".parse::<Platform>().unwrap(),
            Platform::new(TargetOs::Windows, TargetArch::I386)
        );
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert!("plan9".parse::<Platform>().is_err());
        assert!("linux-mips".parse::<Platform>().is_err());
        assert!("".parse::<Platform>().is_err());
    }

    #[test]
    fn output_dir_name_is_prefix_os_arch() {
        let p = Platform::new(TargetOs::Linux, TargetArch::Amd64);
        assert_eq!(p.output_dir_name("go-build"), "go-build-linux-amd64");
        let p = Platform::new(TargetOs::Windows, TargetArch::Amd64);
        assert_eq!(p.output_dir_name("go-build"), "go-build-windows-amd64");
    }

    #[test]
    fn archive_names_follow_release_convention() {
        let linux = Platform::new(TargetOs::Linux, TargetArch::Amd64);
        assert_eq!(
            linux.archive_file_name("go1.23.5"),
            "go1.23.5.linux-amd64.tar.gz"
        );
        let windows = Platform::new(TargetOs::Windows, TargetArch::Amd64);
        assert_eq!(
            windows.archive_file_name("go1.23.5"),
            "go1.23.5.windows-amd64.zip"
        );
    }

    #[test]
    fn executable_suffix_depends_on_os() {
        let windows = Platform::new(TargetOs::Windows, TargetArch::Amd64);
        let linux = Platform::new(TargetOs::Linux, TargetArch::Arm64);
        assert_eq!(windows.executable_name("go"), "go.exe");
        assert_eq!(linux.executable_name("go"), "go");
        assert_eq!(linux.go_dir_tag(), "linux_arm64");
    }

    #[test]
    fn host_round_trips_through_display() {
        if let Ok(host) = Platform::host() {
            let parsed: Platform = host.to_string().parse().unwrap();
            assert_eq!(parsed, host);
        }
    }
}
