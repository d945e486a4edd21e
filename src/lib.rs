//! Build automation for the Go toolchain.
//!
//! Resolves a release version, fetches a bootstrap toolchain, keeps a single
//! source checkout up to date, optionally patches it, then builds, stages,
//! verifies and packages the toolchain for each requested platform.
//!
//! # Architecture
//!
//! ```text
//! go-builder (binary)
//!     │
//!     ├── config      Defaults + TOML file + CLI flags
//!     ├── pipeline    Stage ordering, run report
//!     │     │
//!     │     └── stages    version, bootstrap, source, patch,
//!     │                   build, stage_output, verify, package
//!     │
//!     ├── artifact    Robust removal, mirroring, tar.gz / zip,
//!     │               permission-fix chain
//!     ├── process     External commands with typed results
//!     ├── net         Blocking HTTP (and file://) downloads
//!     ├── sweep       Stale-process discovery and kill
//!     ├── lock        One run per output directory
//!     └── preflight   Host tool checks
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use go_builder::config::Config;
//!
//! let mut config = Config::load(None)?;
//! config.set_platforms(vec!["linux".parse()?, "windows".parse()?])?;
//! let report = go_builder::pipeline::run(&config)?;
//! for platform in &report.platforms {
//!     println!("{:?}", platform.archive);
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod lock;
pub mod net;
pub mod pipeline;
pub mod platform;
pub mod preflight;
pub mod process;
pub mod stages;
pub mod sweep;

pub use config::Config;
pub use platform::{ArchiveFormat, Platform, TargetArch, TargetOs};
