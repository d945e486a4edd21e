use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod workflows;

use workflows::{BuildArgs, CleanArgs, PackageArgs};

#[derive(Parser)]
#[command(author, version, about = "Build, stage and package the Go toolchain", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file.
    #[arg(global = true, long, short)]
    config: Option<PathBuf>,

    #[arg(default_value_t = Level::INFO, global = true, long)]
    level: Level,
}

#[derive(Subcommand)]
enum Command {
    /// Run the whole pipeline.
    Build(BuildArgs),

    /// Print the version a build would use.
    ResolveVersion {
        #[arg(long)]
        version: Option<String>,
    },

    /// Package an existing output directory.
    Package(PackageArgs),

    /// Remove directories, retrying through locked files.
    Clean(CleanArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut subscriber = FmtSubscriber::builder()
        .with_max_level(cli.level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if [Level::DEBUG, Level::TRACE].contains(&cli.level) {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    tracing::subscriber::set_global_default(subscriber.finish())
        .context("setting default subscriber")?;

    let config = cli.config.as_deref();
    match cli.command {
        Command::Build(args) => workflows::build(config, args),
        Command::ResolveVersion { version } => workflows::resolve_version(config, version),
        Command::Package(args) => workflows::package(config, args),
        Command::Clean(args) => workflows::clean(config, args),
    }
}
