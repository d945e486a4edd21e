use std::path::Path;

use anyhow::Result;
use go_builder::config::Config;
use go_builder::net::HttpClient;
use go_builder::pipeline;
use go_builder::stages::version;

use super::BuildArgs;

pub(crate) fn build(config_path: Option<&Path>, args: BuildArgs) -> Result<()> {
    let mut config = Config::load(config_path)?;
    args.apply(&mut config)?;

    let report = pipeline::run(&config)?;

    println!(
        "Built {} for {} platform(s)",
        report.version.as_deref().unwrap_or("unknown version"),
        report.platforms.len()
    );
    for platform in &report.platforms {
        if let Some(archive) = &platform.archive {
            println!("  {}: {}", platform.platform, archive.display());
        }
        if let Some(version) = &platform.version_output {
            println!("    {version}");
        }
    }
    Ok(())
}

pub(crate) fn resolve_version(config_path: Option<&Path>, explicit: Option<String>) -> Result<()> {
    let config = Config::load(config_path)?;
    let client = HttpClient::new()?;
    let explicit = explicit.or(config.version);
    let resolved = version::resolve_version(
        explicit.as_deref(),
        &client,
        &config.endpoints.version_url,
    )?;
    println!("{resolved}");
    Ok(())
}
