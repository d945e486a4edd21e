//! Version resolution.

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::net::HttpClient;

/// The version to build: `explicit` when given, otherwise the first line of
/// the plaintext endpoint at `url`.
pub fn resolve_version(explicit: Option<&str>, client: &HttpClient, url: &str) -> Result<String> {
    if let Some(version) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
        info!(version, "using requested version");
        return Ok(version.to_string());
    }

    let body = client
        .get_text(url)
        .with_context(|| format!("resolving latest version from {url}"))?;
    let version = parse_version_text(&body)
        .with_context(|| format!("resolving latest version from {url}"))?;
    info!(version = %version, "resolved latest version");
    Ok(version)
}

/// First line of a version endpoint response, trimmed.
pub fn parse_version_text(body: &str) -> Result<String> {
    let first = body.lines().next().map(str::trim).unwrap_or_default();
    if first.is_empty() {
        bail!("version endpoint returned an empty response");
    }
    Ok(first.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn takes_first_line_only() {
        let body = "go1.23.5\ntime 2025-01-16T19:15:23Z\n";
        assert_eq!(parse_version_text(body).unwrap(), "go1.23.5");
        assert_eq!(parse_version_text("  go1.22.0  \r\n").unwrap(), "go1.22.0");
    }

    #[test]
    fn empty_response_is_fatal() {
        assert!(parse_version_text("").is_err());
        assert!(parse_version_text("\n\ngo1.23.5").is_err());
    }

    #[test]
    fn explicit_version_skips_the_network() {
        let client = HttpClient::new().unwrap();
        let version =
            resolve_version(Some("go1.21.13"), &client, "file:///no/such/endpoint").unwrap();
        assert_eq!(version, "go1.21.13");
    }

    #[test]
    fn resolves_from_endpoint() {
        let temp = TempDir::new().unwrap();
        let endpoint = temp.path().join("VERSION");
        fs::write(&endpoint, "go1.23.5\ntime 2025-01-16T19:15:23Z\n").unwrap();

        let client = HttpClient::new().unwrap();
        let url = format!("file://{}", endpoint.display());
        assert_eq!(resolve_version(None, &client, &url).unwrap(), "go1.23.5");
        assert_eq!(resolve_version(Some("  "), &client, &url).unwrap(), "go1.23.5");
    }

    #[test]
    fn unreachable_endpoint_is_fatal() {
        let client = HttpClient::new().unwrap();
        let err = resolve_version(None, &client, "file:///no/such/endpoint").unwrap_err();
        assert!(format!("{err:#}").contains("resolving latest version"));
    }
}
