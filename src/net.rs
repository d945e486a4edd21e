//! Blocking HTTP access for version lookup, bootstrap archives and patches.
//!
//! `file://` URLs are read from disk, so every endpoint can be pointed at a
//! local mirror.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const USER_AGENT: &str = concat!("go-builder/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper over a blocking reqwest client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }

    /// Body of `url` as text.
    pub fn get_text(&self, url: &str) -> Result<String> {
        if let Some(path) = local_path(url) {
            return fs::read_to_string(&path)
                .with_context(|| format!("reading '{}'", path.display()));
        }

        debug!(url, "GET");
        self.client
            .get(url)
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("requesting {url}"))?
            .text()
            .with_context(|| format!("reading response from {url}"))
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    pub fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(path) = local_path(url) {
            return fs::copy(&path, dest).with_context(|| {
                format!("copying '{}' to '{}'", path.display(), dest.display())
            });
        }

        debug!(url, dest = %dest.display(), "downloading");
        let mut res = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("requesting {url}"))?;

        let out = File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut writer = BufWriter::new(out);
        let written = io::copy(&mut res, &mut writer)
            .with_context(|| format!("downloading {url}"))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        if written == 0 {
            bail!("{url} returned an empty body");
        }
        Ok(written)
    }
}

fn local_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix("file://").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_urls_are_read_from_disk() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("VERSION");
        fs::write(&src, "go1.23.5\ntime 2025-01-16T19:15:23Z\n").unwrap();
        let url = format!("file://{}", src.display());

        let client = HttpClient::new().unwrap();
        assert!(client.get_text(&url).unwrap().starts_with("go1.23.5"));

        let dest = temp.path().join("copy");
        let n = client.download(&url, &dest).unwrap();
        assert_eq!(n, fs::metadata(&src).unwrap().len());
    }

    #[test]
    fn missing_local_file_is_an_error() {
        let client = HttpClient::new().unwrap();
        assert!(client.get_text("file:///no/such/VERSION").is_err());
    }
}
