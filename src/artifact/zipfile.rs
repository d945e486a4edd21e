//! zip archives, used for Windows distributables.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive `src_dir` into `out_path`, with every entry under `base_name/`.
pub fn create_zip(src_dir: &Path, out_path: &Path, base_name: &str) -> Result<()> {
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<PathBuf> = vec![];
    for ent in WalkDir::new(src_dir).follow_links(false) {
        let ent = ent.with_context(|| format!("walking {}", src_dir.display()))?;
        entries.push(ent.path().to_path_buf());
    }
    entries.sort();

    for p in entries {
        let rel = p
            .strip_prefix(src_dir)
            .unwrap_or(&p)
            .to_string_lossy()
            .replace('\\', "/");
        let name = if rel.is_empty() {
            base_name.to_string()
        } else {
            format!("{base_name}/{rel}")
        };

        let md = fs::symlink_metadata(&p)
            .with_context(|| format!("Failed to stat {}", p.display()))?;
        if md.is_dir() {
            writer
                .add_directory(name.as_str(), options.unix_permissions(0o755))
                .with_context(|| format!("Failed to add {}", p.display()))?;
        } else if md.file_type().is_symlink() {
            let target = fs::read_link(&p)?;
            writer
                .add_symlink(
                    name.as_str(),
                    target.to_string_lossy().replace('\\', "/"),
                    options,
                )
                .with_context(|| format!("Failed to add {}", p.display()))?;
        } else if md.is_file() {
            writer
                .start_file(name.as_str(), options.unix_permissions(unix_mode(&md)))
                .with_context(|| format!("Failed to add {}", p.display()))?;
            let mut f = BufReader::new(
                File::open(&p).with_context(|| format!("Failed to open {}", p.display()))?,
            );
            io::copy(&mut f, &mut writer)
                .with_context(|| format!("Failed to write {}", p.display()))?;
        }
    }

    writer
        .finish()
        .with_context(|| format!("Failed to finish {}", out_path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn unix_mode(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn unix_mode(_md: &fs::Metadata) -> u32 {
    0o644
}

/// Extract every entry of `archive_path` into `dest`.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let f = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(f))
        .with_context(|| format!("Failed to read {}", archive_path.display()))?;
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
    archive
        .extract(dest)
        .with_context(|| format!("Failed to extract {}", archive_path.display()))?;
    Ok(())
}
