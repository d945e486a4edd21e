//! gzip-compressed tar archives.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tar::{Archive, Builder, EntryType, Header};
use walkdir::WalkDir;

use super::permissions::{EntryKind, ModePolicy};

/// Archive `src_dir` into `out_path`, with every entry under `base_name/`.
///
/// Modes come from the filesystem on unix hosts. Elsewhere the
/// [`ModePolicy::Rules`] decide, since there are no execute bits to read.
pub fn create_tar_gz(src_dir: &Path, out_path: &Path, base_name: &str) -> Result<()> {
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let rules = ModePolicy::Rules {
        base_name: base_name.to_string(),
    };

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
        let mtime = md
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut header = Header::new_gnu();
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);

        if md.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_mode(file_mode(&md, &rules, &name, EntryKind::Directory));
            builder
                .append_data(&mut header, &name, std::io::empty())
                .with_context(|| format!("Failed to add {}", p.display()))?;
        } else if md.file_type().is_symlink() {
            let target = fs::read_link(&p)?;
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            header.set_mode(file_mode(&md, &rules, &name, EntryKind::Symlink));
            builder
                .append_link(&mut header, &name, &target)
                .with_context(|| format!("Failed to add {}", p.display()))?;
        } else if md.is_file() {
            let f = File::open(&p).with_context(|| format!("Failed to open {}", p.display()))?;
            header.set_entry_type(EntryType::Regular);
            header.set_size(md.len());
            header.set_mode(file_mode(&md, &rules, &name, EntryKind::File));
            builder
                .append_data(&mut header, &name, BufReader::new(f))
                .with_context(|| format!("Failed to add {}", p.display()))?;
        }
    }

    let encoder = builder
        .into_inner()
        .with_context(|| "Failed to finalize tar builder")?;
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .with_context(|| format!("Failed to finish {}", out_path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn file_mode(md: &fs::Metadata, _rules: &ModePolicy, _name: &str, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_md: &fs::Metadata, rules: &ModePolicy, name: &str, kind: EntryKind) -> u32 {
    let current = match kind {
        EntryKind::Symlink => 0o777,
        _ => 0o644,
    };
    rules.mode_for(name, kind, current)
}

/// Rewrite every entry's mode in place according to `policy`.
///
/// The new archive is written next to the old one and renamed over it, so a
/// failure leaves the original untouched.
pub fn rewrite_tar_gz_modes(archive_path: &Path, policy: &ModePolicy) -> Result<()> {
    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".rewrite-")
        .suffix(".tar.gz")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temp archive in {}", parent.display()))?;

    {
        let src = File::open(archive_path)
            .with_context(|| format!("Failed to open {}", archive_path.display()))?;
        let mut archive = Archive::new(GzDecoder::new(BufReader::new(src)));
        let encoder = GzEncoder::new(BufWriter::new(tmp.as_file()), Compression::default());
        let mut builder = Builder::new(encoder);

        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read {}", archive_path.display()))?
        {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let mut header = entry.header().clone();
            let entry_type = header.entry_type();
            let kind = if entry_type.is_dir() {
                EntryKind::Directory
            } else if entry_type.is_file() {
                EntryKind::File
            } else if entry_type.is_symlink() {
                EntryKind::Symlink
            } else {
                EntryKind::Other
            };
            let current = header.mode().unwrap_or(0o644);
            header.set_mode(policy.mode_for(&name, kind, current));

            if entry_type.is_symlink() || entry_type.is_hard_link() {
                let target = entry
                    .link_name()?
                    .map(|t| t.into_owned())
                    .unwrap_or_default();
                builder.append_link(&mut header, &name, &target)?;
            } else {
                builder.append_data(&mut header, &name, &mut entry)?;
            }
        }

        let encoder = builder
            .into_inner()
            .with_context(|| "Failed to finalize tar builder")?;
        encoder.finish()?.flush()?;
    }

    tmp.persist(archive_path)
        .with_context(|| format!("Failed to replace {}", archive_path.display()))?;
    Ok(())
}

/// Unpack `archive_path` into `dest`, keeping recorded modes.
pub fn unpack_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
    let f = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(f)));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .with_context(|| format!("Failed to unpack {}", archive_path.display()))?;
    Ok(())
}
