//! Archive extraction for downloaded toolchain packages.
//!
//! Downloads are untrusted: entries that would land outside the destination
//! (absolute paths, `..` components, links) are skipped rather than written.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use super::types::ArchiveFormat;
use crate::plog;

// ============================================================================
// Archive Extraction
// ============================================================================

/// Extracts an archive into `dest_dir` and returns `dest_dir`.
///
/// The format is inferred from the archive's file name. Any previous contents
/// of `dest_dir` are removed first so a half-finished extraction never
/// survives into the next run.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let format = ArchiveFormat::from_path(&name)
        .ok_or_else(|| anyhow::anyhow!("Unsupported archive format: {}", archive_path.display()))?;

    plog!("extracting", archive_path.display(), "to", dest_dir.display());

    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir)
            .with_context(|| format!("Failed to clear {}", dest_dir.display()))?;
    }
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest_dir)?,
    }

    plog!("extracted archive");
    Ok(dest_dir.to_path_buf())
}

/// Runs [`extract_archive`] on the blocking thread pool.
pub async fn extract_archive_async(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(&archive_path, &dest_dir))
        .await
        .context("Extraction task panicked")?
}

// ============================================================================
// ZIP Extraction
// ============================================================================

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open zip: {}", archive_path.display()))?;

    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip: {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                warn!("Skipping unsafe path in zip: {}", entry.name());
                continue;
            }
        };

        let dest_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)
                .with_context(|| format!("Failed to create: {}", dest_path.display()))?;

            io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            set_unix_permissions(&dest_path, entry.unix_mode())?;
        }
    }

    debug!("ZIP extraction complete");
    Ok(())
}

// ============================================================================
// TAR.GZ Extraction
// ============================================================================

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open tar.gz: {}", archive_path.display()))?;

    // Release tarballs are occasionally built from concatenated gzip members.
    let decoder = flate2::read::MultiGzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest_dir)
}

fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let dest_dir_canonical = dest_dir
        .canonicalize()
        .unwrap_or_else(|_| dest_dir.to_path_buf());

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping symlink/hardlink in tar archive");
            continue;
        }

        let path = entry.path()?.into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            warn!("Skipping unsafe path in tar: {:?}", path);
            continue;
        }

        let dest_path = dest_dir.join(&path);

        let dest_canonical = if dest_path.exists() {
            dest_path.canonicalize()?
        } else if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
            let parent_canonical = parent.canonicalize()?;
            parent_canonical.join(dest_path.file_name().unwrap_or_default())
        } else {
            dest_path.clone()
        };

        if !dest_canonical.starts_with(&dest_dir_canonical) {
            warn!(
                "Skipping path that escapes dest_dir: {:?} -> {:?}",
                path, dest_canonical
            );
            continue;
        }

        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&dest_path)
                .with_context(|| format!("Failed to create: {}", dest_path.display()))?;
            io::copy(&mut entry, &mut outfile)?;
            outfile.flush()?;

            #[cfg(unix)]
            {
                if let Ok(mode) = entry.header().mode() {
                    set_unix_permissions(&dest_path, Some(mode))?;
                }
            }
        } else {
            // pax headers, fifos, device nodes
            debug!("Skipping tar entry {:?} of type {:?}", path, entry_type);
        }
    }

    debug!("TAR extraction complete");
    Ok(())
}

// ============================================================================
// Unix Permissions
// ============================================================================

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        if mode & 0o111 != 0 {
            let permissions = fs::Permissions::from_mode(mode | 0o755);
            fs::set_permissions(path, permissions)
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }
    }

    Ok(())
}

/// Sets executable permission on a file (Unix only).
///
/// On Windows, this is a no-op.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to get metadata for {}", path.display()))?;

        let mut permissions = metadata.permissions();
        let current_mode = permissions.mode();
        permissions.set_mode(current_mode | 0o755);

        fs::set_permissions(path, permissions).with_context(|| {
            format!("Failed to set executable permission on {}", path.display())
        })?;

        debug!("Set executable permission on {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    /// Writes entries with raw names; `Header::set_path` refuses unsafe ones.
    fn write_raw_tar_gz(path: &Path, entries: &[(&[u8], &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, data) in entries {
            let mut header = tar::Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_tar_skips_parent_dir_and_absolute_entries() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("git-2.45.0.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");
        let absolute = temp_dir.path().join("absolute.txt");
        let absolute_name = absolute.to_string_lossy().into_owned();

        write_raw_tar_gz(
            &archive_path,
            &[
                (b"../escaped.txt", b"outside"),
                (absolute_name.as_bytes(), b"outside"),
                (b"git-2.45.0/Makefile", b"all:"),
            ],
        );

        extract_archive(&archive_path, &extract_dir).unwrap();

        assert!(!temp_dir.path().join("escaped.txt").exists());
        assert!(!absolute.exists());
        assert_eq!(
            fs::read_to_string(extract_dir.join("git-2.45.0/Makefile")).unwrap(),
            "all:"
        );
    }

    #[test]
    fn test_zip_skips_entries_outside_destination() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("MinGit-2.45.0-64-bit.zip");
        let extract_dir = temp_dir.path().join("extracted");

        {
            let file = File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);

            zip.start_file("../escaped.txt", options).unwrap();
            zip.write_all(b"outside").unwrap();

            zip.start_file("cmd/git.exe", options).unwrap();
            zip.write_all(b"MZ").unwrap();

            zip.finish().unwrap();
        }

        extract_archive(&archive_path, &extract_dir).unwrap();

        assert!(!temp_dir.path().join("escaped.txt").exists());
        assert!(extract_dir.join("cmd/git.exe").exists());
    }

    #[test]
    fn test_extract_zip_nested() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("MinGit-2.45.0-64-bit.zip");
        let extract_dir = temp_dir.path().join("extracted");

        {
            let file = File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);

            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);

            zip.start_file("cmd/git.exe", options).unwrap();
            zip.write_all(b"MZ fake git").unwrap();

            zip.start_file("etc/gitconfig", options).unwrap();
            zip.write_all(b"[core]").unwrap();

            zip.finish().unwrap();
        }

        let out = extract_archive(&archive_path, &extract_dir).unwrap();
        assert_eq!(out, extract_dir);

        assert!(extract_dir.join("cmd/git.exe").exists());
        let content = fs::read_to_string(extract_dir.join("etc/gitconfig")).unwrap();
        assert_eq!(content, "[core]");
    }

    #[test]
    fn test_extract_tar_gz_nested() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("yarn-v1.22.19.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");

        write_tar_gz(
            &archive_path,
            &[
                ("yarn-v1.22.19/bin/yarn.js", b"#!/usr/bin/env node", 0o755),
                ("yarn-v1.22.19/package.json", b"{}", 0o644),
            ],
        );

        extract_archive(&archive_path, &extract_dir).unwrap();

        let yarn_js = extract_dir.join("yarn-v1.22.19/bin/yarn.js");
        assert!(yarn_js.exists());
        assert_eq!(
            fs::read_to_string(extract_dir.join("yarn-v1.22.19/package.json")).unwrap(),
            "{}"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&yarn_js).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0, "executable bit should be preserved");
        }
    }

    #[test]
    fn test_extract_replaces_previous_contents() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("pkg.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");

        fs::create_dir_all(&extract_dir).unwrap();
        fs::write(extract_dir.join("leftover.txt"), "stale").unwrap();

        write_tar_gz(&archive_path, &[("fresh.txt", b"new", 0o644)]);
        extract_archive(&archive_path, &extract_dir).unwrap();

        assert!(extract_dir.join("fresh.txt").exists());
        assert!(!extract_dir.join("leftover.txt").exists());
    }

    #[test]
    fn test_extract_unknown_format_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("rustup-init.sh");
        fs::write(&archive_path, "#!/bin/sh").unwrap();

        let err = extract_archive(&archive_path, &temp_dir.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("Unsupported archive format"));
    }

    #[test]
    fn test_extract_corrupt_archive_fails() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("broken.tar.gz");
        fs::write(&archive_path, b"definitely not gzip").unwrap();

        assert!(extract_archive(&archive_path, &temp_dir.path().join("out")).is_err());
    }

    #[tokio::test]
    async fn test_extract_archive_async() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("pkg.tgz");
        let extract_dir = temp_dir.path().join("extracted");

        write_tar_gz(&archive_path, &[("hello.txt", b"hi", 0o644)]);

        extract_archive_async(&archive_path, &extract_dir)
            .await
            .unwrap();
        assert!(extract_dir.join("hello.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("rustup-init.sh");

        {
            let mut file = File::create(&file_path).unwrap();
            file.write_all(b"#!/bin/sh\necho hello").unwrap();
            fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644)).unwrap();
        }

        make_executable(&file_path).unwrap();

        let metadata = fs::metadata(&file_path).unwrap();
        assert_ne!(metadata.permissions().mode() & 0o111, 0);
    }

    #[test]
    fn test_tar_symlink_escape_blocked() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("malicious.tar.gz");
        let extract_dir = temp_dir.path().join("extracted");
        let escape_target = temp_dir.path().join("escaped_file.txt");

        {
            let file = File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);

            builder
                .append_link(&mut header, "escape_link", "../escaped_file.txt")
                .unwrap();

            let data = b"This should NOT appear outside extraction dir!";
            let mut file_header = tar::Header::new_gnu();
            file_header.set_path("escape_link").unwrap();
            file_header.set_size(data.len() as u64);
            file_header.set_mode(0o644);
            file_header.set_cksum();

            builder.append(&file_header, &data[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        extract_archive(&archive_path, &extract_dir).unwrap();

        assert!(!escape_target.exists());
        assert!(extract_dir.join("escape_link").is_file());
    }
}
