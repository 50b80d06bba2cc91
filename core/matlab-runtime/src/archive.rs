//! ZIP extraction that keeps POSIX permissions and symlinks.
//!
//! A naive extraction drops the mode bits stored in each entry's external
//! attributes and writes symlinks as small regular files holding the link
//! target. The MATLAB Runtime installer then refuses to start (its launcher
//! is no longer executable) and its bundled dynamic libraries fail to
//! resolve (their versioned symlinks are gone). [`extract_zip`] performs the
//! standard extraction and then repairs each entry from its stored mode.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::errors::{Error, IoContext, Result};

/// File type mask of a POSIX mode.
const S_IFMT: u32 = 0o170_000;

/// File type bits of a symbolic link.
const S_IFLNK: u32 = 0o120_000;

/// Returns whether a stored POSIX mode describes a symbolic link.
#[must_use]
pub fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Extracts a ZIP archive into `dest_dir`, restoring permissions and
/// symlinks.
///
/// Creates the destination directory if it does not exist. Entries keep the
/// archive's layout (no root-folder stripping): the vendor installer is
/// expected at the top of the extracted tree.
///
/// # Errors
///
/// Returns an error if:
/// - The archive cannot be opened or is not a valid ZIP file
/// - An entry path escapes the destination directory, directly or through
///   a symlink extracted earlier
/// - Directory or file creation fails
/// - Permissions cannot be applied
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(archive_path)
        .io_context(|| format!("Failed to open archive: {}", archive_path.display()))?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        Error::archive(
            format!("Failed to read ZIP archive: {}", archive_path.display()),
            e,
        )
    })?;

    fs::create_dir_all(dest_dir)
        .io_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::archive(format!("Failed to read archive entry {i}"), e))?;

        let Some(entry_path) = entry.enclosed_name() else {
            return Err(Error::io(
                format!("Refusing to extract entry outside the destination: {}", entry.name()),
                std::io::Error::from(std::io::ErrorKind::InvalidData),
            ));
        };

        refuse_symlinked_path(dest_dir, &entry_path)?;
        let output_path = dest_dir.join(&entry_path);
        let mode = entry.unix_mode();

        if entry.is_dir() {
            fs::create_dir_all(&output_path).io_context(|| {
                format!("Failed to create directory: {}", output_path.display())
            })?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .io_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }

            if let Some(mode) = mode
                && is_symlink_mode(mode)
            {
                let mut target = Vec::new();
                entry
                    .read_to_end(&mut target)
                    .io_context(|| format!("Failed to extract: {}", output_path.display()))?;
                fs::write(&output_path, &target)
                    .io_context(|| format!("Failed to create file: {}", output_path.display()))?;
                relink(&output_path, &target)?;
                extracted.push(output_path);
                continue;
            }

            let mut outfile = fs::File::create(&output_path)
                .io_context(|| format!("Failed to create file: {}", output_path.display()))?;
            std::io::copy(&mut entry, &mut outfile)
                .io_context(|| format!("Failed to extract: {}", output_path.display()))?;
        }

        if let Some(mode) = mode
            && mode != 0
        {
            apply_mode(&output_path, mode)?;
        }
        extracted.push(output_path);
    }

    tracing::debug!(
        archive = %archive_path.display(),
        entries = extracted.len(),
        "extracted archive"
    );
    Ok(extracted)
}

/// Fails if any existing component of `entry_path` under `dest_dir` is a
/// symlink.
///
/// Symlinks are recreated as they are extracted, so a later entry must not
/// be written through one that an earlier entry planted.
fn refuse_symlinked_path(dest_dir: &Path, entry_path: &Path) -> Result<()> {
    let mut current = dest_dir.to_path_buf();
    for component in entry_path.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::io(
                    format!(
                        "Refusing to extract through symlink: {}",
                        current.display()
                    ),
                    std::io::Error::from(std::io::ErrorKind::InvalidData),
                ));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    Ok(())
}

/// Replaces a naively extracted file with a symlink to `target`.
///
/// When the platform refuses to create the link (no symlink privilege on
/// Windows, exotic filesystems) the regular file is put back in place.
fn relink(path: &Path, target: &[u8]) -> Result<()> {
    relink_with(path, target, create_symlink)
}

fn relink_with<F>(path: &Path, target: &[u8], link: F) -> Result<()>
where
    F: FnOnce(&Path, &Path) -> std::io::Result<()>,
{
    let target = PathBuf::from(String::from_utf8_lossy(target).into_owned());
    let mut backup = path.as_os_str().to_owned();
    backup.push(".__backup__");
    let backup = PathBuf::from(backup);

    fs::rename(path, &backup)
        .io_context(|| format!("Failed to move aside {}", path.display()))?;

    match link(&target, path) {
        Ok(()) => {
            fs::remove_file(&backup)
                .io_context(|| format!("Failed to remove {}", backup.display()))?;
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                target = %target.display(),
                error = %e,
                "cannot create symlink, keeping regular file"
            );
            fs::rename(&backup, path)
                .io_context(|| format!("Failed to restore {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

/// Sets the permission bits recorded in the archive, exactly.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .io_context(|| format!("Failed to set permissions: {}", path.display()))
}

/// Only the read-only bit has a meaning outside Unix.
#[cfg(not(unix))]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)
        .io_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
        .io_context(|| format!("Failed to set permissions: {}", path.display()))
}
