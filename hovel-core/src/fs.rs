//! Filesystem helpers shared across the workspace.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{HovelError, Result};

/// Write `bytes` to `path` atomically.
///
/// The content is first written to a unique temporary file in the same
/// directory and then renamed over the destination, so a crash mid-write
/// leaves either the old file or the new one, never a torn mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        HovelError::Internal(format!("no parent directory for {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".hovel-write-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .map_err(|e| HovelError::Io(e.error))?;

    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically to `path`.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Recursively copy the tree rooted at `src` into `dst`.
///
/// Files are copied bytewise and symlinks are followed; directory
/// permissions are carried over from the source. `dst` is created if it
/// does not exist.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        return Err(HovelError::Template(format!(
            "template directory not found: {}",
            src.display()
        )));
    }

    fs::create_dir_all(dst)?;
    copy_dir_permissions(src, dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        // metadata() follows symlinks, so a linked directory copies as a
        // directory and a linked file as a file.
        let meta = fs::metadata(entry.path())?;
        if meta.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_dir_permissions(src: &Path, dst: &Path) -> Result<()> {
    let perms = fs::metadata(src)?.permissions();
    fs::set_permissions(dst, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_dir_permissions(_src: &Path, _dst: &Path) -> Result<()> {
    Ok(())
}

/// Remove a directory tree, treating a missing path as success.
pub fn remove_tree_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
