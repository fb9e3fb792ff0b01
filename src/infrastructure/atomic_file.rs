//! Crash-safe file writes.
//!
//! Content goes to a hidden temp file in the target directory, is fsynced, and
//! is then renamed over the target, so readers see either the old or the new
//! file and never a partial write.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, Result};

/// Atomically replaces `path` with `content`.
///
/// # Errors
/// Returns error if the directory cannot be created or the write fails.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    write_with(path, content, false)
}

/// Like [`write_atomic`], but the file is readable by the owner only.
///
/// # Errors
/// Returns error if the directory cannot be created or the write fails.
pub fn write_atomic_private(path: &Path, content: &[u8]) -> Result<()> {
    write_with(path, content, true)
}

fn write_with(path: &Path, content: &[u8], private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    let tmp_path = temp_path(path);
    let mut file = create_file(&tmp_path, private)
        .map_err(|e| AppError::io(format!("Failed to create {}", tmp_path.display()), e))?;
    file.write_all(content)
        .and_then(|()| file.sync_all())
        .map_err(|e| AppError::io(format!("Failed to write {}", tmp_path.display()), e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        AppError::io(format!("Failed to replace {}", path.display()), e)
    })
}

#[cfg(unix)]
fn create_file(path: &Path, private: bool) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(not(unix))]
fn create_file(path: &Path, _private: bool) -> std::io::Result<File> {
    File::create(path)
}

/// `dir/.name.tmp` next to the target.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "data".into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}.tmp"))
}
