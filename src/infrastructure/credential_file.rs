//! Exported OAuth credential on disk.
//!
//! The file is written owner-readable only and replaced atomically, so a
//! refresh that rewrites it can never leave a truncated token behind.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, Credential, Result};

use super::atomic_file::write_atomic_private;

/// Location of an exported credential.
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Writes `credential`, replacing any previous export.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let data = serde_json::to_vec_pretty(credential).map_err(AppError::json_parse)?;
        write_atomic_private(&self.path, &data)?;
        tracing::debug!(path = %self.path.display(), "Credential exported");
        Ok(())
    }

    /// Reads the exported credential, if there is one.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read(&self.path).map_err(|e| {
            AppError::io(format!("Failed to read {}", self.path.display()), e)
        })?;
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(AppError::json_parse)
    }

    /// Deletes the export. Returns whether a file was removed.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::io(
                format!("Failed to remove {}", self.path.display()),
                e,
            )),
        }
    }
}
