//! Installation id backed by a single file
//!
//! The file holds the raw token bytes and nothing else. It is created on
//! first access and never rewritten afterwards.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// File name of the installation id inside the store directory
pub const INSTALLATION_FILE: &str = "installation_id";

/// Lazily created installation id, cached after the first read.
///
/// Creation happens at most once per instance: the mutex is held across the
/// existence check, the write and the read.
#[derive(Debug)]
pub struct InstallationId {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl InstallationId {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cached: Mutex::new(None),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the installation id, creating the backing file if needed.
    pub fn get(&self) -> Result<String> {
        let mut cached = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match read_installation_file(&self.path)? {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                write_installation_file(&self.path, &id)?;
                tracing::info!(path = %self.path.display(), "Created installation id");
                id
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

/// Read the token, or `None` if the file is missing or empty.
fn read_installation_file(path: &Path) -> Result<Option<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Installation(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if bytes.is_empty() {
        tracing::warn!(path = %path.display(), "Installation file is empty, regenerating");
        return Ok(None);
    }

    String::from_utf8(bytes).map(Some).map_err(|e| {
        Error::Installation(format!("{} is not valid UTF-8: {}", path.display(), e))
    })
}

/// Write the token to a temporary file, sync it, then rename it into place.
fn write_installation_file(path: &Path, id: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(id.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        Error::Installation(format!("failed to write {}: {}", path.display(), e))
    })
}
