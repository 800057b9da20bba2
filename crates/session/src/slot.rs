//! Durable slot holding the raw credential between process runs.
//!
//! Only the raw credential string is stored, never decoded claims. The
//! [`crate::SessionStore`] is the sole writer.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("no data directory available for credential storage")]
    NoDataDir,

    #[error("credential slot I/O failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single named key-value slot for the raw credential.
pub trait CredentialSlot: Send + Sync {
    /// Read the stored credential; `None` is the canonical "logged out" state.
    fn load(&self) -> Result<Option<String>, SlotError>;

    fn store(&self, credential: &str) -> Result<(), SlotError>;

    /// Remove the stored credential. Removing an empty slot is not an error.
    fn remove(&self) -> Result<(), SlotError>;
}

/// File-backed slot: one file per key.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Slot named `key` under the platform data directory
    /// (`<data_dir>/cybertrain/<key>`).
    pub fn in_data_dir(key: &str) -> Result<Self, SlotError> {
        let base = dirs::data_dir().ok_or(SlotError::NoDataDir)?;
        Ok(Self::new(base.join("cybertrain").join(key)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SlotError {
        SlotError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialSlot for FileSlot {
    fn load(&self) -> Result<Option<String>, SlotError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let credential = contents.trim();
                if credential.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(credential.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn store(&self, credential: &str) -> Result<(), SlotError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        // Write-then-rename so a crash never leaves a truncated credential.
        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, credential).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn remove(&self) -> Result<(), SlotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Write `contents` to a fresh file only the current user can read.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // A leftover temp file keeps its old mode; `mode` only applies on create.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

/// In-memory slot for sessions that should not outlive the process.
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-seeded with a credential, as if left by a previous run.
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(credential.into())),
        }
    }

    pub fn peek(&self) -> Option<String> {
        self.value.lock().clone()
    }
}

impl CredentialSlot for MemorySlot {
    fn load(&self) -> Result<Option<String>, SlotError> {
        Ok(self.value.lock().clone())
    }

    fn store(&self, credential: &str) -> Result<(), SlotError> {
        *self.value.lock() = Some(credential.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), SlotError> {
        *self.value.lock() = None;
        Ok(())
    }
}
