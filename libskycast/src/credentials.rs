//! Credential persistence hooks
//!
//! Skycast does not own the device-local key-value store; a UI shell plugs
//! its own storage in through the [`CredentialStore`] trait. Two backends ship
//! with the library:
//! - `MemoryCredentialStore`: nothing survives the process (tests, kiosks)
//! - `FileCredentialStore`: a JSON file readable only by the owner
//!
//! # Example
//!
//! ```no_run
//! use libskycast::credentials::{CredentialStore, FileCredentialStore};
//! use std::path::PathBuf;
//!
//! # fn example() -> libskycast::Result<()> {
//! let store = FileCredentialStore::new(PathBuf::from("/tmp/skycast/session.json"));
//! if let Some(credentials) = store.load()? {
//!     println!("Restoring session for {}", credentials.identifier);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{CredentialError, Result};
use crate::types::Credentials;

/// Storage backend for the single persisted session
pub trait CredentialStore: Send + Sync {
    /// Load the persisted credentials, if any
    fn load(&self) -> Result<Option<Credentials>>;

    /// Persist `credentials`, replacing whatever was stored
    fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Remove persisted credentials; succeeds when nothing was stored
    fn clear(&self) -> Result<()>;

    /// Short name used in log lines
    fn backend_name(&self) -> &str;
}

/// In-process store
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with credentials already "persisted"
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Some(mut old) = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            old.wipe();
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// JSON file store
///
/// Parent directories are created on save. On Unix the file is chmod 600.
/// A symlink at the target path is refused rather than followed.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fail if `path` is a symbolic link
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(CredentialError::Io)?;
    if metadata.file_type().is_symlink() {
        return Err(CredentialError::Symlink(path.to_path_buf()).into());
    }
    Ok(())
}

/// Write `contents` to a file only the owner can read
///
/// On Unix a new file is created with mode 0600, so the tokens are never
/// readable by others. An existing file is tightened before it is truncated.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(false);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.set_len(0)?;
    file.write_all(contents)?;
    file.sync_all()
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        if std::fs::symlink_metadata(&self.path).is_err() {
            return Ok(None);
        }

        validate_not_symlink(&self.path)?;

        let content = std::fs::read_to_string(&self.path).map_err(CredentialError::Io)?;
        let credentials: Credentials =
            serde_json::from_str(&content).map_err(CredentialError::Serialization)?;

        tracing::debug!("Loaded credentials from {:?}", self.path);
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(CredentialError::Io)?;
        }
        if std::fs::symlink_metadata(&self.path).is_ok() {
            validate_not_symlink(&self.path)?;
        }

        let json =
            serde_json::to_string_pretty(credentials).map_err(CredentialError::Serialization)?;
        write_private(&self.path, json.as_bytes()).map_err(CredentialError::Io)?;

        tracing::debug!("Stored credentials at {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Deleted credentials at {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Credentials at {:?} already absent", self.path);
                Ok(())
            }
            Err(e) => Err(CredentialError::Io(e).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}
