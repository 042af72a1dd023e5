//! State kept in a file on the local file system.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{CommitError, DocumentError, StateError};
use crate::handle::StateHandle;
use crate::persist::{self, PersistenceBackend};
use crate::state::file::StateFile;
use crate::state::StateTree;

pub const DEFAULT_STATE_PATH: &str = "terraform.tfstate";
pub const BACKUP_EXTENSION: &str = ".backup";

/// `<state>.<unix seconds>.backup`
pub fn default_backup_path(state_path: &Path) -> PathBuf {
    with_suffix(
        state_path,
        &format!(".{}{}", Utc::now().timestamp(), BACKUP_EXTENSION),
    )
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Sibling file that receives a new document before it replaces the
/// primary one.
fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        )
    })?;
    let mut tmp = OsString::from(".");
    tmp.push(name);
    tmp.push(".tmp");
    Ok(path.with_file_name(tmp))
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

pub struct LocalFile {
    path: PathBuf,
    backup_path: PathBuf,
}

impl PersistenceBackend for LocalFile {
    fn read_persisted(&self) -> io::Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_backup(&mut self, prior: &[u8]) -> io::Result<()> {
        let tmp = temp_path(&self.backup_path)?;
        write_synced(&tmp, prior)?;
        debug!(path = %tmp.display(), "staged state backup");
        Ok(())
    }

    fn keep_backup(&mut self) -> io::Result<()> {
        fs::rename(temp_path(&self.backup_path)?, &self.backup_path)?;
        debug!(path = %self.backup_path.display(), "wrote state backup");
        Ok(())
    }

    fn discard_backup(&mut self) -> io::Result<()> {
        fs::remove_file(temp_path(&self.backup_path)?)
    }

    fn write_primary(&mut self, document: &[u8]) -> io::Result<()> {
        let tmp = temp_path(&self.path)?;
        let r = write_synced(&tmp, document).and_then(|()| fs::rename(&tmp, &self.path));
        if r.is_err() {
            // Best effort; the temporary file may not exist
            let _ = fs::remove_file(&tmp);
        }
        r
    }
}

/// A state file together with the location of its backup.
pub struct LocalState {
    file: LocalFile,
    state: Option<StateTree>,
}

impl LocalState {
    /// Without an explicit backup path, a timestamped one next to the state
    /// file is used.
    pub fn new(path: impl Into<PathBuf>, backup_path: Option<PathBuf>) -> LocalState {
        let path = path.into();
        let backup_path = backup_path.unwrap_or_else(|| default_backup_path(&path));
        LocalState {
            file: LocalFile { path, backup_path },
            state: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.file.backup_path
    }
}

impl StateHandle for LocalState {
    fn refresh_state(&mut self) -> Result<(), StateError> {
        let refresh_error = |source: DocumentError| StateError::Refresh {
            path: self.file.path.clone(),
            source,
        };
        let bytes = self
            .file
            .read_persisted()
            .map_err(|e| refresh_error(e.into()))?;
        let state = match bytes {
            None => {
                debug!(path = %self.file.path.display(), "no state file");
                None
            }
            Some(bytes) => Some(
                StateFile::from_slice(&bytes)
                    .and_then(StateFile::into_tree)
                    .map_err(refresh_error)?,
            ),
        };
        self.state = state;
        Ok(())
    }

    fn state(&self) -> Option<&StateTree> {
        self.state.as_ref()
    }

    fn state_mut(&mut self) -> Option<&mut StateTree> {
        self.state.as_mut()
    }

    fn commit(&mut self) -> Result<(), CommitError> {
        let tree = self.state.get_or_insert_with(StateTree::new);
        persist::commit(&mut self.file, tree)
    }
}

/// An advisory lock on `<state>.lock`, guarding a state file against
/// concurrent commands.
pub struct StateLock {
    path: PathBuf,
    lock: fd_lock::RwLock<File>,
}

impl StateLock {
    pub fn open(state_path: &Path) -> Result<StateLock, StateError> {
        let path = with_suffix(state_path, ".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StateError::Load {
                path: path.clone(),
                source,
            })?;
        Ok(StateLock {
            path,
            lock: fd_lock::RwLock::new(file),
        })
    }

    /// Exclusive access, for commands that modify the state.
    pub fn write(&mut self) -> Result<fd_lock::RwLockWriteGuard<'_, File>, StateError> {
        let contended = matches!(
            self.lock.try_write(),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock
        );
        if contended {
            info!("Waiting for state lock {}", self.path.display());
        }
        let path = &self.path;
        self.lock.write().map_err(|source| StateError::Load {
            path: path.clone(),
            source,
        })
    }

    /// Shared access, for commands that only read the state.
    pub fn read(&self) -> Result<fd_lock::RwLockReadGuard<'_, File>, StateError> {
        let contended = matches!(
            self.lock.try_read(),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock
        );
        if contended {
            info!("Waiting for state lock {}", self.path.display());
        }
        self.lock.read().map_err(|source| StateError::Load {
            path: self.path.clone(),
            source,
        })
    }
}
