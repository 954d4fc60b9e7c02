//! Session persistence for the command-line client.
//!
//! Each CLI invocation is a new process, so the signed-in session is kept in a
//! small JSON file and handed back to the backend on the next run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::Session;
use crate::config::BackendKind;
use crate::error::{Error, Result};

/// What is written to the session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Backend the session belongs to. A session is only restored into the
    /// same kind of backend.
    pub backend: BackendKind,
    pub session: Session,
}

/// Reads and writes the session file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session for `backend`.
    ///
    /// A missing file, a file for another backend kind, or an expired session
    /// all yield `None`. An unreadable file is logged and treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    pub fn load(&self, backend: BackendKind) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let stored: StoredSession = match serde_json::from_str(&contents) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        if stored.backend != backend {
            debug!(
                "Stored session belongs to the {} backend, not {}",
                stored.backend, backend
            );
            return Ok(None);
        }
        if stored.session.is_expired(chrono::Utc::now()) {
            debug!("Stored session has expired");
            return Ok(None);
        }
        Ok(Some(stored.session))
    }

    /// Write `session` for `backend`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, backend: BackendKind, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let stored = StoredSession {
            backend,
            session: session.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    /// Remove the session file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
