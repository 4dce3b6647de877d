// Token persistence: the pCloud auth token is cached in a plain-text file so
// later runs skip the login call.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// File-backed cache for a single authentication token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached token, trimmed. `None` when no cache file exists.
    pub fn load(&self) -> Result<Option<String>, SyncError> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Ok(Some(data.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.error(source)),
        }
    }

    /// Write the token verbatim.
    pub fn save(&self, token: &str) -> Result<(), SyncError> {
        fs::write(&self.path, token).map_err(|source| self.error(source))
    }

    fn error(&self, source: io::Error) -> SyncError {
        SyncError::TokenCache {
            path: self.path.clone(),
            source,
        }
    }
}
