// Error types for the backup synchronizer.
//
// Failures are split by when they can happen: `ValidationError` covers the
// pre-flight checks on configuration and local state, `ApiError` covers the
// remote calls. `SyncError` wraps both for a full run.

use std::path::PathBuf;

use thiserror::Error;

/// Problems with configuration or local state. Always fatal.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required setting {0} (set it in the environment or in a .env file)")]
    MissingSetting(&'static str),

    #[error("cannot read backup paths file {path}: {source}")]
    PathsFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup paths file {path} is not a JSON array of paths: {source}")]
    PathsFileMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no backup paths configured")]
    NoBackupPaths,

    #[error("backup path does not exist: {0}")]
    BackupPathMissing(PathBuf),

    #[error("cannot read backup path {path}: {source}")]
    BackupPathUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup path has no folder name: {0}")]
    UnnamedBackupPath(PathBuf),

    #[error("backup path {0} uses a reserved folder name")]
    ReservedFolderName(PathBuf),

    #[error("no .zip files found in backup path: {0}")]
    NoArchive(PathBuf),

    #[error("multiple .zip files found in backup path: {path} ({count} found, only one is expected)")]
    MultipleArchives { path: PathBuf, count: usize },

    #[error("remote folder not found for local folder: {0}")]
    RemoteFolderMissing(String),
}

/// Failures of a single remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error(
        "pCloud asks for a verification code. Log in once at https://my.pcloud.com/ \
         and complete the two-factor authentication so this IP address is recognized; \
         later runs reuse the saved token"
    )]
    VerificationRequired,

    #[error("cannot {operation}: {message}")]
    MissingMetadata {
        operation: &'static str,
        message: String,
    },

    #[error("cannot open {path} for upload: {source}")]
    UploadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of {0} stopped without a result")]
    UploadInterrupted(PathBuf),
}

/// Any failure of a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error("token cache {path}: {source}")]
    TokenCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// True for failures detected before or without talking to pCloud.
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }
}
