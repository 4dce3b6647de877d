// Run configuration.
//
// Everything the synchronizer needs is gathered once into a `SyncConfig`
// and passed explicitly to `crate::sync::run`. Credentials come from the
// environment (optionally seeded from a `.env` file) or matching flags, the
// backup directory list from a JSON file, and the token cache lives next to
// the executable unless overridden.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::api::DEFAULT_API_URL;
use crate::error::ValidationError;

pub const BACKUP_PATHS_FILE: &str = "backup_paths.json";
pub const TOKEN_CACHE_FILE: &str = "auth_token.txt";
pub const ENV_FILE: &str = ".env";

/// Command line, with credentials falling back to environment variables.
#[derive(Parser, Debug)]
#[command(
    name = "pcloud-backup-sync",
    version,
    about = "Upload local backup archives to pCloud"
)]
pub struct Args {
    /// pCloud account username
    #[arg(long, env = "PCLOUD_USERNAME")]
    pub username: Option<String>,

    /// pCloud account password
    #[arg(long, env = "PCLOUD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// pCloud API base URL
    #[arg(long = "api-url", env = "PCLOUD_API", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// JSON array of backup directories [default: backup_paths.json next to the executable]
    #[arg(long, value_name = "FILE")]
    pub paths_file: Option<PathBuf>,

    /// Token cache file [default: auth_token.txt next to the executable]
    #[arg(long, value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Print plain progress lines instead of a progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    /// Check the settings and read the backup paths file.
    pub fn into_config(self) -> Result<SyncConfig, ValidationError> {
        let username = required(self.username, "PCLOUD_USERNAME")?;
        let password = required(self.password, "PCLOUD_PASSWORD")?;
        let base = executable_dir();
        let paths_file = self
            .paths_file
            .unwrap_or_else(|| base.join(BACKUP_PATHS_FILE));
        let backup_paths = load_backup_paths(&paths_file)?;
        Ok(SyncConfig {
            credentials: Credentials { username, password },
            api_base_url: self.api_url,
            backup_paths,
            token_cache: self
                .token_file
                .unwrap_or_else(|| base.join(TOKEN_CACHE_FILE)),
        })
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// Everything a synchronization run reads from the outside world.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub credentials: Credentials,
    pub api_base_url: String,
    pub backup_paths: Vec<PathBuf>,
    pub token_cache: PathBuf,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ValidationError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingSetting(name))
}

/// Read a JSON array of directory paths.
pub fn load_backup_paths(file: &Path) -> Result<Vec<PathBuf>, ValidationError> {
    let data = fs::read_to_string(file).map_err(|source| ValidationError::PathsFileUnreadable {
        path: file.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ValidationError::PathsFileMalformed {
        path: file.to_path_buf(),
        source,
    })
}

/// Load `.env` from the working directory, or else from next to the
/// executable. Variables already set in the environment win. Returns the file
/// that was loaded.
pub fn load_env_file() -> Option<PathBuf> {
    [PathBuf::from(ENV_FILE), executable_dir().join(ENV_FILE)]
        .into_iter()
        .find(|path| load_env_from(path))
}

/// Load one `.env` file into the process environment. False when the file is
/// missing or unreadable.
pub fn load_env_from(path: &Path) -> bool {
    dotenvy::from_path(path).is_ok()
}

/// Directory holding the running executable, or the working directory when
/// it cannot be determined.
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
