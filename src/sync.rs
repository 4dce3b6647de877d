// The synchronization run.
//
// A run has two phases. `preflight` checks the local backup directories
// without touching the network. `synchronize` then authenticates, makes
// sure every backup has a folder at the pCloud root and uploads each archive
// into its folder. Remote calls are made one at a time, in that order.

use std::path::Path;

use log::{debug, info};

use crate::api::{
    FileMetadata, RemoteEntry, RemoteStorage, UploadProgress, UploadRequest,
    RESERVED_FOLDER_NAME, ROOT_FOLDER_ID,
};
use crate::config::{Credentials, SyncConfig};
use crate::error::{SyncError, ValidationError};
use crate::local::{collect_backups, LocalBackup};
use crate::token::TokenCache;

/// A folder at the pCloud root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub name: String,
    pub id: u64,
}

/// One archive that made it to pCloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedBackup {
    pub backup: LocalBackup,
    pub folder: RemoteFolder,
    pub remote_name: String,
    pub files: Vec<FileMetadata>,
}

/// What a successful run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub logged_in: bool,
    pub created_folders: Vec<RemoteFolder>,
    pub uploads: Vec<UploadedBackup>,
}

/// Receives notable events of a run. Every method defaults to doing nothing.
pub trait SyncObserver {
    fn token_saved(&mut self, _path: &Path) {}

    fn folder_created(&mut self, _folder: &RemoteFolder) {}

    fn upload_started(&mut self, _backup: &LocalBackup, _remote_name: &str) {}

    fn upload_progress(&mut self, _backup: &LocalBackup, _progress: UploadProgress) {}

    fn upload_finished(&mut self, _backup: &LocalBackup, _folder: &RemoteFolder) {}
}

/// Observer that ignores everything.
pub struct Silent;

impl SyncObserver for Silent {}

/// Validate the local backup directories. Makes no network calls.
pub fn preflight(config: &SyncConfig) -> Result<Vec<LocalBackup>, ValidationError> {
    collect_backups(&config.backup_paths)
}

/// Pre-flight followed by the remote phase.
pub fn run<R, O>(config: &SyncConfig, remote: &R, observer: &mut O) -> Result<SyncReport, SyncError>
where
    R: RemoteStorage + ?Sized,
    O: SyncObserver + ?Sized,
{
    let backups = preflight(config)?;
    synchronize(config, &backups, remote, observer)
}

/// The remote phase, for backups that already passed [`preflight`].
pub fn synchronize<R, O>(
    config: &SyncConfig,
    backups: &[LocalBackup],
    remote: &R,
    observer: &mut O,
) -> Result<SyncReport, SyncError>
where
    R: RemoteStorage + ?Sized,
    O: SyncObserver + ?Sized,
{
    let mut report = SyncReport::default();
    let cache = TokenCache::new(&config.token_cache);
    let token = acquire_token(&cache, &config.credentials, remote, observer, &mut report)?;

    let mut folders = sync_targets(remote.list_folder(&token, ROOT_FOLDER_ID)?);
    debug!("{} folders at the pCloud root", folders.len());

    for backup in backups {
        if folders.iter().any(|f| f.name == backup.name) {
            continue;
        }
        let id = remote.create_folder(&token, &backup.name, ROOT_FOLDER_ID)?;
        let folder = RemoteFolder {
            name: backup.name.clone(),
            id,
        };
        info!("created folder {} (id {})", folder.name, folder.id);
        observer.folder_created(&folder);
        report.created_folders.push(folder.clone());
        folders.push(folder);
    }

    for backup in backups {
        let folder = folders
            .iter()
            .find(|f| f.name == backup.name)
            .ok_or_else(|| ValidationError::RemoteFolderMissing(backup.name.clone()))?;
        let uploaded = upload_backup(remote, &token, backup, folder, observer)?;
        report.uploads.push(uploaded);
    }

    Ok(report)
}

/// Use the cached token when there is one; otherwise log in once and cache
/// the result.
fn acquire_token<R, O>(
    cache: &TokenCache,
    credentials: &Credentials,
    remote: &R,
    observer: &mut O,
    report: &mut SyncReport,
) -> Result<String, SyncError>
where
    R: RemoteStorage + ?Sized,
    O: SyncObserver + ?Sized,
{
    if let Some(token) = cache.load()? {
        debug!("using cached token from {}", cache.path().display());
        return Ok(token);
    }
    info!("no cached token, logging in as {}", credentials.username);
    let token = remote.login(&credentials.username, &credentials.password)?;
    cache.save(&token)?;
    report.logged_in = true;
    observer.token_saved(cache.path());
    Ok(token)
}

/// Root folders that can receive backups.
pub fn sync_targets(entries: Vec<RemoteEntry>) -> Vec<RemoteFolder> {
    entries
        .into_iter()
        .filter(|entry| entry.isfolder && entry.name != RESERVED_FOLDER_NAME)
        .filter_map(|entry| {
            entry.folderid.map(|id| RemoteFolder {
                name: entry.name,
                id,
            })
        })
        .collect()
}

fn upload_backup<R, O>(
    remote: &R,
    token: &str,
    backup: &LocalBackup,
    folder: &RemoteFolder,
    observer: &mut O,
) -> Result<UploadedBackup, SyncError>
where
    R: RemoteStorage + ?Sized,
    O: SyncObserver + ?Sized,
{
    let remote_name = backup.remote_file_name();
    info!(
        "uploading {} to {}/{}",
        backup.archive.display(),
        folder.name,
        remote_name
    );
    observer.upload_started(backup, &remote_name);
    let handle = remote.upload_file(
        token,
        UploadRequest {
            path: backup.archive.clone(),
            folder_id: folder.id,
            file_name: Some(remote_name.clone()),
        },
    )?;
    let files = handle.wait(|progress| observer.upload_progress(backup, progress))?;
    observer.upload_finished(backup, folder);
    Ok(UploadedBackup {
        backup: backup.clone(),
        folder: folder.clone(),
        remote_name,
        files,
    })
}
