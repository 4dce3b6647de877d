// Scanning of the local backup directories.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::api::RESERVED_FOLDER_NAME;
use crate::error::ValidationError;

const ARCHIVE_EXTENSION: &str = ".zip";

/// A backup directory and the single archive found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBackup {
    /// Directory name, used as the remote folder name.
    pub name: String,
    pub archive: PathBuf,
}

impl LocalBackup {
    /// Name the archive is stored under remotely.
    pub fn remote_file_name(&self) -> String {
        format!("backup_{}.zip", self.name.to_lowercase())
    }
}

/// Validate every configured directory and return one entry per directory,
/// in configuration order. Stops at the first invalid directory.
pub fn collect_backups(paths: &[PathBuf]) -> Result<Vec<LocalBackup>, ValidationError> {
    if paths.is_empty() {
        return Err(ValidationError::NoBackupPaths);
    }
    paths.iter().map(|path| scan_backup_dir(path)).collect()
}

fn scan_backup_dir(dir: &Path) -> Result<LocalBackup, ValidationError> {
    if !dir.exists() {
        return Err(ValidationError::BackupPathMissing(dir.to_path_buf()));
    }
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ValidationError::UnnamedBackupPath(dir.to_path_buf()))?;
    if name == RESERVED_FOLDER_NAME {
        return Err(ValidationError::ReservedFolderName(dir.to_path_buf()));
    }
    let archive = find_archive(dir)?;
    debug!("backup {} -> {}", name, archive.display());
    Ok(LocalBackup { name, archive })
}

/// Return the only `.zip` file directly inside `dir`.
pub fn find_archive(dir: &Path) -> Result<PathBuf, ValidationError> {
    let unreadable = |source: std::io::Error| ValidationError::BackupPathUnreadable {
        path: dir.to_path_buf(),
        source,
    };
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        // `is_file` follows symlinks, so a link to an archive counts.
        let is_archive = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(ARCHIVE_EXTENSION));
        if is_archive && path.is_file() {
            archives.push(path);
        }
    }
    match archives.len() {
        0 => Err(ValidationError::NoArchive(dir.to_path_buf())),
        1 => Ok(archives.remove(0)),
        count => Err(ValidationError::MultipleArchives {
            path: dir.to_path_buf(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn backup_dir(root: &TempDir, name: &str, files: &[&str]) -> PathBuf {
        let dir = root.path().join(name);
        fs::create_dir(&dir).unwrap();
        for file in files {
            File::create(dir.join(file)).unwrap();
        }
        dir
    }

    #[test]
    fn finds_the_single_archive() {
        let root = TempDir::new().unwrap();
        let dir = backup_dir(&root, "Photos", &["photos-2024.zip", "readme.txt"]);
        let backups = collect_backups(&[dir.clone()]).unwrap();
        assert_eq!(
            backups,
            vec![LocalBackup {
                name: "Photos".into(),
                archive: dir.join("photos-2024.zip"),
            }]
        );
    }

    #[test]
    fn empty_path_list_is_rejected() {
        assert!(matches!(
            collect_backups(&[]),
            Err(ValidationError::NoBackupPaths)
        ));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");
        assert!(matches!(
            collect_backups(&[missing]),
            Err(ValidationError::BackupPathMissing(_))
        ));
    }

    #[test]
    fn directory_without_archive_is_rejected() {
        let root = TempDir::new().unwrap();
        let dir = backup_dir(&root, "Docs", &["notes.txt"]);
        assert!(matches!(
            collect_backups(&[dir]),
            Err(ValidationError::NoArchive(_))
        ));
    }

    #[test]
    fn directory_with_two_archives_is_rejected() {
        let root = TempDir::new().unwrap();
        let dir = backup_dir(&root, "Docs", &["a.zip", "b.zip"]);
        match collect_backups(&[dir]) {
            Err(ValidationError::MultipleArchives { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subdirectory_named_like_an_archive_is_ignored() {
        let root = TempDir::new().unwrap();
        let dir = backup_dir(&root, "Docs", &["docs.zip"]);
        fs::create_dir(dir.join("old.zip")).unwrap();
        assert_eq!(find_archive(&dir).unwrap(), dir.join("docs.zip"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_archive_counts() {
        let root = TempDir::new().unwrap();
        let store = backup_dir(&root, "store", &["photos-2024.zip"]);
        let dir = backup_dir(&root, "Photos", &[]);
        std::os::unix::fs::symlink(store.join("photos-2024.zip"), dir.join("latest.zip"))
            .unwrap();

        let backups = collect_backups(&[dir.clone()]).unwrap();
        assert_eq!(backups[0].archive, dir.join("latest.zip"));
    }

    #[cfg(unix)]
    #[test]
    fn dangling_archive_link_is_not_an_archive() {
        let root = TempDir::new().unwrap();
        let dir = backup_dir(&root, "Photos", &[]);
        std::os::unix::fs::symlink(root.path().join("gone.zip"), dir.join("latest.zip"))
            .unwrap();

        assert!(matches!(
            collect_backups(&[dir]),
            Err(ValidationError::NoArchive(_))
        ));
    }

    #[test]
    fn reserved_name_is_rejected() {
        let root = TempDir::new().unwrap();
        let dir = backup_dir(&root, RESERVED_FOLDER_NAME, &["x.zip"]);
        assert!(matches!(
            collect_backups(&[dir]),
            Err(ValidationError::ReservedFolderName(_))
        ));
    }

    #[test]
    fn remote_name_is_lowercased() {
        let backup = LocalBackup {
            name: "MyPhotos".into(),
            archive: PathBuf::from("/b/MyPhotos/x.zip"),
        };
        assert_eq!(backup.remote_file_name(), "backup_myphotos.zip");
    }
}
