// UI layer: turns synchronization events into console output. Upload
// progress is drawn with an indicatif bar, or printed as plain lines when the
// bar is disabled (for example when output goes to a log file).

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use crate::api::UploadProgress;
use crate::error::SyncError;
use crate::local::LocalBackup;
use crate::sync::{RemoteFolder, SyncObserver};

const CONFIRMATION_NOTICE: &str =
    "Waiting for server confirmation, please don't close the application...";

/// Console observer for a synchronization run.
pub struct ConsoleReporter {
    show_bar: bool,
    bar: Option<ProgressBar>,
    last_percent: Option<u64>,
    notice_shown: bool,
}

impl ConsoleReporter {
    pub fn new(show_bar: bool) -> Self {
        ConsoleReporter {
            show_bar,
            bar: None,
            last_percent: None,
            notice_shown: false,
        }
    }

    pub fn completed(&self) {
        println!("Backup synchronization completed successfully.");
    }

    pub fn failed(&self, err: &SyncError) {
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
        eprintln!("Error: {}", err);
    }

    fn upload_bar(name: &str) -> ProgressBar {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {percent}% ({bytes}/{total_bytes}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message(format!("Backup {}", name));
        bar
    }

    fn notice(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }
}

/// Plain-text progress line for one upload.
pub fn progress_line(name: &str, progress: &UploadProgress) -> String {
    format!(
        "Backup {} : {}% ({}/{} MB)",
        name,
        progress.percent(),
        progress.loaded_mb(),
        progress.total_mb()
    )
}

impl SyncObserver for ConsoleReporter {
    fn token_saved(&mut self, path: &Path) {
        println!("Authentication token has been saved to {}", path.display());
    }

    fn folder_created(&mut self, folder: &RemoteFolder) {
        println!("Folder created on pCloud: {}", folder.name);
    }

    fn upload_started(&mut self, backup: &LocalBackup, _remote_name: &str) {
        self.last_percent = None;
        self.notice_shown = false;
        if self.show_bar {
            self.bar = Some(Self::upload_bar(&backup.name));
        }
    }

    fn upload_progress(&mut self, backup: &LocalBackup, progress: UploadProgress) {
        let percent = progress.percent();
        match &self.bar {
            Some(bar) => {
                bar.set_length(progress.total);
                bar.set_position(progress.loaded);
            }
            None if self.last_percent != Some(percent) => {
                println!("{}", progress_line(&backup.name, &progress));
            }
            None => {}
        }
        self.last_percent = Some(percent);

        // The server still has to store the file once the last byte is sent.
        if percent == 100 && !self.notice_shown {
            self.notice_shown = true;
            self.notice(CONFIRMATION_NOTICE);
        }
    }

    fn upload_finished(&mut self, backup: &LocalBackup, folder: &RemoteFolder) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        println!(
            "File uploaded to pCloud: {} in folder {}",
            backup.archive.display(),
            folder.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line_matches_console_format() {
        let progress = UploadProgress {
            loaded: 5 * 1024 * 1024,
            total: 20 * 1024 * 1024,
        };
        assert_eq!(
            progress_line("Photos", &progress),
            "Backup Photos : 25% (5/20 MB)"
        );
    }

    #[test]
    fn plain_mode_tracks_the_confirmation_notice_per_upload() {
        let backup = LocalBackup {
            name: "Docs".into(),
            archive: "/b/Docs/d.zip".into(),
        };
        let mut reporter = ConsoleReporter::new(false);
        reporter.upload_started(&backup, "backup_docs.zip");
        reporter.upload_progress(&backup, UploadProgress { loaded: 10, total: 10 });
        assert!(reporter.notice_shown);
        assert_eq!(reporter.last_percent, Some(100));

        reporter.upload_started(&backup, "backup_docs.zip");
        assert!(!reporter.notice_shown);
        assert!(reporter.bar.is_none());
    }
}
