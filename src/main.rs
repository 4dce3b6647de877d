// Entrypoint for the CLI application.
// - A `.env` file, if present, seeds the environment before arguments are read.
// - Configuration and local validation failures exit with status 1 before any
//   network call is made.
// - Failures talking to pCloud are reported but do not change the exit status.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use pcloud_backup_sync::{
    api::PCloudClient,
    config::{self, Args},
    sync,
    ui::ConsoleReporter,
};

fn main() -> anyhow::Result<ExitCode> {
    let env_file = config::load_env_file();
    env_logger::Builder::from_env(env_logger::Env::new().filter("PCLOUD_SYNC_LOG")).init();
    if let Some(path) = &env_file {
        debug!("loaded environment from {}", path.display());
    }

    let args = Args::parse();
    let show_bar = !args.no_progress;

    let validated = args
        .into_config()
        .and_then(|config| sync::preflight(&config).map(|backups| (config, backups)));
    let (config, backups) = match validated {
        Ok(validated) => validated,
        Err(e) => {
            debug!("validation failed: {:?}", e);
            eprintln!("Error: {}", e);
            return Ok(ExitCode::from(1));
        }
    };

    let client = PCloudClient::new(config.api_base_url.as_str())
        .context("Failed to build HTTP client")?;
    let mut console = ConsoleReporter::new(show_bar);

    match sync::synchronize(&config, &backups, &client, &mut console) {
        Ok(report) => {
            info!(
                "{} folders created, {} archives uploaded",
                report.created_folders.len(),
                report.uploads.len()
            );
            console.completed();
        }
        Err(e) => {
            debug!("synchronization failed: {:?}", e);
            console.failed(&e);
        }
    }
    Ok(ExitCode::SUCCESS)
}
