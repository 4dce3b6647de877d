// Library root
// -----------
// Uploads local backup archives to pCloud. The binary (`main.rs`) builds the
// configuration, then hands it to `sync::run` together with a pCloud client
// and a console reporter.
//
// Module responsibilities:
// - `api`: HTTP calls to pCloud behind the `RemoteStorage` trait.
// - `config`: command line / environment settings and the backup paths file.
// - `local`: finds the single archive in each backup directory.
// - `token`: the cached authentication token.
// - `sync`: the run itself, remote folder reconciliation and uploads.
// - `ui`: console output and progress bars.
// - `error`: error types shared by the modules above.
pub mod api;
pub mod config;
pub mod error;
pub mod local;
pub mod sync;
pub mod token;
pub mod ui;
