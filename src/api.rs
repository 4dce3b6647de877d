// API client module: the blocking HTTP client that talks to pCloud, and the
// `RemoteStorage` trait the synchronizer is written against so it can run
// against a fake in tests.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::debug;
use reqwest::blocking::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ApiError;

/// European API endpoint, used when no override is configured.
pub const DEFAULT_API_URL: &str = "https://eapi.pcloud.com";

/// pCloud identifies the account root folder as 0.
pub const ROOT_FOLDER_ID: u64 = 0;

/// pCloud's own folder at the account root. Never a sync target.
pub const RESERVED_FOLDER_NAME: &str = "System Volume Information";

const VERIFICATION_CODE_ERROR: &str = "Please provide 'code'.";
const UNKNOWN_ERROR: &str = "Unknown error";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One item of a folder listing. Only the fields the synchronizer needs are
/// kept; pCloud sends many more.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub isfolder: bool,
    pub folderid: Option<u64>,
    pub fileid: Option<u64>,
    pub size: Option<u64>,
}

/// Metadata of a file stored on pCloud, as returned by `uploadfile`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub fileid: Option<u64>,
    pub size: Option<u64>,
}

/// What to upload and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub folder_id: u64,
    /// Name to store the file under; the local file name when `None`.
    pub file_name: Option<String>,
}

/// Bytes sent so far for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
}

impl UploadProgress {
    /// Completion rounded to the nearest percent. An empty file is complete.
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 100;
        }
        (self.loaded as f64 * 100.0 / self.total as f64).round() as u64
    }

    pub fn loaded_mb(&self) -> u64 {
        (self.loaded as f64 / BYTES_PER_MB).round() as u64
    }

    pub fn total_mb(&self) -> u64 {
        (self.total as f64 / BYTES_PER_MB).round() as u64
    }
}

/// Events emitted while an upload runs. `Finished` is always the last one.
#[derive(Debug)]
pub enum UploadEvent {
    Progress(UploadProgress),
    Finished(Result<Vec<FileMetadata>, ApiError>),
}

/// Handle on an upload in flight. Progress is read from it as a stream of
/// [`UploadEvent`]s, either by polling or by blocking in [`UploadHandle::wait`].
pub struct UploadHandle {
    path: PathBuf,
    events: Receiver<UploadEvent>,
}

impl UploadHandle {
    pub fn new(path: impl Into<PathBuf>, events: Receiver<UploadEvent>) -> Self {
        UploadHandle {
            path: path.into(),
            events,
        }
    }

    /// Returns the next pending event without blocking.
    pub fn poll(&self) -> Option<UploadEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks until the upload finishes, handing every progress event to
    /// `on_progress` in the order it was produced.
    pub fn wait(
        self,
        mut on_progress: impl FnMut(UploadProgress),
    ) -> Result<Vec<FileMetadata>, ApiError> {
        for event in self.events.iter() {
            match event {
                UploadEvent::Progress(progress) => on_progress(progress),
                UploadEvent::Finished(result) => return result,
            }
        }
        Err(ApiError::UploadInterrupted(self.path))
    }
}

/// The four remote operations the synchronizer depends on.
pub trait RemoteStorage {
    /// Exchange credentials for an authentication token.
    fn login(&self, username: &str, password: &str) -> Result<String, ApiError>;

    /// List the direct children of `folder_id`.
    fn list_folder(&self, token: &str, folder_id: u64) -> Result<Vec<RemoteEntry>, ApiError>;

    /// Create `name` under `parent_id` and return the new folder id.
    fn create_folder(&self, token: &str, name: &str, parent_id: u64) -> Result<u64, ApiError>;

    /// Start uploading a file. The returned handle reports progress and the
    /// final result.
    fn upload_file(&self, token: &str, request: UploadRequest) -> Result<UploadHandle, ApiError>;
}

/// Blocking pCloud client holding a reqwest client and the API base URL.
#[derive(Clone)]
pub struct PCloudClient {
    client: Client,
    base_url: String,
}

impl PCloudClient {
    /// Build a client for `base_url`. No request timeout is set: large
    /// archives can take longer than any fixed limit.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(None::<Duration>).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(PCloudClient { client, base_url })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// POST a form-encoded request and decode the JSON answer.
    fn post_form<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        debug!("POST /{}", method);
        let res = self.client.post(self.endpoint(method)).form(params).send()?;
        read_json(operation, res)
    }
}

impl RemoteStorage for PCloudClient {
    fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let res: LoginResponse = self.post_form(
            "log in",
            "login",
            &[("username", username), ("password", password)],
        )?;
        res.into_token()
    }

    fn list_folder(&self, token: &str, folder_id: u64) -> Result<Vec<RemoteEntry>, ApiError> {
        let folder_id = folder_id.to_string();
        let res: Envelope<FolderListing> = self.post_form(
            "list folder contents",
            "listfolder",
            &[("auth", token), ("folderid", folder_id.as_str())],
        )?;
        Ok(res.into_metadata("list folder contents")?.contents)
    }

    fn create_folder(&self, token: &str, name: &str, parent_id: u64) -> Result<u64, ApiError> {
        let parent_id = parent_id.to_string();
        let res: Envelope<CreatedFolder> = self.post_form(
            "create folder",
            "createfolder",
            &[("auth", token), ("name", name), ("folderid", parent_id.as_str())],
        )?;
        res.into_metadata("create folder")?
            .folderid
            .ok_or_else(|| ApiError::MissingMetadata {
                operation: "create folder",
                message: "response has no folder id".into(),
            })
    }

    fn upload_file(&self, token: &str, request: UploadRequest) -> Result<UploadHandle, ApiError> {
        let upload_source = |source: io::Error| ApiError::UploadSource {
            path: request.path.clone(),
            source,
        };
        let file = File::open(&request.path).map_err(upload_source)?;
        let total = file.metadata().map_err(upload_source)?.len();
        let file_name = request
            .file_name
            .clone()
            .or_else(|| {
                request
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "upload.zip".into());

        let (tx, rx) = unbounded();
        let reader = ProgressReader {
            inner: file,
            loaded: 0,
            total,
            events: tx.clone(),
        };
        let part = multipart::Part::reader_with_length(reader, total).file_name(file_name);
        let form = multipart::Form::new()
            .text("auth", token.to_owned())
            .text("folderid", request.folder_id.to_string())
            .part("file", part);

        debug!(
            "POST /uploadfile ({} bytes from {})",
            total,
            request.path.display()
        );
        let client = self.client.clone();
        let url = self.endpoint("uploadfile");
        thread::spawn(move || {
            let result = client
                .post(url)
                .multipart(form)
                .send()
                .map_err(ApiError::from)
                .and_then(|res| read_json::<Envelope<OneOrMany<FileMetadata>>>("upload file", res))
                .and_then(|res| res.into_metadata("upload file"))
                .map(OneOrMany::into_vec);
            // Nobody may be listening any more if the handle was dropped.
            let _ = tx.send(UploadEvent::Finished(result));
        });

        Ok(UploadHandle::new(request.path, rx))
    }
}

/// Check the HTTP status, then decode the body. pCloud reports most failures
/// with a 200 and an `error` field, which the callers handle.
fn read_json<T: DeserializeOwned>(operation: &'static str, res: Response) -> Result<T, ApiError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().unwrap_or_default();
        return Err(ApiError::Status {
            operation,
            status,
            body,
        });
    }
    Ok(res.json()?)
}

#[derive(Deserialize, Debug)]
struct LoginResponse {
    auth: Option<String>,
    error: Option<String>,
}

impl LoginResponse {
    fn into_token(self) -> Result<String, ApiError> {
        match self.auth {
            Some(auth) if !auth.is_empty() => Ok(auth),
            _ => match self.error {
                Some(error) if error == VERIFICATION_CODE_ERROR => {
                    Err(ApiError::VerificationRequired)
                }
                error => Err(ApiError::Authentication(
                    error.unwrap_or_else(|| UNKNOWN_ERROR.into()),
                )),
            },
        }
    }
}

/// Common shape of the metadata-returning endpoints.
#[derive(Deserialize, Debug)]
struct Envelope<T> {
    metadata: Option<T>,
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_metadata(self, operation: &'static str) -> Result<T, ApiError> {
        match self.metadata {
            Some(metadata) => Ok(metadata),
            None => Err(ApiError::MissingMetadata {
                operation,
                message: self.error.unwrap_or_else(|| UNKNOWN_ERROR.into()),
            }),
        }
    }
}

#[derive(Deserialize, Debug)]
struct FolderListing {
    #[serde(default)]
    contents: Vec<RemoteEntry>,
}

#[derive(Deserialize, Debug)]
struct CreatedFolder {
    folderid: Option<u64>,
}

/// `uploadfile` answers with a list of metadata, one per uploaded file, but a
/// single object is accepted too.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Reader that reports the running byte count on every read.
struct ProgressReader<R> {
    inner: R,
    loaded: u64,
    total: u64,
    events: Sender<UploadEvent>,
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.loaded += n as u64;
            let _ = self.events.send(UploadEvent::Progress(UploadProgress {
                loaded: self.loaded,
                total: self.total,
            }));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn parse<T: DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn login_returns_auth_token() {
        let res: LoginResponse = parse(json!({ "result": 0, "auth": "tok123" }));
        assert_eq!(res.into_token().unwrap(), "tok123");
    }

    #[test]
    fn login_without_auth_reports_server_error() {
        let res: LoginResponse = parse(json!({ "result": 2000, "error": "Log in failed." }));
        match res.into_token() {
            Err(ApiError::Authentication(msg)) => assert_eq!(msg, "Log in failed."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn login_without_auth_or_error_is_unknown() {
        let res: LoginResponse = parse(json!({}));
        match res.into_token() {
            Err(ApiError::Authentication(msg)) => assert_eq!(msg, UNKNOWN_ERROR),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn login_asking_for_code_needs_verification() {
        let res: LoginResponse = parse(json!({ "result": 2297, "error": "Please provide 'code'." }));
        assert!(matches!(res.into_token(), Err(ApiError::VerificationRequired)));
    }

    #[test]
    fn listing_without_metadata_is_an_error() {
        let res: Envelope<FolderListing> = parse(json!({ "result": 2005, "error": "Directory does not exist." }));
        match res.into_metadata("list folder contents") {
            Err(ApiError::MissingMetadata { operation, message }) => {
                assert_eq!(operation, "list folder contents");
                assert_eq!(message, "Directory does not exist.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn listing_parses_entries() {
        let res: Envelope<FolderListing> = parse(json!({
            "result": 0,
            "metadata": {
                "name": "/",
                "isfolder": true,
                "contents": [
                    { "name": "Docs", "isfolder": true, "folderid": 12 },
                    { "name": "notes.txt", "isfolder": false, "fileid": 99, "size": 4 }
                ]
            }
        }));
        let contents = res.into_metadata("list").unwrap().contents;
        assert_eq!(contents.len(), 2);
        assert!(contents[0].isfolder);
        assert_eq!(contents[0].folderid, Some(12));
        assert!(!contents[1].isfolder);
        assert_eq!(contents[1].fileid, Some(99));
    }

    #[test]
    fn listing_without_contents_is_empty() {
        let res: Envelope<FolderListing> = parse(json!({ "metadata": { "name": "/" } }));
        assert!(res.into_metadata("list").unwrap().contents.is_empty());
    }

    #[test]
    fn upload_metadata_accepts_list_or_object() {
        let many: Envelope<OneOrMany<FileMetadata>> = parse(json!({
            "metadata": [{ "name": "backup_docs.zip", "fileid": 7, "size": 10 }]
        }));
        let one: Envelope<OneOrMany<FileMetadata>> = parse(json!({
            "metadata": { "name": "backup_docs.zip" }
        }));
        let many = many.into_metadata("upload").unwrap().into_vec();
        let one = one.into_metadata("upload").unwrap().into_vec();
        assert_eq!(many[0].fileid, Some(7));
        assert_eq!(one[0].name, "backup_docs.zip");
        assert_eq!(one[0].fileid, None);
    }

    #[test]
    fn progress_rounds_like_the_console_expects() {
        let p = UploadProgress {
            loaded: 3 * 1024 * 1024 / 2,
            total: 10 * 1024 * 1024,
        };
        assert_eq!(p.percent(), 15);
        assert_eq!(p.loaded_mb(), 2);
        assert_eq!(p.total_mb(), 10);

        let empty = UploadProgress { loaded: 0, total: 0 };
        assert_eq!(empty.percent(), 100);
    }

    #[test]
    fn progress_reader_reports_cumulative_bytes() {
        let (tx, rx) = unbounded();
        let mut reader = ProgressReader {
            inner: Cursor::new(vec![1u8; 10]),
            loaded: 0,
            total: 10,
            events: tx,
        };
        let mut buf = [0u8; 4];
        while reader.read(&mut buf).unwrap() > 0 {}
        drop(reader);

        let loaded: Vec<u64> = rx
            .iter()
            .map(|event| match event {
                UploadEvent::Progress(p) => p.loaded,
                UploadEvent::Finished(_) => panic!("reader never finishes"),
            })
            .collect();
        assert_eq!(loaded, vec![4, 8, 10]);
    }

    #[test]
    fn handle_wait_replays_progress_then_result() {
        let (tx, rx) = unbounded();
        for loaded in [5, 10] {
            tx.send(UploadEvent::Progress(UploadProgress { loaded, total: 10 }))
                .unwrap();
        }
        tx.send(UploadEvent::Finished(Ok(vec![]))).unwrap();

        let handle = UploadHandle::new("a.zip", rx);
        let mut seen = Vec::new();
        let result = handle.wait(|p| seen.push(p.percent()));
        assert!(result.unwrap().is_empty());
        assert_eq!(seen, vec![50, 100]);
    }

    #[test]
    fn handle_poll_does_not_block() {
        let (tx, rx) = unbounded();
        let handle = UploadHandle::new("a.zip", rx);
        assert!(handle.poll().is_none());
        tx.send(UploadEvent::Progress(UploadProgress { loaded: 1, total: 2 }))
            .unwrap();
        assert!(matches!(handle.poll(), Some(UploadEvent::Progress(_))));
    }

    #[test]
    fn handle_without_result_is_interrupted() {
        let (tx, rx) = unbounded::<UploadEvent>();
        drop(tx);
        let handle = UploadHandle::new("a.zip", rx);
        assert!(matches!(
            handle.wait(|_| {}),
            Err(ApiError::UploadInterrupted(_))
        ));
    }
}
