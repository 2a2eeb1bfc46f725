// src/repository/transport.rs

//! Byte transports for repository URLs
//!
//! A [`Transport`] moves the bytes behind one URL into a sink and classifies
//! failures as [`TransportError`] so the caller can decide between trying
//! the next repository and retrying the same one. Responses are always
//! streamed in chunks, never buffered whole.
//!
//! HTTP requests run on a short-lived thread of their own. The calling
//! thread only waits on a channel, so cancellation is observed within one
//! poll interval even while the server has not answered yet.

use crate::config::{Credentials, Proxy, RemoteRepository};
use crate::error::TransportError;
use dashmap::DashMap;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

/// Buffer size for streaming transfers (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Chunks buffered between a request thread and its caller
const CHANNEL_DEPTH: usize = 16;

/// How often a caller waiting on a request re-checks cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Progress callback: bytes transferred so far and the total when known
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Fetches repository resources
pub trait Transport: Send + Sync {
    /// Stream `url` from `repository` into `sink`, returning the byte count
    fn get(
        &self,
        repository: &RemoteRepository,
        url: &str,
        sink: &mut dyn Write,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransportError>;

    /// Fetch a small resource (checksum sidecar, metadata) into memory
    fn get_bytes(
        &self,
        repository: &RemoteRepository,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::new();
        self.get(repository, url, &mut buffer, &mut |_, _| {}, cancel)?;
        Ok(buffer)
    }
}

/// Copy a reader into a sink in chunks, honoring cancellation between chunks
fn stream(
    reader: &mut dyn Read,
    sink: &mut dyn Write,
    total: Option<u64>,
    progress: ProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<u64, TransportError> {
    let mut transferred: u64 = 0;
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Transient(format!("Failed to read response: {e}"))),
        };

        sink.write_all(&buffer[..bytes_read])
            .map_err(|e| TransportError::Fatal(format!("Failed to write data: {e}")))?;

        transferred += bytes_read as u64;
        progress(transferred, total);
    }

    ensure_complete(transferred, total)
}

/// Fail a transfer that ended before its announced length
fn ensure_complete(transferred: u64, total: Option<u64>) -> Result<u64, TransportError> {
    if let Some(expected) = total
        && transferred < expected
    {
        return Err(TransportError::Transient(format!(
            "Connection closed after {transferred} of {expected} bytes"
        )));
    }

    Ok(transferred)
}

/// HTTP(S) transport over a blocking reqwest client
///
/// One client is built per distinct proxy and reused for every request.
pub struct HttpTransport {
    connect_timeout: Duration,
    request_timeout: Duration,
    clients: DashMap<Option<Proxy>, Client>,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
            clients: DashMap::new(),
        }
    }

    fn client(&self, proxy: Option<&Proxy>) -> Result<Client, TransportError> {
        let key = proxy.cloned();
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(concat!("artifetch/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy {
            let mut reqwest_proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| TransportError::Fatal(format!("Invalid proxy {}: {e}", proxy.url())))?;
            if let (Some(username), Some(password)) = (&proxy.username, &proxy.password) {
                reqwest_proxy = reqwest_proxy.basic_auth(username, password);
            }
            builder = builder.proxy(reqwest_proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Fatal(format!("Failed to create HTTP client: {e}")))?;
        self.clients.insert(key, client.clone());
        Ok(client)
    }
}

/// Map an HTTP status to a transport outcome
pub fn classify_status(status: StatusCode) -> Option<TransportError> {
    if status.is_success() {
        return None;
    }
    Some(match status.as_u16() {
        404 | 410 => TransportError::NotFound,
        408 | 429 => TransportError::Transient(format!("HTTP {status}")),
        code if code >= 500 => TransportError::Transient(format!("HTTP {status}")),
        _ => TransportError::Fatal(format!("HTTP {status}")),
    })
}

impl Transport for HttpTransport {
    fn get(
        &self,
        repository: &RemoteRepository,
        url: &str,
        sink: &mut dyn Write,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let client = self.client(repository.proxy.as_ref())?;
        let basic_auth = match &repository.credentials {
            Some(Credentials::Basic { username, password }) => Some((username.clone(), password.clone())),
            Some(Credentials::Key { .. }) => {
                debug!("Key credentials for {} are not used over HTTP", repository.id);
                None
            }
            None => None,
        };

        debug!("GET {}", url);
        let chunks = spawn_request(client, url.to_string(), basic_auth)?;

        let mut total = None;
        let mut transferred: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                debug!("Abandoning request to {}", url);
                return Err(TransportError::Cancelled);
            }
            match chunks.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(Chunk::Head(length)) => total = length,
                Ok(Chunk::Data(bytes)) => {
                    sink.write_all(&bytes)
                        .map_err(|e| TransportError::Fatal(format!("Failed to write data: {e}")))?;
                    transferred += bytes.len() as u64;
                    progress(transferred, total);
                }
                Ok(Chunk::Done) => break,
                Ok(Chunk::Failed(error)) => return Err(error),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Transient(format!("Request to {url} ended unexpectedly")));
                }
            }
        }

        ensure_complete(transferred, total)
    }
}

/// Messages from a request thread to the waiting caller
enum Chunk {
    Head(Option<u64>),
    Data(Vec<u8>),
    Done,
    Failed(TransportError),
}

/// Run one blocking request on its own thread, streaming the body back
///
/// The caller waits on the channel and can walk away at any time; the
/// thread exits at its next send once the receiver is gone.
fn spawn_request(
    client: Client,
    url: String,
    basic_auth: Option<(String, String)>,
) -> Result<Receiver<Chunk>, TransportError> {
    let (sender, receiver) = mpsc::sync_channel(CHANNEL_DEPTH);
    thread::Builder::new()
        .name("artifetch-http".to_string())
        .spawn(move || {
            let outcome = perform_request(&client, &url, basic_auth, &sender);
            if let Err(error) = outcome {
                let _ = sender.send(Chunk::Failed(error));
            }
        })
        .map_err(|e| TransportError::Fatal(format!("Failed to start request thread: {e}")))?;
    Ok(receiver)
}

/// Body of a request thread; returns `Ok` once the receiver has what it needs
fn perform_request(
    client: &Client,
    url: &str,
    basic_auth: Option<(String, String)>,
    sender: &SyncSender<Chunk>,
) -> Result<(), TransportError> {
    let mut request = client.get(url);
    if let Some((username, password)) = basic_auth {
        request = request.basic_auth(username, Some(password));
    }

    let mut response = request.send().map_err(|e| {
        if e.is_builder() {
            TransportError::Fatal(format!("Invalid request for {url}: {e}"))
        } else {
            TransportError::Transient(format!("Request to {url} failed: {e}"))
        }
    })?;

    if let Some(error) = classify_status(response.status()) {
        if !matches!(error, TransportError::NotFound) {
            warn!("{} returned HTTP {}", url, response.status());
        }
        return Err(error);
    }

    if sender.send(Chunk::Head(response.content_length())).is_err() {
        return Ok(());
    }

    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    loop {
        let bytes_read = match response.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransportError::Transient(format!("Failed to read response: {e}"))),
        };
        if sender.send(Chunk::Data(buffer[..bytes_read].to_vec())).is_err() {
            trace!("Receiver for {} is gone", url);
            return Ok(());
        }
    }

    let _ = sender.send(Chunk::Done);
    Ok(())
}

/// Transport for `file://` repositories
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn get(
        &self,
        _repository: &RemoteRepository,
        url: &str,
        sink: &mut dyn Write,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransportError> {
        let path = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.to_file_path().ok())
            .ok_or_else(|| TransportError::Fatal(format!("Not a file URL: {url}")))?;

        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(TransportError::NotFound),
            Err(e) => return Err(TransportError::Fatal(format!("Failed to open {}: {e}", path.display()))),
        };
        if path.is_dir() {
            return Err(TransportError::NotFound);
        }

        let total = file.metadata().ok().map(|m| m.len());
        stream(&mut file, sink, total, progress, cancel)
    }
}

/// Dispatches by URL scheme to the HTTP or file transport
pub struct DefaultTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl DefaultTransport {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            http: HttpTransport::new(connect_timeout, request_timeout),
            file: FileTransport,
        }
    }
}

impl Transport for DefaultTransport {
    fn get(
        &self,
        repository: &RemoteRepository,
        url: &str,
        sink: &mut dyn Write,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, TransportError> {
        match url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase()) {
            Some(scheme) if scheme == "http" || scheme == "https" => {
                self.http.get(repository, url, sink, progress, cancel)
            }
            Some(scheme) if scheme == "file" => self.file.get(repository, url, sink, progress, cancel),
            _ => Err(TransportError::Fatal(format!("Unsupported repository URL {url}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_url(path: &std::path::Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), Some(TransportError::NotFound));
        assert_eq!(classify_status(StatusCode::GONE), Some(TransportError::NotFound));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            Some(TransportError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(TransportError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(TransportError::Fatal(_))
        ));
    }

    #[test]
    fn test_file_transport() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("lib-1.0.jar");
        std::fs::write(&path, b"0123456789").unwrap();
        let repo = RemoteRepository::new("local", file_url(temp_dir.path()));
        let cancel = CancellationToken::new();

        let mut sink = Vec::new();
        let mut last = (0, None);
        let n = FileTransport
            .get(&repo, &file_url(&path), &mut sink, &mut |done, total| last = (done, total), &cancel)
            .unwrap();
        assert_eq!(n, 10);
        assert_eq!(sink, b"0123456789");
        assert_eq!(last, (10, Some(10)));

        let missing = FileTransport.get_bytes(&repo, &file_url(&temp_dir.path().join("nope")), &cancel);
        assert_eq!(missing, Err(TransportError::NotFound));
    }

    #[test]
    fn test_cancelled_transfer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.jar");
        std::fs::write(&path, b"data").unwrap();
        let repo = RemoteRepository::new("local", file_url(temp_dir.path()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = FileTransport.get_bytes(&repo, &file_url(&path), &cancel);
        assert_eq!(result, Err(TransportError::Cancelled));
    }

    #[test]
    fn test_unsupported_scheme() {
        let transport = DefaultTransport::new(Duration::from_secs(1), Duration::from_secs(1));
        let repo = RemoteRepository::new("ftp", "ftp://example.com/repo");
        let result = transport.get_bytes(&repo, "ftp://example.com/repo/a.jar", &CancellationToken::new());
        assert!(matches!(result, Err(TransportError::Fatal(_))));
    }
}
