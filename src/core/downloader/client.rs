use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventSender, LauncherEvent};

/// Progress of a running download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadProgress {
    Percent { value: u8 },
    /// The server sent no content length; show a busy indicator.
    Indeterminate { bytes: u64 },
}

/// Sequence produced by a download: any number of `Progress`, then exactly
/// one of `Done` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Progress { progress: DownloadProgress },
    Done { path: PathBuf },
    Failed { reason: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadEvent::Progress { .. })
    }
}

/// Result of streaming a body to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub bytes: u64,
    pub sha256: String,
}

type Registry = Arc<Mutex<HashMap<String, AbortHandle>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, AbortHandle>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Streams release assets to disk off the caller's line of control.
pub struct Downloader {
    client: Client,
    /// Optional launcher-wide channel mirroring every task's events.
    events: Option<EventSender>,
    active: Registry,
}

/// Handle to one in-flight download. Dropping it abandons the download.
pub struct DownloadTask {
    pub id: String,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    handle: JoinHandle<()>,
    registry: Registry,
}

impl DownloadTask {
    /// Next event, or `None` once the terminal event has been consumed.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Drain the task until it finishes; `Ok(path)` on success.
    pub async fn finish(mut self) -> LauncherResult<PathBuf> {
        while let Some(event) = self.next_event().await {
            match event {
                DownloadEvent::Progress { .. } => {}
                DownloadEvent::Done { path } => return Ok(path),
                DownloadEvent::Failed { reason } => return Err(LauncherError::Other(reason)),
            }
        }
        Err(LauncherError::Other(format!("download {} was cancelled", self.id)))
    }

    /// Best effort: the HTTP request is dropped, a partial `.part` file may remain.
    pub fn cancel(self) {
        // Abort happens in Drop.
        info!("Download {} cancelled", self.id);
    }
}

impl Drop for DownloadTask {
    fn drop(&mut self) {
        self.handle.abort();
        lock(&self.registry).remove(&self.id);
    }
}

impl Downloader {
    pub fn new(client: Client, events: Option<EventSender>) -> Self {
        Self {
            client,
            events,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start downloading `url` into `dest`.
    ///
    /// The body goes to `<dest>.part` first and is renamed into place only
    /// after the stream (and the optional SHA-256 check) completed.
    pub fn download(
        &self,
        url: impl Into<String>,
        dest: impl Into<PathBuf>,
        expected_sha256: Option<String>,
    ) -> DownloadTask {
        let id = Uuid::new_v4().to_string();
        let url = url.into();
        let dest = dest.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let client = self.client.clone();
        let mirror = self.events.clone();
        let registry = self.active.clone();
        let task_id = id.clone();

        // Held until the handle is registered, so a fast task cannot
        // unregister before it was registered.
        let mut active = lock(&self.active);
        let handle = tokio::spawn(async move {
            let emit = |event: DownloadEvent| {
                if let Some(mirror) = &mirror {
                    let _ = mirror.send(LauncherEvent::Download {
                        task_id: task_id.clone(),
                        event: event.clone(),
                    });
                }
                let _ = tx.send(event);
            };

            info!("Download {} started: {} -> {:?}", task_id, url, dest);
            let result = fetch_to_file(&client, &url, &dest, expected_sha256.as_deref(), |p| {
                emit(DownloadEvent::Progress { progress: p })
            })
            .await;

            match result {
                Ok(()) => {
                    info!("Download {} finished: {:?}", task_id, dest);
                    emit(DownloadEvent::Done { path: dest });
                }
                Err(e) => {
                    warn!("Download {} failed: {}", task_id, e);
                    emit(DownloadEvent::Failed {
                        reason: e.to_string(),
                    });
                }
            }

            lock(&registry).remove(&task_id);
        });
        active.insert(id.clone(), handle.abort_handle());
        drop(active);

        DownloadTask {
            id,
            events: rx,
            handle,
            registry: self.active.clone(),
        }
    }

    /// Ids of downloads still in flight.
    pub fn active(&self) -> Vec<String> {
        lock(&self.active).keys().cloned().collect()
    }

    /// Abort a download by id; `false` if it is not running.
    pub fn cancel(&self, id: &str) -> bool {
        let handle = lock(&self.active).remove(id);
        match handle {
            Some(handle) => {
                handle.abort();
                info!("Download {} cancelled", id);
                true
            }
            None => false,
        }
    }
}

async fn fetch_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
    on_progress: impl FnMut(DownloadProgress),
) -> LauncherResult<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let total = response.content_length();
    let part = part_path(dest);
    let summary = {
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| LauncherError::io(&part, e))?;
        let summary = write_stream(response.bytes_stream(), total, &mut file, on_progress).await?;
        file.flush().await.map_err(|e| LauncherError::io(&part, e))?;
        summary
        // file is dropped here, before the rename
    };
    debug!("Wrote {} bytes to {:?}", summary.bytes, part);

    if let Some(expected) = expected_sha256 {
        if !expected.eq_ignore_ascii_case(&summary.sha256) {
            return Err(LauncherError::DigestMismatch {
                path: part,
                expected: expected.to_string(),
                actual: summary.sha256,
            });
        }
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| LauncherError::io(dest, e))?;
    mark_executable(dest).await
}

/// Copy a chunked body into `writer`, reporting progress after each chunk.
///
/// With a known `total` the percentages are non-decreasing and the last one is
/// exactly 100; a body shorter than announced is an error.
pub async fn write_stream<S, B, E, W>(
    stream: S,
    total: Option<u64>,
    writer: &mut W,
    mut on_progress: impl FnMut(DownloadProgress),
) -> LauncherResult<StreamSummary>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LauncherError>,
    W: AsyncWrite + Unpin,
{
    futures_util::pin_mut!(stream);

    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut last_percent: Option<u8> = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        let bytes = chunk.as_ref();
        writer.write_all(bytes).await?;
        hasher.update(bytes);
        downloaded += bytes.len() as u64;

        match total {
            Some(total) => {
                let percent = percent_of(downloaded, total);
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    on_progress(DownloadProgress::Percent { value: percent });
                }
            }
            None => on_progress(DownloadProgress::Indeterminate { bytes: downloaded }),
        }
    }

    if let Some(total) = total {
        if downloaded < total {
            return Err(LauncherError::Other(format!(
                "body ended after {downloaded} of {total} bytes"
            )));
        }
        if last_percent != Some(100) {
            on_progress(DownloadProgress::Percent { value: 100 });
        }
    }

    Ok(StreamSummary {
        bytes: downloaded,
        sha256: hex::encode(hasher.finalize()),
    })
}

fn percent_of(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (downloaded.saturating_mul(100) / total).min(100) as u8
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn mark_executable(path: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = tokio::fs::metadata(path)
            .await
            .map_err(|e| LauncherError::io(path, e))?
            .permissions();
        perms.set_mode(perms.mode() | 0o755);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|e| LauncherError::io(path, e))?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn chunks(total: usize, size: usize) -> Vec<Result<Vec<u8>, LauncherError>> {
        (0..total / size).map(|i| Ok(vec![i as u8; size])).collect()
    }

    #[tokio::test]
    async fn percentages_are_monotonic_and_end_at_100() {
        let mut sink = Vec::new();
        let mut seen = Vec::new();
        let summary = write_stream(
            stream::iter(chunks(1000, 100)),
            Some(1000),
            &mut sink,
            |p| seen.push(p),
        )
        .await
        .unwrap();

        assert_eq!(summary.bytes, 1000);
        assert_eq!(sink.len(), 1000);

        let values: Vec<u8> = seen
            .iter()
            .map(|p| match p {
                DownloadProgress::Percent { value } => *value,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.last(), Some(&100));
        assert_eq!(values, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[tokio::test]
    async fn unknown_length_is_indeterminate() {
        let mut sink = Vec::new();
        let mut seen = Vec::new();
        write_stream(stream::iter(chunks(300, 100)), None, &mut sink, |p| {
            seen.push(p)
        })
        .await
        .unwrap();

        assert_eq!(
            seen,
            vec![
                DownloadProgress::Indeterminate { bytes: 100 },
                DownloadProgress::Indeterminate { bytes: 200 },
                DownloadProgress::Indeterminate { bytes: 300 },
            ]
        );
    }

    #[tokio::test]
    async fn stream_error_fails_the_whole_download() {
        let items: Vec<Result<Vec<u8>, LauncherError>> = vec![
            Ok(vec![0; 100]),
            Err(LauncherError::Other("connection reset".into())),
        ];
        let mut sink = Vec::new();
        let err = write_stream(stream::iter(items), Some(1000), &mut sink, |_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn short_body_is_an_error() {
        let mut sink = Vec::new();
        let err = write_stream(stream::iter(chunks(500, 100)), Some(1000), &mut sink, |_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500 of 1000"));
    }

    #[tokio::test]
    async fn digest_matches_sha256_of_body() {
        let mut sink = Vec::new();
        let body: Vec<Result<&[u8], LauncherError>> = vec![Ok(&b"krom"[..]), Ok(&b"pir"[..])];
        let summary = write_stream(stream::iter(body), Some(7), &mut sink, |_| {})
            .await
            .unwrap();
        assert_eq!(summary.sha256, hex::encode(Sha256::digest(b"krompir")));
    }

    #[test]
    fn part_file_sits_next_to_destination() {
        assert_eq!(
            part_path(Path::new("/tmp/dl/krompir-linux")),
            PathBuf::from("/tmp/dl/krompir-linux.part")
        );
    }

    #[tokio::test]
    async fn unreachable_host_ends_in_failed() {
        let dir = tempfile::tempdir().unwrap();
        let client = crate::core::http::build_http_client().unwrap();
        let downloader = Downloader::new(client, None);

        // Port 9 on localhost (discard) is closed in test environments.
        let mut task = downloader.download(
            "http://127.0.0.1:9/asset",
            dir.path().join("asset"),
            None,
        );
        let mut last = None;
        while let Some(event) = task.next_event().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(DownloadEvent::Failed { .. })));
        assert!(!dir.path().join("asset").exists());
    }

    const ASSET_HEADER: &[u8] = b"HTTP/1.1 200 OK\r\n\
        Content-Type: application/octet-stream\r\n\
        Content-Length: 1000\r\n\r\n";

    /// Accept one connection and consume the request head.
    async fn accept_request(listener: &TcpListener) -> TcpStream {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client hung up before sending a request");
            request.extend_from_slice(&buf[..n]);
        }
        socket
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_lands_in_place_and_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut socket = accept_request(&listener).await;
            socket.write_all(ASSET_HEADER).await.unwrap();
            for i in 0..10u8 {
                socket.write_all(&[i; 100]).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("v1.2.0").join("krompir-linux");
        let client = crate::core::http::build_http_client().unwrap();
        let downloader = Downloader::new(client, None);
        let mut task = downloader.download(format!("http://{addr}/krompir-linux"), &dest, None);

        let mut seen = Vec::new();
        while let Some(event) = task.next_event().await {
            seen.push(event);
        }
        server.await.unwrap();

        assert_eq!(seen.last(), Some(&DownloadEvent::Done { path: dest.clone() }));
        let percents: Vec<u8> = seen
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress {
                    progress: DownloadProgress::Percent { value },
                } => Some(*value),
                _ => None,
            })
            .collect();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last(), Some(&100));

        let meta = std::fs::metadata(&dest).unwrap();
        assert_eq!(meta.len(), 1000);
        assert_eq!(meta.permissions().mode() & 0o755, 0o755);
        assert!(!part_path(&dest).exists());
        assert!(downloader.active().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_task_aborts_the_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut socket = accept_request(&listener).await;
            socket.write_all(ASSET_HEADER).await.unwrap();
            socket.write_all(&[7u8; 100]).await.unwrap();
            socket.flush().await.unwrap();
            // Stall; the next read only returns once the client hangs up.
            let mut buf = [0u8; 16];
            tokio::time::timeout(Duration::from_secs(5), socket.read(&mut buf)).await
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("krompir-linux");
        let client = crate::core::http::build_http_client().unwrap();
        let downloader = Downloader::new(client, None);
        let mut task = downloader.download(format!("http://{addr}/krompir-linux"), &dest, None);

        assert_eq!(
            task.next_event().await,
            Some(DownloadEvent::Progress {
                progress: DownloadProgress::Percent { value: 10 }
            })
        );
        assert_eq!(downloader.active(), vec![task.id.clone()]);

        drop(task);
        assert!(downloader.active().is_empty());

        let read = server.await.unwrap();
        assert!(
            matches!(read, Ok(Ok(0))),
            "server did not see the connection close: {read:?}"
        );
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn finished_file_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        mark_executable(&path).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }
}
