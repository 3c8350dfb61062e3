//! Background download worker.
//!
//! A single task receives batches over a channel and downloads their items one after
//! another into the media directory. Failures of individual items are logged and
//! skipped; the batch always runs to the end and finishes with a [`DownloadReport`].
//! Items are fetched into `.part` files and only moved over the existing media files
//! once the whole batch has been fetched.

use super::batch::{storage_extension, MediaBatch, MediaRequest};
use super::registry::{MediaItem, MediaKind};
use crate::receiver::AppEvent;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download worker is not running")]
    WorkerGone,
}

/// Progress and completion notifications sent to the receiver runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress {
        batch_id: u64,
        completed: usize,
        total: usize,
    },
    Finished(DownloadReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub batch_id: u64,
    pub attempted: usize,
    /// Successfully downloaded items, in batch order
    pub items: Vec<MediaItem>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> usize {
        self.items.len()
    }

    pub fn is_complete(&self) -> bool {
        self.items.len() == self.attempted
    }
}

struct DownloadJob {
    batch_id: u64,
    batch: MediaBatch,
}

/// Handle for queueing batches on the download worker.
#[derive(Clone)]
pub struct DownloadHandle {
    jobs: mpsc::Sender<DownloadJob>,
}

impl DownloadHandle {
    pub fn spawn(
        client: reqwest::Client,
        media_dir: PathBuf,
        events: mpsc::Sender<AppEvent>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (jobs_tx, mut jobs_rx) = mpsc::channel::<DownloadJob>(16);

        let handle = tokio::spawn(async move {
            info!("Download worker started, media dir: {}", media_dir.display());
            loop {
                let job = tokio::select! {
                    _ = cancel.cancelled() => break,
                    job = jobs_rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                let report = tokio::select! {
                    _ = cancel.cancelled() => break,
                    report = run_batch(&client, &media_dir, job.batch_id, job.batch, &events) => report,
                };

                if events
                    .send(AppEvent::Download(DownloadEvent::Finished(report)))
                    .await
                    .is_err()
                {
                    warn!("Receiver runtime gone, stopping download worker");
                    break;
                }
            }
            info!("Download worker stopped");
        });

        (Self { jobs: jobs_tx }, handle)
    }

    pub async fn queue(&self, batch_id: u64, batch: MediaBatch) -> Result<(), DownloadError> {
        debug!("Queueing batch {} with {} items", batch_id, batch.len());
        self.jobs
            .send(DownloadJob { batch_id, batch })
            .await
            .map_err(|_| DownloadError::WorkerGone)
    }
}

async fn run_batch(
    client: &reqwest::Client,
    media_dir: &Path,
    batch_id: u64,
    batch: MediaBatch,
    events: &mpsc::Sender<AppEvent>,
) -> DownloadReport {
    let total = batch.len();
    let mut staged = Vec::with_capacity(total);

    if let Err(e) = tokio::fs::create_dir_all(media_dir).await {
        error!(
            "Failed to create media directory {}: {}",
            media_dir.display(),
            e
        );
    }

    for (position, request) in batch.requests.into_iter().enumerate() {
        let target = target_path(media_dir, &request);
        match stage(client, &request.url, &target).await {
            Ok(download) => {
                debug!(
                    "Fetched item {} from {} ({} bytes)",
                    request.index, request.url, download.bytes
                );
                staged.push((request, download));
            }
            Err(e) => {
                error!("Download failed for item {}: {}", request.index, e);
            }
        }

        let progress = DownloadEvent::Progress {
            batch_id,
            completed: position + 1,
            total,
        };
        if events.send(AppEvent::Download(progress)).await.is_err() {
            warn!("Could not report download progress");
        }
    }

    // files on disk belong to the media on screen until the whole batch is in
    let mut items = Vec::with_capacity(staged.len());
    for (request, download) in staged {
        let target = download.target.clone();
        match download.commit().await {
            Ok(_) => items.push(MediaItem {
                url: request.url,
                local_path: target,
                kind: request.kind,
                index: request.index,
                name: request.name,
            }),
            Err(e) => error!("Could not store item {}: {}", request.index, e),
        }
    }

    info!(
        "Batch {} finished: {}/{} items downloaded",
        batch_id,
        items.len(),
        total
    );

    DownloadReport {
        batch_id,
        attempted: total,
        items,
    }
}

/// Local file name for a request: `image_<i>.<ext>` or `video_<i>.<ext>`.
pub fn target_path(media_dir: &Path, request: &MediaRequest) -> PathBuf {
    let prefix = match request.kind {
        MediaKind::Image => "image",
        MediaKind::Video => "video",
    };
    let ext = storage_extension(&request.url, request.kind);
    media_dir.join(format!("{}_{}.{}", prefix, request.index, ext))
}

/// A fetched item waiting next to its target as `<target>.part`.
struct StagedDownload {
    partial: PathBuf,
    target: PathBuf,
    bytes: u64,
}

impl StagedDownload {
    /// Moves the fetched file over the target, replacing any previous file.
    async fn commit(self) -> Result<u64, DownloadError> {
        tokio::fs::rename(&self.partial, &self.target).await?;
        Ok(self.bytes)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn stage(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> Result<StagedDownload, DownloadError> {
    let partial = partial_path(target);
    match stream_into(client, url, &partial).await {
        Ok(bytes) => Ok(StagedDownload {
            partial,
            target: target.to_path_buf(),
            bytes,
        }),
        Err(e) => {
            if tokio::fs::try_exists(&partial).await.unwrap_or(false) {
                let _ = tokio::fs::remove_file(&partial).await;
            }
            Err(e)
        }
    }
}

async fn stream_into(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut response = client.get(url).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn download_to(
        client: &reqwest::Client,
        url: &str,
        target: &Path,
    ) -> Result<u64, DownloadError> {
        stage(client, url, target).await?.commit().await
    }

    /// Serves `body` to every connection with a minimal HTTP/1.1 response.
    async fn serve(body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    fn request(index: usize, url: String, kind: MediaKind) -> MediaRequest {
        MediaRequest {
            index,
            url,
            kind,
            name: None,
        }
    }

    #[test]
    fn target_path_uses_kind_prefix_and_index() {
        let dir = Path::new("/media");
        let image = request(3, "https://a.com/p.png".into(), MediaKind::Image);
        let video = request(0, "https://a.com/clip".into(), MediaKind::Video);

        assert_eq!(target_path(dir, &image), PathBuf::from("/media/image_3.png"));
        assert_eq!(target_path(dir, &video), PathBuf::from("/media/video_0.mp4"));
    }

    #[tokio::test]
    async fn download_replaces_existing_file() {
        let base = serve(b"fresh").await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("image_0.jpg");
        tokio::fs::write(&target, b"stale content").await.unwrap();

        let bytes = download_to(&reqwest::Client::new(), &format!("{}/a.jpg", base), &target)
            .await
            .unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"fresh");
        assert!(!tokio::fs::try_exists(partial_path(&target)).await.unwrap());
    }

    #[tokio::test]
    async fn failed_download_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("image_0.jpg");
        tokio::fs::write(&target, b"old media").await.unwrap();

        // nothing listens on port 1
        let result = download_to(&reqwest::Client::new(), "http://127.0.0.1:1/a.jpg", &target).await;

        assert!(result.is_err());
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"old media");
        assert!(!tokio::fs::try_exists(partial_path(&target)).await.unwrap());
    }

    #[tokio::test]
    async fn failed_batch_leaves_current_media_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let current = dir.path().join("image_0.jpg");
        tokio::fs::write(&current, b"old media").await.unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let batch = MediaBatch {
            requests: vec![request(0, "http://127.0.0.1:1/a.jpg".into(), MediaKind::Image)],
        };
        let report = run_batch(&reqwest::Client::new(), dir.path(), 3, batch, &events_tx).await;

        assert_eq!(report.succeeded(), 0);
        assert_eq!(tokio::fs::read(&current).await.unwrap(), b"old media");
        assert!(matches!(
            events_rx.recv().await,
            Some(AppEvent::Download(DownloadEvent::Progress { completed: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn failed_item_does_not_abort_batch() {
        let base = serve(b"data").await;
        let dir = tempfile::tempdir().unwrap();
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let (handle, _join) = DownloadHandle::spawn(
            reqwest::Client::new(),
            dir.path().to_path_buf(),
            events_tx,
            cancel.clone(),
        );

        let batch = MediaBatch {
            requests: vec![
                request(0, "not a url".into(), MediaKind::Image),
                request(1, format!("{}/b.jpg", base), MediaKind::Image),
            ],
        };
        handle.queue(7, batch).await.unwrap();

        let mut progress = Vec::new();
        let report = loop {
            match events_rx.recv().await.unwrap() {
                AppEvent::Download(DownloadEvent::Progress { completed, .. }) => {
                    progress.push(completed)
                }
                AppEvent::Download(DownloadEvent::Finished(report)) => break report,
                other => panic!("unexpected event {:?}", other),
            }
        };
        cancel.cancel();

        assert_eq!(progress, vec![1, 2]);
        assert_eq!(report.batch_id, 7);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded(), 1);
        assert!(!report.is_complete());
        assert_eq!(report.items[0].index, 1);
        assert_eq!(
            tokio::fs::read(dir.path().join("image_1.jpg")).await.unwrap(),
            b"data"
        );
    }
}
