//! Binary asset fetcher
//!
//! On-demand downloads of file frames and module-map overlays, independent of the poll
//! loop. A download reports progress on a `watch` channel and resolves to a
//! [`BinaryAssetHandle`]: a `blob:` URL registered in an [`AssetStore`] that owns the
//! received bytes until the handle is released.
//!
//! Release happens exactly once per handle. [`BinaryAssetHandle::release`] consumes the
//! handle, and dropping an unreleased handle releases it, so neither a leak nor a double
//! release can be expressed. [`AssetDialog`] ties handles to the dialog that shows them:
//! a new download supersedes the pending one, a resolved download replaces (and
//! releases) the displayed handle, and closing the dialog aborts and releases
//! everything.

use crate::endpoints::{BinaryBody, Endpoints, FrameRequest};
use crate::error::{AppResult, DashboardError};
use crate::metrics::progress_percent;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Download progress of one asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadProgress {
    /// Total size unknown; bytes received so far
    Indeterminate {
        /// Bytes received
        loaded: u64,
    },
    /// `loaded / total * 100`, within `[0, 100]`
    Percent(f64),
}

impl DownloadProgress {
    /// Progress for `loaded` bytes out of an optional `total`.
    pub fn from_bytes(loaded: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if total > 0 => {
                DownloadProgress::Percent(progress_percent(loaded as f64, total as f64))
            }
            _ => DownloadProgress::Indeterminate { loaded },
        }
    }

    /// Percentage if the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self {
            DownloadProgress::Percent(p) => Some(*p),
            DownloadProgress::Indeterminate { .. } => None,
        }
    }
}

struct Blob {
    bytes: Bytes,
    content_type: Option<String>,
}

#[derive(Default)]
struct StoreInner {
    blobs: HashMap<Uuid, Blob>,
    created: u64,
    released: u64,
}

/// Registry of live blobs, addressed by `blob:` URLs.
#[derive(Clone, Default)]
pub struct AssetStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl AssetStore {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a received body and hand out its owning handle.
    pub fn register(&self, body: BinaryBody) -> BinaryAssetHandle {
        let id = Uuid::new_v4();
        let len = body.bytes.len();
        {
            let mut inner = self.inner.lock();
            inner.blobs.insert(
                id,
                Blob {
                    bytes: body.bytes,
                    content_type: body.content_type,
                },
            );
            inner.created += 1;
        }
        debug!(%id, bytes = len, "Asset registered");
        BinaryAssetHandle {
            id,
            url: format!("blob:{}", id),
            store: self.clone(),
            released: false,
        }
    }

    /// Bytes behind a `blob:` URL, if it is still live.
    pub fn resolve(&self, url: &str) -> Option<Bytes> {
        let id = Uuid::parse_str(url.strip_prefix("blob:")?).ok()?;
        self.inner.lock().blobs.get(&id).map(|blob| blob.bytes.clone())
    }

    /// Handles currently live.
    pub fn live_count(&self) -> usize {
        self.inner.lock().blobs.len()
    }

    /// Handles ever registered.
    pub fn created_count(&self) -> u64 {
        self.inner.lock().created
    }

    /// Handles released so far.
    pub fn release_count(&self) -> u64 {
        self.inner.lock().released
    }

    fn release(&self, id: Uuid) {
        let mut inner = self.inner.lock();
        if inner.blobs.remove(&id).is_some() {
            inner.released += 1;
            debug!(%id, "Asset released");
        }
    }
}

/// Displayable reference to a fetched blob; owns it until released.
pub struct BinaryAssetHandle {
    id: Uuid,
    url: String,
    store: AssetStore,
    released: bool,
}

impl BinaryAssetHandle {
    /// `blob:` URL suitable as a display source.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The received bytes.
    pub fn bytes(&self) -> Bytes {
        self.store
            .inner
            .lock()
            .blobs
            .get(&self.id)
            .map(|blob| blob.bytes.clone())
            .unwrap_or_default()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.store
            .inner
            .lock()
            .blobs
            .get(&self.id)
            .map_or(0, |blob| blob.bytes.len())
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Type` reported by the backend.
    pub fn content_type(&self) -> Option<String> {
        self.store
            .inner
            .lock()
            .blobs
            .get(&self.id)
            .and_then(|blob| blob.content_type.clone())
    }

    /// Write the received bytes to `path`.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> AppResult<()> {
        let path = path.as_ref();
        let bytes = self.bytes();
        tokio::fs::write(path, &bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "Asset saved");
        Ok(())
    }

    /// Free the blob and invalidate the URL.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.store.release(self.id);
        }
    }
}

impl std::fmt::Debug for BinaryAssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryAssetHandle")
            .field("url", &self.url)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for BinaryAssetHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Starts binary downloads.
#[derive(Clone)]
pub struct AssetFetcher {
    endpoints: Endpoints,
    store: AssetStore,
}

impl AssetFetcher {
    /// Fetcher registering its handles in `store`.
    pub fn new(endpoints: Endpoints, store: AssetStore) -> Self {
        Self { endpoints, store }
    }

    /// Registry the handles live in.
    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// Start downloading `request`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self, request: FrameRequest) -> PendingAsset {
        let (progress_tx, progress_rx) =
            watch::channel(DownloadProgress::Indeterminate { loaded: 0 });
        let active = Arc::new(AtomicBool::new(true));
        info!(path = %request.path(), "Opening binary asset");

        let task = tokio::spawn(download(
            self.endpoints.clone(),
            self.store.clone(),
            request.clone(),
            active.clone(),
            progress_tx,
        ));

        PendingAsset {
            request,
            progress: progress_rx,
            active,
            task,
        }
    }
}

async fn download(
    endpoints: Endpoints,
    store: AssetStore,
    request: FrameRequest,
    active: Arc<AtomicBool>,
    progress: watch::Sender<DownloadProgress>,
) -> AppResult<BinaryAssetHandle> {
    let report = |loaded: u64, total: Option<u64>| {
        progress.send_replace(DownloadProgress::from_bytes(loaded, total));
    };
    let body = endpoints.fetch_frame(&request, &report).await?;
    if !active.load(Ordering::Acquire) {
        debug!(path = %request.path(), "Discarding asset of cancelled request");
        return Err(DashboardError::AssetCancelled);
    }
    Ok(store.register(body))
}

/// A download in flight. Dropping it cancels the download.
pub struct PendingAsset {
    request: FrameRequest,
    progress: watch::Receiver<DownloadProgress>,
    active: Arc<AtomicBool>,
    task: JoinHandle<AppResult<BinaryAssetHandle>>,
}

impl PendingAsset {
    /// What is being downloaded.
    pub fn request(&self) -> &FrameRequest {
        &self.request
    }

    /// Progress updates.
    pub fn progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress.clone()
    }

    /// Wait for the handle.
    pub async fn wait(&mut self) -> AppResult<BinaryAssetHandle> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(DashboardError::AssetCancelled),
            Err(e) => Err(DashboardError::Task(e.to_string())),
        }
    }

    /// Abort the download; a response that still arrives creates no handle.
    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            debug!(path = %self.request.path(), "Binary asset cancelled");
        }
        self.task.abort();
    }
}

impl Drop for PendingAsset {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The dialog owning at most one displayed handle and one pending download.
pub struct AssetDialog {
    fetcher: AssetFetcher,
    pending: Option<PendingAsset>,
    current: Option<BinaryAssetHandle>,
}

impl AssetDialog {
    /// Closed dialog.
    pub fn new(fetcher: AssetFetcher) -> Self {
        Self {
            fetcher,
            pending: None,
            current: None,
        }
    }

    /// Start loading `request`, superseding any download still pending. The displayed
    /// handle stays visible until the new one is ready.
    pub fn open(&mut self, request: FrameRequest) -> watch::Receiver<DownloadProgress> {
        if let Some(previous) = self.pending.take() {
            previous.cancel();
        }
        let pending = self.fetcher.open(request);
        let progress = pending.progress();
        self.pending = Some(pending);
        progress
    }

    /// Wait for the pending download, display it and release the handle it replaces.
    ///
    /// If the download fails the previous handle stays displayed.
    pub async fn wait_ready(&mut self) -> AppResult<&BinaryAssetHandle> {
        let Some(mut pending) = self.pending.take() else {
            return Err(DashboardError::AssetCancelled);
        };
        let handle = pending.wait().await?;
        if let Some(previous) = self.current.take() {
            previous.release();
        }
        info!(url = %handle.url(), bytes = handle.len(), "Binary asset ready");
        Ok(self.current.insert(handle))
    }

    /// Handle on display.
    pub fn current(&self) -> Option<&BinaryAssetHandle> {
        self.current.as_ref()
    }

    /// Whether a download is pending.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Abort any pending download and release the displayed handle.
    pub fn close(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Some(handle) = self.current.take() {
            handle.release();
        }
    }
}

impl Drop for AssetDialog {
    fn drop(&mut self) {
        self.close();
    }
}
