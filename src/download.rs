//! Icon downloader
//!
//! One-shot, cancellable task that resolves a single Item's icon. The
//! downloader moves through an explicit terminal state machine:
//!
//! ```text
//! Pending ──start──▶ Running ──fetch done──▶ Completed
//!    │                  │
//!    └──────cancel──────┴──────────────────▶ Cancelled
//! ```
//!
//! The completion handler fires at most once, on success or failure alike,
//! and never once `cancel_download` has returned: the cancelled check, the icon
//! write and the handler call all happen under the same lock the cancel takes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::api::IconFetcher;
use crate::error::{DecodeError, IconError};
use crate::models::{Icon, Item};

/// Callback fired when an attempt finishes (successfully or not).
///
/// Runs while the downloader's internal lock is held: it must not block and
/// must not call back into the downloader. Posting to a channel is the
/// intended use.
pub type CompletionHandler = Box<dyn FnOnce(DownloadId) + Send + 'static>;

static NEXT_DOWNLOAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadId(u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dl-{}", self.0)
    }
}

/// Lifecycle of a downloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Created, not started
    Pending,
    /// Fetch in flight
    Running,
    /// Attempt finished and the handler has fired
    Completed,
    /// Aborted; the handler will never fire
    Cancelled,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Completed | DownloadState::Cancelled)
    }
}

struct Shared {
    state: DownloadState,
    handler: Option<CompletionHandler>,
    task: Option<JoinHandle<()>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fetches and decodes one Item's icon
pub struct IconDownloader {
    id: DownloadId,
    item: Arc<Item>,
    fetcher: Arc<dyn IconFetcher>,
    shared: Arc<Mutex<Shared>>,
}

impl IconDownloader {
    pub fn new(
        item: Arc<Item>,
        fetcher: Arc<dyn IconFetcher>,
        completion_handler: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self::with_id_handler(item, fetcher, move |_| completion_handler())
    }

    /// Like [`IconDownloader::new`], but the handler learns which attempt finished
    pub fn with_id_handler(
        item: Arc<Item>,
        fetcher: Arc<dyn IconFetcher>,
        completion_handler: impl FnOnce(DownloadId) + Send + 'static,
    ) -> Self {
        Self {
            id: DownloadId(NEXT_DOWNLOAD_ID.fetch_add(1, Ordering::Relaxed)),
            item,
            fetcher,
            shared: Arc::new(Mutex::new(Shared {
                state: DownloadState::Pending,
                handler: Some(Box::new(completion_handler)),
                task: None,
            })),
        }
    }

    /// Downloader whose completion is delivered on a oneshot channel.
    ///
    /// The receiver errors (sender dropped) if the download is cancelled.
    pub fn with_completion_channel(
        item: Arc<Item>,
        fetcher: Arc<dyn IconFetcher>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let downloader = Self::new(item, fetcher, move || {
            let _ = tx.send(());
        });
        (downloader, rx)
    }

    pub fn id(&self) -> DownloadId {
        self.id
    }

    pub fn item(&self) -> &Arc<Item> {
        &self.item
    }

    pub fn state(&self) -> DownloadState {
        lock(&self.shared).state
    }

    /// Begin fetching `item.icon_url` on the runtime.
    ///
    /// No-op for an empty URL. Starting an already started downloader is
    /// ignored; build a new one to retry.
    pub fn start_download(&self) {
        if !self.item.has_icon_url() {
            debug!(download = %self.id, item = %self.item, "no icon url, not starting");
            return;
        }

        {
            let mut guard = lock(&self.shared);
            if guard.state != DownloadState::Pending {
                warn!(download = %self.id, state = ?guard.state, "download already started");
                return;
            }
            guard.state = DownloadState::Running;
        }

        let runtime = match current_runtime() {
            Ok(handle) => handle,
            Err(e) => {
                finish(&self.shared, &self.item, self.id, Err(e));
                return;
            }
        };

        debug!(download = %self.id, url = %self.item.icon_url, "starting icon download");

        let shared = self.shared.clone();
        let item = self.item.clone();
        let fetcher = self.fetcher.clone();
        let id = self.id;

        let task = runtime.spawn(async move {
            let outcome = fetch_icon(fetcher.as_ref(), &item.icon_url).await;
            finish(&shared, &item, id, outcome);
        });

        let mut guard = lock(&self.shared);
        if guard.state == DownloadState::Running {
            guard.task = Some(task);
        }
    }

    /// Abort the attempt.
    ///
    /// Once this returns the completion handler will not run and the icon will
    /// not be written by this downloader. Harmless after completion or a
    /// previous cancel.
    pub fn cancel_download(&self) {
        let mut guard = lock(&self.shared);
        match guard.state {
            DownloadState::Pending | DownloadState::Running => {
                guard.state = DownloadState::Cancelled;
                guard.handler = None;
                if let Some(task) = guard.task.take() {
                    task.abort();
                }
                debug!(download = %self.id, item = %self.item, "icon download cancelled");
            }
            DownloadState::Completed | DownloadState::Cancelled => {
                trace!(download = %self.id, state = ?guard.state, "cancel ignored");
            }
        }
    }
}

impl Drop for IconDownloader {
    fn drop(&mut self) {
        self.cancel_download();
    }
}

impl fmt::Debug for IconDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IconDownloader")
            .field("id", &self.id)
            .field("item", &self.item.identifier)
            .field("state", &self.state())
            .finish()
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle, IconError> {
    tokio::runtime::Handle::try_current().map_err(|e| IconError::NoRuntime(e.to_string()))
}

/// Fetch on the runtime, decode on the blocking pool
async fn fetch_icon(fetcher: &dyn IconFetcher, url: &str) -> Result<Icon, IconError> {
    let bytes = fetcher.fetch(url).await?;
    let icon = tokio::task::spawn_blocking(move || Icon::decode(&bytes))
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))??;
    Ok(icon)
}

/// Terminal transition for a finished attempt
fn finish(shared: &Mutex<Shared>, item: &Item, id: DownloadId, outcome: Result<Icon, IconError>) {
    let mut guard = lock(shared);
    if guard.state != DownloadState::Running {
        trace!(download = %id, state = ?guard.state, "discarding late result");
        return;
    }

    match outcome {
        Ok(icon) => {
            info!(download = %id, item = %item, width = icon.width(), height = icon.height(), "icon resolved");
            item.set_icon(icon);
        }
        Err(e) => {
            warn!(download = %id, item = %item, url = %item.icon_url, "icon download failed: {}", e);
        }
    }

    guard.state = DownloadState::Completed;
    guard.task = None;
    if let Some(handler) = guard.handler.take() {
        handler(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn png_bytes() -> Bytes {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 255, 0, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    /// Serves fixed bytes, optionally waiting for a release signal first
    struct StubFetcher {
        body: Result<Bytes, u16>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn ok(body: Bytes) -> Arc<Self> {
            Arc::new(Self {
                body: Ok(body),
                gate: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn status(code: u16) -> Arc<Self> {
            Arc::new(Self {
                body: Err(code),
                gate: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn gated(body: Bytes, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                body: Ok(body),
                gate: Some(gate),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl IconFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.body {
                Ok(bytes) => Ok(bytes.clone()),
                Err(code) => Err(FetchError::Status(*code)),
            }
        }
    }

    fn counting_handler() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_success_writes_icon_then_signals() {
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let (dl, done) = IconDownloader::with_completion_channel(item.clone(), StubFetcher::ok(png_bytes()));

        dl.start_download();
        done.await.unwrap();

        assert_eq!(dl.state(), DownloadState::Completed);
        assert_eq!(item.icon().map(|i| i.width()), Some(2));
    }

    #[tokio::test]
    async fn test_failure_still_signals_without_icon() {
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let (dl, done) = IconDownloader::with_completion_channel(item.clone(), StubFetcher::status(500));

        dl.start_download();
        done.await.unwrap();

        assert_eq!(dl.state(), DownloadState::Completed);
        assert!(item.icon().is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_still_signals() {
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let fetcher = StubFetcher::ok(Bytes::from_static(b"definitely not a png"));
        let (dl, done) = IconDownloader::with_completion_channel(item.clone(), fetcher);

        dl.start_download();
        done.await.unwrap();

        assert!(item.icon().is_none());
    }

    #[tokio::test]
    async fn test_empty_url_is_noop() {
        let item = Arc::new(Item::app("pkg.b", "Beta", ""));
        let fetcher = StubFetcher::ok(png_bytes());
        let (count, handler) = counting_handler();
        let dl = IconDownloader::new(item, fetcher.clone(), handler);

        dl.start_download();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(dl.state(), DownloadState::Pending);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_response_suppresses_everything() {
        let gate = Arc::new(Notify::new());
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let (count, handler) = counting_handler();
        let dl = IconDownloader::new(item.clone(), StubFetcher::gated(png_bytes(), gate.clone()), handler);

        dl.start_download();
        tokio::task::yield_now().await;
        dl.cancel_download();
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(dl.state(), DownloadState::Cancelled);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(item.icon().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_racing_success_never_fires_after_return() {
        for _ in 0..200 {
            let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
            let (count, handler) = counting_handler();
            let dl = IconDownloader::new(item.clone(), StubFetcher::ok(png_bytes()), handler);

            dl.start_download();
            tokio::task::yield_now().await;
            dl.cancel_download();
            let fired_at_cancel = count.load(Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(5)).await;

            // Whatever happened before cancel returned is final
            assert_eq!(count.load(Ordering::SeqCst), fired_at_cancel);
            assert!(fired_at_cancel <= 1);
            if fired_at_cancel == 0 {
                assert_eq!(dl.state(), DownloadState::Cancelled);
                assert!(item.icon().is_none());
            } else {
                assert_eq!(dl.state(), DownloadState::Completed);
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let (dl, done) = IconDownloader::with_completion_channel(item.clone(), StubFetcher::ok(png_bytes()));

        dl.start_download();
        done.await.unwrap();

        dl.cancel_download();
        dl.cancel_download();
        assert_eq!(dl.state(), DownloadState::Completed);
        assert!(item.icon().is_some());

        let pending = IconDownloader::new(item, StubFetcher::ok(png_bytes()), || {});
        pending.cancel_download();
        pending.cancel_download();
        assert_eq!(pending.state(), DownloadState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_channel_reports_closed() {
        let gate = Arc::new(Notify::new());
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let (dl, done) =
            IconDownloader::with_completion_channel(item, StubFetcher::gated(png_bytes(), gate));

        dl.start_download();
        dl.cancel_download();
        assert!(done.await.is_err());
    }

    #[tokio::test]
    async fn test_second_start_is_ignored() {
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let fetcher = StubFetcher::ok(png_bytes());
        let (count, handler) = counting_handler();
        let dl = IconDownloader::new(item, fetcher.clone(), handler);

        dl.start_download();
        dl.start_download();
        tokio::time::sleep(Duration::from_millis(50)).await;
        dl.start_download();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_without_runtime_finishes_as_failure() {
        let item = Arc::new(Item::app("pkg.a", "Alpha", "http://x/a.png"));
        let (count, handler) = counting_handler();
        let dl = IconDownloader::new(item.clone(), StubFetcher::ok(png_bytes()), handler);

        dl.start_download();

        assert_eq!(dl.state(), DownloadState::Completed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(item.icon().is_none());
    }

    #[test]
    fn test_missing_runtime_reported_as_scheduling_failure() {
        assert!(matches!(current_runtime(), Err(IconError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_runtime_found_inside_tokio() {
        assert!(current_runtime().is_ok());
    }
}
