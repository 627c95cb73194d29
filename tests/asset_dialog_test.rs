//! Integration tests for the frame / module-map dialog and its asset handles.

use daq_dashboard::assets::{AssetDialog, AssetFetcher, AssetStore, DownloadProgress};
use daq_dashboard::endpoints::{BinaryBody, Endpoints, FrameRequest, MockReply, MockTransport};
use daq_dashboard::DashboardError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const FRAME_0: &str = "/file/1684930336/0";
const FRAME_1: &str = "/file/1684930336/1";

/// Dialog bound to `mock`, plus a view on the store it registers handles in.
fn dialog(mock: &Arc<MockTransport>) -> (AssetDialog, AssetStore) {
    let store = AssetStore::new();
    let fetcher = AssetFetcher::new(Endpoints::new(mock.clone()), store.clone());
    (AssetDialog::new(fetcher), store)
}

fn png(len: usize) -> MockReply {
    MockReply::binary(vec![7u8; len], "image/png")
}

#[tokio::test]
async fn test_second_asset_releases_first_exactly_once() {
    let mock = Arc::new(MockTransport::new());
    mock.set(FRAME_0, png(64));
    mock.set(FRAME_1, png(32));
    let (mut dialog, store) = dialog(&mock);

    dialog.open(FrameRequest::frame("1684930336", 0));
    let first_url = dialog.wait_ready().await.unwrap().url().to_string();
    assert!(first_url.starts_with("blob:"));
    assert!(store.resolve(&first_url).is_some());

    dialog.open(FrameRequest::frame("1684930336", 1));
    let second = dialog.wait_ready().await.unwrap();
    assert_eq!(second.len(), 32);
    let second_url = second.url().to_string();

    assert_eq!(store.created_count(), 2);
    assert_eq!(store.release_count(), 1);
    assert_eq!(store.live_count(), 1);
    assert!(store.resolve(&first_url).is_none());
    assert!(store.resolve(&second_url).is_some());

    dialog.close();
    assert_eq!(store.release_count(), 2);
    assert_eq!(store.live_count(), 0);
    assert!(dialog.current().is_none());
}

#[tokio::test]
async fn test_close_during_download_creates_no_handle() {
    let mock = Arc::new(MockTransport::new());
    mock.set(FRAME_0, png(64));
    mock.hold(FRAME_0);
    let (mut dialog, store) = dialog(&mock);

    dialog.open(FrameRequest::frame("1684930336", 0));
    for _ in 0..10 {
        if mock.in_flight(FRAME_0) == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(dialog.is_loading());

    dialog.close();
    mock.release(FRAME_0, 1);
    sleep(Duration::from_millis(20)).await;

    assert!(!dialog.is_loading());
    assert!(dialog.current().is_none());
    assert_eq!(store.created_count(), 0);
    assert_eq!(store.live_count(), 0);
    assert!(matches!(
        dialog.wait_ready().await,
        Err(DashboardError::AssetCancelled)
    ));
}

#[tokio::test]
async fn test_superseded_download_is_discarded() {
    let mock = Arc::new(MockTransport::new());
    mock.set(FRAME_0, png(64));
    mock.hold(FRAME_0);
    mock.set(FRAME_1, png(16));
    let (mut dialog, store) = dialog(&mock);

    dialog.open(FrameRequest::frame("1684930336", 0));
    tokio::task::yield_now().await;
    dialog.open(FrameRequest::frame("1684930336", 1));
    mock.release(FRAME_0, 1);

    let shown = dialog.wait_ready().await.unwrap();
    assert_eq!(shown.len(), 16);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(store.created_count(), 1);
    assert_eq!(store.live_count(), 1);
    assert_eq!(store.release_count(), 0);
}

#[tokio::test]
async fn test_failed_download_keeps_previous_asset() {
    let mock = Arc::new(MockTransport::new());
    mock.set(FRAME_0, png(64));
    mock.set(FRAME_1, MockReply::backend_error("Frame 1 out of range."));
    let (mut dialog, store) = dialog(&mock);

    dialog.open(FrameRequest::frame("1684930336", 0));
    let url = dialog.wait_ready().await.unwrap().url().to_string();

    dialog.open(FrameRequest::frame("1684930336", 1));
    let err = dialog.wait_ready().await.unwrap_err();
    assert_eq!(err.to_string(), "Frame 1 out of range.");

    assert_eq!(dialog.current().map(|h| h.url().to_string()), Some(url));
    assert_eq!(store.release_count(), 0);
    assert_eq!(store.live_count(), 1);
}

#[tokio::test]
async fn test_progress_reaches_full_percent() {
    let mock = Arc::new(MockTransport::new());
    mock.set("/file/1684930336/3?module_map=1", png(1_000));
    let (mut dialog, _store) = dialog(&mock);

    let progress = dialog.open(FrameRequest::module_map("1684930336", 3));
    let handle = dialog.wait_ready().await.unwrap();
    assert_eq!(handle.content_type().as_deref(), Some("image/png"));
    assert_eq!(*progress.borrow(), DownloadProgress::Percent(100.0));
}

#[tokio::test]
async fn test_unknown_length_reports_loaded_bytes() {
    let mock = Arc::new(MockTransport::new());
    mock.set(
        FRAME_0,
        MockReply::Binary {
            body: BinaryBody {
                bytes: vec![0u8; 300].into(),
                content_type: None,
            },
            known_length: false,
        },
    );
    let (mut dialog, _store) = dialog(&mock);

    let progress = dialog.open(FrameRequest::frame("1684930336", 0));
    let handle = dialog.wait_ready().await.unwrap();
    assert!(handle.content_type().is_none());

    let last = *progress.borrow();
    assert_eq!(last, DownloadProgress::Indeterminate { loaded: 300 });
    assert_eq!(last.percent(), None);
}

#[tokio::test]
async fn test_dropping_dialog_releases_handle() {
    let mock = Arc::new(MockTransport::new());
    mock.set(FRAME_0, png(8));
    let (mut dialog, store) = dialog(&mock);

    dialog.open(FrameRequest::frame("1684930336", 0));
    dialog.wait_ready().await.unwrap();
    assert_eq!(store.live_count(), 1);

    drop(dialog);
    assert_eq!(store.live_count(), 0);
    assert_eq!(store.release_count(), 1);
}

#[tokio::test]
async fn test_save_writes_bytes_and_reports_io_failure() {
    let mock = Arc::new(MockTransport::new());
    mock.set(FRAME_0, png(48));
    let (mut dialog, _store) = dialog(&mock);

    dialog.open(FrameRequest::frame("1684930336", 0));
    let handle = dialog.wait_ready().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    handle.save_to(&path).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 48]);

    let err = handle
        .save_to(dir.path().join("missing").join("frame.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Io(_)));
    assert!(!err.is_recoverable());
}
