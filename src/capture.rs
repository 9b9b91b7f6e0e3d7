//! On-demand still capture.

use crate::notify::CaptureListener;
use crate::session::SessionRegistry;
use crate::storage::MediaStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tether_core::{CameraFilePath, CameraHandle, TetherError, TetherResult};
use tracing::{info, warn};

/// Name of background capture threads.
pub const CAPTURE_THREAD: &str = "tether-capture";

/// Trigger the shutter and download the resulting file. No retry.
///
/// Must be called with the access guard held.
pub(crate) fn trigger_and_download(
    handle: &mut dyn CameraHandle,
) -> TetherResult<(CameraFilePath, Vec<u8>)> {
    let remote = handle.capture_image()?;
    let data = handle.file_get(&remote)?;
    Ok((remote, data))
}

/// Performs "take a picture, fetch the file, save it" as one guarded unit.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    registry: Arc<SessionRegistry>,
    store: MediaStore,
}

impl CaptureOrchestrator {
    /// Captures through `registry`, saving under `store`.
    pub fn new(registry: Arc<SessionRegistry>, store: MediaStore) -> Self {
        Self { registry, store }
    }

    /// Capture synchronously and return the local path.
    ///
    /// Fails with `NotInitialized` without touching the access guard when no
    /// session is open. Driver failures are returned as-is.
    pub fn capture(&self) -> TetherResult<PathBuf> {
        let result = self
            .registry
            .with_session(|session| trigger_and_download(session.handle()));

        let (remote, data) = match result {
            Ok(downloaded) => downloaded,
            Err(e) => {
                warn!(error = %e, class = %e.class(), "Capture failed");
                return Err(e);
            }
        };

        let path = self.store.capture_path();
        self.store.save(&path, &data)?;
        info!(remote = %remote, local = %path.display(), "Captured image");
        Ok(path)
    }

    /// Capture on a background thread and report through `listener`.
    ///
    /// The join handle is returned for callers that want to wait; dropping it
    /// detaches the capture. There is no cancellation.
    pub fn capture_async(&self, listener: Arc<dyn CaptureListener>) -> TetherResult<JoinHandle<()>> {
        let this = self.clone();
        thread::Builder::new()
            .name(CAPTURE_THREAD.into())
            .spawn(move || match this.capture() {
                Ok(path) => listener.on_file_captured(&path),
                Err(e) => listener.on_capture_failed(e.code()),
            })
            .map_err(|source| TetherError::Spawn {
                name: CAPTURE_THREAD,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelBridge, Notification};
    use std::path::Path;
    use std::time::Duration;
    use tether_core::{DriverStatus, RetryPolicy, TransportDescriptor};
    use tether_driver_mock::{ops, FaultPlan, FaultScenario, MockCamera};

    fn setup(camera: &MockCamera, root: &Path) -> CaptureOrchestrator {
        let registry = Arc::new(SessionRegistry::new(
            camera.backend(),
            RetryPolicy::new(1, Duration::ZERO),
        ));
        registry.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        CaptureOrchestrator::new(registry, MediaStore::new(root))
    }

    #[test]
    fn capture_saves_downloaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new();
        let orchestrator = setup(&camera, dir.path());
        let path = orchestrator.capture().unwrap();
        assert!(path.starts_with(dir.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("photo_") && name.ends_with(".jpg"));
        let saved = std::fs::read(&path).unwrap();
        assert_eq!(&saved[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn capture_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::builder()
            .faults(FaultPlan::scenario(FaultScenario::FailAlways {
                operation: ops::CAPTURE_IMAGE,
                status: DriverStatus::CAMERA_BUSY,
            }))
            .build();
        let orchestrator = setup(&camera, dir.path());
        let err = orchestrator.capture().unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::CAMERA_BUSY));
        assert_eq!(camera.calls(ops::CAPTURE_IMAGE), 1);
        assert_eq!(camera.calls(ops::FILE_GET), 0);
    }

    #[tokio::test]
    async fn capture_async_reports_through_listener() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new();
        let orchestrator = setup(&camera, dir.path());
        let (bridge, mut rx) = ChannelBridge::new();

        let handle = orchestrator.capture_async(bridge).unwrap();
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(notification, Notification::FileCaptured(ref p) if p.exists()));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn capture_async_failure_carries_status() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::builder()
            .faults(FaultPlan::scenario(FaultScenario::FailAlways {
                operation: ops::FILE_GET,
                status: DriverStatus::FILE_NOT_FOUND,
            }))
            .build();
        let orchestrator = setup(&camera, dir.path());
        let (bridge, mut rx) = ChannelBridge::new();

        orchestrator.capture_async(bridge).unwrap();
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(
            notification,
            Some(Notification::CaptureFailed(DriverStatus::FILE_NOT_FOUND))
        );
    }
}
