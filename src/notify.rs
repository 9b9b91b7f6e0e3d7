//! Notification bridge.
//!
//! Background loops report through caller-supplied listeners. Listeners are
//! always invoked after the access guard has been released, so a slow or
//! re-entrant listener never blocks other device users.
//!
//! [`ChannelBridge`] implements both listener traits by forwarding owned
//! [`Notification`]s over an unbounded tokio channel, which is how async
//! callers (and the CLI) consume them.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether_core::DriverStatus;
use tokio::sync::mpsc;

/// Receives outcomes of event-driven and asynchronous captures.
pub trait CaptureListener: Send + Sync {
    /// A file was downloaded and saved to `path`.
    fn on_file_captured(&self, path: &Path);
    /// A capture or download failed.
    fn on_capture_failed(&self, status: DriverStatus);
}

/// Receives live preview output.
pub trait LiveViewListener: Send + Sync {
    /// `frame` is only valid for the duration of the call.
    fn on_frame(&self, frame: &[u8]);

    /// A capture requested while streaming was saved to `path`.
    fn on_live_capture(&self, path: &Path);

    /// A capture requested while streaming failed.
    fn on_capture_failed(&self, _status: DriverStatus) {}
}

/// Owned form of every listener callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// [`CaptureListener::on_file_captured`]
    FileCaptured(PathBuf),
    /// `on_capture_failed` of either listener
    CaptureFailed(DriverStatus),
    /// [`LiveViewListener::on_frame`], copied
    Frame(Bytes),
    /// [`LiveViewListener::on_live_capture`]
    LiveCapture(PathBuf),
}

/// Listener that forwards every callback into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelBridge {
    /// A bridge and the receiver it forwards to.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}

impl CaptureListener for ChannelBridge {
    fn on_file_captured(&self, path: &Path) {
        self.send(Notification::FileCaptured(path.to_path_buf()));
    }

    fn on_capture_failed(&self, status: DriverStatus) {
        self.send(Notification::CaptureFailed(status));
    }
}

impl LiveViewListener for ChannelBridge {
    fn on_frame(&self, frame: &[u8]) {
        self.send(Notification::Frame(Bytes::copy_from_slice(frame)));
    }

    fn on_live_capture(&self, path: &Path) {
        self.send(Notification::LiveCapture(path.to_path_buf()));
    }

    fn on_capture_failed(&self, status: DriverStatus) {
        self.send(Notification::CaptureFailed(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bridge_forwards_owned_copies() {
        let (bridge, mut rx) = ChannelBridge::new();
        let frame = vec![1u8, 2, 3];
        LiveViewListener::on_frame(bridge.as_ref(), &frame);
        drop(frame);
        CaptureListener::on_capture_failed(bridge.as_ref(), DriverStatus::CAMERA_BUSY);
        bridge.on_live_capture(Path::new("/tmp/photo_1.jpg"));

        assert_eq!(rx.recv().await, Some(Notification::Frame(Bytes::from_static(&[1, 2, 3]))));
        assert_eq!(rx.recv().await, Some(Notification::CaptureFailed(DriverStatus::CAMERA_BUSY)));
        assert_eq!(
            rx.recv().await,
            Some(Notification::LiveCapture(PathBuf::from("/tmp/photo_1.jpg")))
        );
    }

    #[test]
    fn send_after_receiver_drop_is_ignored() {
        let (bridge, rx) = ChannelBridge::new();
        drop(rx);
        bridge.on_file_captured(Path::new("/tmp/x.jpg"));
    }
}
