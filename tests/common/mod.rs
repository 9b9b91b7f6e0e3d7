//! Shared fixtures for integration tests.

#![allow(dead_code)]

use rust_tether::{TetherCamera, TetherConfig};
use std::path::Path;
use std::time::Duration;
use tether_driver_mock::MockCamera;
use tokio::sync::mpsc::UnboundedReceiver;

/// Defaults with every delay shrunk so tests run in milliseconds.
pub fn fast_config(root: &Path) -> TetherConfig {
    let mut config = TetherConfig::default();
    config.storage.root = root.to_path_buf();
    config.timing.event_wait = Duration::from_millis(50);
    config.timing.event_poll = Duration::from_millis(5);
    config.timing.frame_interval = Duration::from_millis(5);
    config.timing.transient_backoff = Duration::from_millis(5);
    config.retry.init.backoff = Duration::from_millis(1);
    config.retry.config_fetch.backoff = Duration::from_millis(1);
    config.retry.event_fetch.backoff = Duration::from_millis(1);
    config
}

pub fn camera_for(mock: &MockCamera, root: &Path) -> TetherCamera {
    TetherCamera::new(mock.backend(), &fast_config(root))
}

pub fn open_camera(mock: &MockCamera, root: &Path) -> TetherCamera {
    let camera = camera_for(mock, root);
    camera.open().unwrap();
    camera
}

/// Receive with a generous timeout so a broken loop fails instead of hanging.
pub async fn recv<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}
