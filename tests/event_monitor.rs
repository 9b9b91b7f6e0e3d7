//! Event monitor downloads, naming and shutdown.

mod common;

use common::{fast_config, open_camera, recv};
use rust_tether::storage::MediaStore;
use rust_tether::{ChannelBridge, MonitorState, Notification, TetherCamera};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tether_core::{CameraEvent, DriverStatus};
use tether_driver_mock::{ops, FaultPlan, FaultScenario, MockCamera};

#[tokio::test(flavor = "multi_thread")]
async fn body_shots_download_under_unique_names() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::new();
    let camera = open_camera(&mock, dir.path());
    let (bridge, mut rx) = ChannelBridge::new();

    camera.start_event_monitor(bridge).unwrap();
    mock.shoot_on_body("IMG_0001.JPG");
    mock.shoot_on_body("IMG_0002.JPG");

    let mut paths = HashSet::new();
    for _ in 0..2 {
        match recv(&mut rx).await {
            Notification::FileCaptured(path) => {
                assert!(path.exists());
                let name = path.file_name().unwrap().to_string_lossy().to_string();
                assert!(name.starts_with("photo_") && name.ends_with(".jpg"));
                assert_eq!(name.matches('_').count(), 2);
                paths.insert(path);
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }
    assert_eq!(paths.len(), 2);
    tokio::task::block_in_place(|| camera.shutdown());
}

#[test]
fn event_names_are_unique_across_threads() {
    let store = Arc::new(MediaStore::new("/tmp/unused"));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || (0..250).map(|_| store.event_path()).collect::<Vec<PathBuf>>())
        })
        .collect();
    let mut all = HashSet::new();
    for worker in workers {
        all.extend(worker.join().unwrap());
    }
    assert_eq!(all.len(), 1000);
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_download_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder()
        .faults(FaultPlan::scenario(FaultScenario::FailTimes {
            operation: ops::FILE_GET,
            status: DriverStatus::CAMERA_BUSY,
            times: 2,
        }))
        .build();
    let camera = open_camera(&mock, dir.path());
    let (bridge, mut rx) = ChannelBridge::new();

    camera.start_event_monitor(bridge).unwrap();
    mock.shoot_on_body("IMG_0001.JPG");

    assert!(matches!(recv(&mut rx).await, Notification::FileCaptured(_)));
    assert_eq!(mock.calls(ops::FILE_GET), 3);
    tokio::task::block_in_place(|| camera.shutdown());
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_download_reports_last_code() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder()
        .faults(FaultPlan::scenario(FaultScenario::FailAlways {
            operation: ops::FILE_GET,
            status: DriverStatus::CAMERA_BUSY,
        }))
        .build();
    let camera = open_camera(&mock, dir.path());
    let (bridge, mut rx) = ChannelBridge::new();

    camera.start_event_monitor(bridge).unwrap();
    mock.shoot_on_body("IMG_0001.JPG");

    assert_eq!(
        recv(&mut rx).await,
        Notification::CaptureFailed(DriverStatus::CAMERA_BUSY)
    );
    assert_eq!(mock.calls(ops::FILE_GET), 5);
    assert!(camera.event_monitor_state() == MonitorState::Running);
    tokio::task::block_in_place(|| camera.shutdown());
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_errors_and_informational_events_keep_loop_alive() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder()
        .faults(FaultPlan::scenario(FaultScenario::FailTimes {
            operation: ops::WAIT_FOR_EVENT,
            status: DriverStatus::IO,
            times: 3,
        }))
        .build();
    let camera = open_camera(&mock, dir.path());
    let (bridge, mut rx) = ChannelBridge::new();

    camera.start_event_monitor(bridge).unwrap();
    mock.push_event(CameraEvent::CaptureComplete);
    mock.push_event(CameraEvent::Unknown("PTP Property 5001 changed".into()));
    mock.shoot_on_body("IMG_0001.JPG");

    assert!(matches!(recv(&mut rx).await, Notification::FileCaptured(_)));
    assert!(mock.calls(ops::WAIT_FOR_EVENT) >= 6);
    tokio::task::block_in_place(|| camera.shutdown());
    assert!(rx.try_recv().is_err());
}

#[test]
fn stop_returns_immediately_and_loop_exits_within_one_wait() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::new();
    let mut config = fast_config(dir.path());
    config.timing.event_wait = Duration::from_millis(400);
    config.timing.event_poll = Duration::from_millis(20);
    let camera = TetherCamera::new(mock.backend(), &config);
    camera.open().unwrap();
    let (bridge, _rx) = ChannelBridge::new();

    camera.start_event_monitor(bridge).unwrap();
    // let the loop block inside wait_for_event
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    camera.stop_event_monitor();
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_ne!(camera.event_monitor_state(), MonitorState::Running);

    assert!(camera.await_event_monitor_stopped(Duration::from_secs(5)));
    assert!(started.elapsed() < Duration::from_millis(400 + 20 + 500));
    assert_eq!(camera.event_monitor_state(), MonitorState::Idle);
    camera.close();
}

#[test]
fn restart_while_stopping_is_rejected_then_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::new();
    let mut config = fast_config(dir.path());
    config.timing.event_wait = Duration::from_millis(300);
    let camera = TetherCamera::new(mock.backend(), &config);
    camera.open().unwrap();
    let (bridge, _rx) = ChannelBridge::new();

    camera.start_event_monitor(bridge.clone()).unwrap();
    thread::sleep(Duration::from_millis(30));
    camera.stop_event_monitor();
    assert!(camera.start_event_monitor(bridge.clone()).is_err());

    assert!(camera.await_event_monitor_stopped(Duration::from_secs(5)));
    camera.start_event_monitor(bridge).unwrap();
    assert_eq!(camera.event_monitor_state(), MonitorState::Running);
    camera.shutdown();
}
