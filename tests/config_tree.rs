//! Configuration tree fetch retry and rendering.

mod common;

use common::open_camera;
use rust_tether::config_tree::snapshot;
use tether_core::{DriverStatus, TetherError, WidgetKind};
use tether_driver_mock::{ops, FaultPlan, FaultScenario, MockCamera, MockWidget};

fn busy_config_fetch(times: u32) -> FaultPlan {
    FaultPlan::scenario(FaultScenario::FailTimes {
        operation: ops::GET_CONFIG,
        status: DriverStatus::CAMERA_BUSY,
        times,
    })
}

#[test]
fn busy_twice_then_success_takes_three_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder().faults(busy_config_fetch(2)).build();
    let camera = open_camera(&mock, dir.path());

    let tree = camera.build_config_tree().unwrap();
    assert_eq!(mock.calls(ops::GET_CONFIG), 3);
    assert_eq!(tree, snapshot(&mock.config_tree()));
}

fn revision(label: &str, isos: &[&str]) -> MockWidget {
    let mut root = MockWidget::new("main", label, WidgetKind::Window);
    root.children.push(MockWidget::menu("iso", "ISO", isos, isos[0]));
    root
}

#[test]
fn tree_reflects_the_successful_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder().faults(busy_config_fetch(2)).build();
    let camera = open_camera(&mock, dir.path());

    // the device changes its tree between the busy attempts
    mock.stage_config_trees([
        revision("Attempt 1", &["100"]),
        revision("Attempt 2", &["100", "200"]),
        revision("Attempt 3", &["100", "200", "400"]),
    ]);

    let tree = camera.build_config_tree().unwrap();
    assert_eq!(mock.calls(ops::GET_CONFIG), 3);
    assert_eq!(tree, snapshot(&revision("Attempt 3", &["100", "200", "400"])));
    assert_eq!(
        tree.children[0].choices(),
        ["100".to_string(), "200".to_string(), "400".to_string()]
    );
}

#[test]
fn always_busy_fails_after_five_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder()
        .faults(FaultPlan::scenario(FaultScenario::FailAlways {
            operation: ops::GET_CONFIG,
            status: DriverStatus::CAMERA_BUSY,
        }))
        .build();
    let camera = open_camera(&mock, dir.path());

    match camera.build_config_tree() {
        Err(TetherError::Busy { status, attempts }) => {
            assert_eq!(status, DriverStatus::CAMERA_BUSY);
            assert_eq!(attempts, 5);
        }
        other => panic!("expected busy exhaustion, got {:?}", other),
    }
    assert_eq!(mock.calls(ops::GET_CONFIG), 5);
}

#[test]
fn other_errors_abort_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder()
        .faults(FaultPlan::scenario(FaultScenario::FailAlways {
            operation: ops::GET_CONFIG,
            status: DriverStatus::IO_USB_FIND,
        }))
        .build();
    let camera = open_camera(&mock, dir.path());

    let err = camera.build_config_tree().unwrap_err();
    assert!(matches!(err, TetherError::Driver(DriverStatus::IO_USB_FIND)));
    assert_eq!(mock.calls(ops::GET_CONFIG), 1);
}

#[test]
fn json_shape_matches_nested_record() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::new();
    let camera = open_camera(&mock, dir.path());

    let json: serde_json::Value = serde_json::from_str(&camera.config_json().unwrap()).unwrap();
    assert_eq!(json["type"], "WINDOW");
    let settings = json["children"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "settings")
        .unwrap();
    let size = settings["children"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "liveviewsize")
        .unwrap();
    assert_eq!(size["type"], "RADIO");
    assert_eq!(size["choices"], serde_json::json!(["VGA", "SVGA", "XGA"]));
    assert!(settings.get("choices").is_none());
}

#[test]
fn capabilities_follow_connected_model() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockCamera::builder().model("Nameless Cam").build();
    let camera = open_camera(&mock, dir.path());

    let report = camera.list_capabilities().unwrap();
    let text = report.render_text();
    assert!(text.starts_with("model: Nameless Cam\n"));
    assert!(text.contains("capture_image: yes"));
    assert!(text.contains("capture_video: no"));
    assert_eq!(mock.calls(ops::MODEL), 1);
}
