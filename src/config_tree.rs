//! Configuration tree reader and single-widget writer.

use crate::session::SessionRegistry;
use std::sync::Arc;
use tether_core::{
    CapabilityReport, ConfigNode, ConfigWidget, RetryPolicy, TetherError, TetherResult,
    WidgetValue,
};
use tracing::{debug, info, warn};

/// Snapshot a live widget tree.
///
/// Choices are read only for radio and menu widgets.
pub fn snapshot(widget: &dyn ConfigWidget) -> ConfigNode {
    let kind = widget.kind();
    ConfigNode {
        name: widget.name().to_string(),
        label: widget.label().to_string(),
        kind,
        choices: kind.has_choices().then(|| widget.choices()),
        children: (0..widget.child_count())
            .filter_map(|i| widget.child(i))
            .map(snapshot)
            .collect(),
    }
}

fn is_transient(e: &TetherError) -> bool {
    e.status().is_some_and(|s| s.is_transient())
}

/// Reads and edits the device configuration through the access guard.
#[derive(Clone)]
pub struct ConfigTreeBuilder {
    registry: Arc<SessionRegistry>,
    fetch_retry: RetryPolicy,
}

impl ConfigTreeBuilder {
    /// `fetch_retry` bounds the busy retry of the root fetch.
    pub fn new(registry: Arc<SessionRegistry>, fetch_retry: RetryPolicy) -> Self {
        Self {
            registry,
            fetch_retry,
        }
    }

    /// Fetch and snapshot the configuration tree.
    ///
    /// The root fetch is retried only while the driver reports the camera
    /// busy; each attempt takes the guard on its own so other users can run
    /// in between. Any other failure aborts at once.
    pub fn build_tree(&self) -> TetherResult<ConfigNode> {
        let result = self.fetch_retry.run(is_transient, |attempt| {
            self.registry.with_session(|session| {
                let root = session.handle().get_config().map_err(|status| {
                    debug!(attempt, %status, "Config fetch failed");
                    TetherError::Driver(status)
                })?;
                Ok(snapshot(&*root))
            })
        });

        match result {
            Ok(tree) => {
                debug!(nodes = tree.node_count(), "Built config tree");
                Ok(tree)
            }
            Err(exhausted) => match exhausted.error.status() {
                Some(status) if status.is_transient() => {
                    warn!(attempts = exhausted.attempts, %status, "Config fetch gave up");
                    Err(TetherError::from_status(status, exhausted.attempts))
                }
                _ => Err(exhausted.error),
            },
        }
    }

    /// [`ConfigTreeBuilder::build_tree`] rendered as indented text.
    pub fn config_text(&self) -> TetherResult<String> {
        Ok(self.build_tree()?.render_text())
    }

    /// [`ConfigTreeBuilder::build_tree`] rendered as pretty JSON.
    pub fn config_json(&self) -> TetherResult<String> {
        let tree = self.build_tree()?;
        tree.to_json_pretty()
            .map_err(|e| TetherError::Io(std::io::Error::other(e)))
    }

    /// Read config, change one widget, write config back, as one guarded
    /// sequence. Returns the value written.
    pub fn set_value(&self, name: &str, raw: &str) -> TetherResult<WidgetValue> {
        let value = self.registry.with_session(|session| {
            let handle = session.handle();
            let mut root = handle.get_config()?;
            let widget = root
                .find_mut(name)
                .ok_or_else(|| TetherError::WidgetNotFound(name.to_string()))?;
            let value = WidgetValue::parse(widget.kind(), raw)?;
            widget.set_value(value.clone())?;
            handle.set_config(&*root)?;
            Ok(value)
        })?;
        info!(widget = name, ?value, "Config value written");
        Ok(value)
    }

    /// Look the connected model up in the driver's capability catalog.
    pub fn capabilities(&self) -> TetherResult<CapabilityReport> {
        let model = self
            .registry
            .with_session(|session| Ok(session.handle().model()?))?;
        let abilities = self.registry.backend().abilities(&model)?;
        Ok(abilities.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;
    use tether_core::{DriverStatus, TransportDescriptor, WidgetKind};
    use tether_driver_mock::{ops, FaultPlan, FaultScenario, MockCamera, MockWidget, DEFAULT_MODEL};

    fn builder(camera: &MockCamera) -> ConfigTreeBuilder {
        let registry = Arc::new(SessionRegistry::new(camera.backend(), RetryPolicy::once()));
        registry.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        ConfigTreeBuilder::new(registry, RetryPolicy::new(5, Duration::from_millis(1)))
    }

    #[test]
    fn snapshot_keeps_choices_only_for_choice_widgets() {
        let mut text = MockWidget::text("ownername", "Owner", "x");
        text.choices = vec!["ignored".into()];
        let root = MockWidget::section(
            "main",
            "Main",
            vec![MockWidget::radio("size", "Size", &["A", "B"], "A"), text],
        );
        let node = snapshot(&root);
        assert_eq!(node.kind, WidgetKind::Section);
        assert_eq!(node.choices, None);
        assert_eq!(node.children[0].choices(), ["A".to_string(), "B".to_string()]);
        assert_eq!(node.children[1].choices, None);
    }

    #[test]
    fn non_transient_fetch_error_is_not_retried() {
        let camera = MockCamera::builder()
            .faults(FaultPlan::scenario(FaultScenario::FailAlways {
                operation: ops::GET_CONFIG,
                status: DriverStatus::IO,
            }))
            .build();
        let err = builder(&camera).build_tree().unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::IO));
        assert_eq!(camera.calls(ops::GET_CONFIG), 1);
    }

    #[test]
    fn set_value_round_trips_through_device() {
        let camera = MockCamera::new();
        let tree = builder(&camera);
        let value = tree.set_value("liveviewsize", "SVGA").unwrap();
        assert_eq!(value, WidgetValue::Text("SVGA".into()));
        assert_eq!(camera.config_value("liveviewsize"), Some(value));

        tree.set_value("controlmode", "on").unwrap();
        assert_eq!(camera.config_value("controlmode"), Some(WidgetValue::Toggle(true)));
    }

    #[test]
    fn set_value_rejects_unknown_widget_and_bad_choice() {
        let camera = MockCamera::new();
        let tree = builder(&camera);
        assert!(matches!(
            tree.set_value("nosuch", "1"),
            Err(TetherError::WidgetNotFound(ref n)) if n == "nosuch"
        ));
        let err = tree.set_value("liveviewsize", "HUGE").unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::BAD_PARAMETERS));
        assert_eq!(camera.calls(ops::SET_CONFIG), 0);
    }

    #[test]
    fn capabilities_come_from_catalog() {
        let camera = MockCamera::new();
        let report = builder(&camera).capabilities().unwrap();
        assert_eq!(report.model, DEFAULT_MODEL);
        assert!(report.capture_image);
        assert!(report.capture_preview);
    }

    #[test]
    fn text_and_json_render_tree() {
        let camera = MockCamera::new();
        let tree = builder(&camera);
        let text = tree.config_text().unwrap();
        assert!(text.starts_with("main ("));
        assert!(text.contains("liveviewsize"));
        let json: serde_json::Value = serde_json::from_str(&tree.config_json().unwrap()).unwrap();
        assert_eq!(json["name"], "main");
        assert_eq!(json["type"], "WINDOW");
    }
}
