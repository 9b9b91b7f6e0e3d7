//! In-memory configuration widget tree.

use tether_core::{ConfigWidget, DriverResult, DriverStatus, WidgetKind, WidgetValue};

/// Owned widget node used by the simulated camera.
#[derive(Debug, Clone, PartialEq)]
pub struct MockWidget {
    /// Widget name
    pub name: String,
    /// Display label
    pub label: String,
    /// Widget type
    pub kind: WidgetKind,
    /// Choices for radio and menu widgets
    pub choices: Vec<String>,
    /// Current value
    pub value: Option<WidgetValue>,
    /// Child widgets
    pub children: Vec<MockWidget>,
}

impl MockWidget {
    /// Empty widget of any kind.
    pub fn new(name: &str, label: &str, kind: WidgetKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            choices: Vec::new(),
            value: None,
            children: Vec::new(),
        }
    }

    /// Section holding `children`.
    pub fn section(name: &str, label: &str, children: Vec<MockWidget>) -> Self {
        Self {
            children,
            ..Self::new(name, label, WidgetKind::Section)
        }
    }

    /// Toggle widget.
    pub fn toggle(name: &str, label: &str, on: bool) -> Self {
        Self {
            value: Some(WidgetValue::Toggle(on)),
            ..Self::new(name, label, WidgetKind::Toggle)
        }
    }

    /// Text widget.
    pub fn text(name: &str, label: &str, value: &str) -> Self {
        Self {
            value: Some(WidgetValue::Text(value.to_string())),
            ..Self::new(name, label, WidgetKind::Text)
        }
    }

    /// Range widget.
    pub fn range(name: &str, label: &str, value: f32) -> Self {
        Self {
            value: Some(WidgetValue::Range(value)),
            ..Self::new(name, label, WidgetKind::Range)
        }
    }

    /// Radio widget with `current` selected.
    pub fn radio(name: &str, label: &str, choices: &[&str], current: &str) -> Self {
        Self::with_choices(WidgetKind::Radio, name, label, choices, current)
    }

    /// Menu widget with `current` selected.
    pub fn menu(name: &str, label: &str, choices: &[&str], current: &str) -> Self {
        Self::with_choices(WidgetKind::Menu, name, label, choices, current)
    }

    fn with_choices(
        kind: WidgetKind,
        name: &str,
        label: &str,
        choices: &[&str],
        current: &str,
    ) -> Self {
        Self {
            choices: choices.iter().map(|c| c.to_string()).collect(),
            value: Some(WidgetValue::Text(current.to_string())),
            ..Self::new(name, label, kind)
        }
    }

    /// Depth-first lookup by name.
    pub fn find(&self, name: &str) -> Option<&MockWidget> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// Copy any widget tree into an owned mock tree.
    pub fn snapshot(widget: &dyn ConfigWidget) -> Self {
        let children = (0..widget.child_count())
            .filter_map(|i| widget.child(i))
            .map(MockWidget::snapshot)
            .collect();
        Self {
            name: widget.name().to_string(),
            label: widget.label().to_string(),
            kind: widget.kind(),
            choices: widget.choices(),
            value: widget.value(),
            children,
        }
    }

    /// A DSLR-like tree with the widgets live view needs.
    pub fn default_tree() -> Self {
        let mut root = Self::new("main", "Camera and Driver Configuration", WidgetKind::Window);
        root.children = vec![
            Self::section(
                "actions",
                "Camera Actions",
                vec![
                    Self::toggle("autofocusdrive", "Drive Canon DSLR Autofocus", false),
                    Self::toggle("controlmode", "Remote Control Mode", false),
                    Self::new("syncdatetime", "Set camera date and time", WidgetKind::Button),
                ],
            ),
            Self::section(
                "settings",
                "Camera Settings",
                vec![
                    Self::text("ownername", "Owner Name", ""),
                    Self::radio("liveviewsize", "Live View Size", &["VGA", "SVGA", "XGA"], "VGA"),
                    Self::radio("capturetarget", "Capture Target", &["Internal RAM", "Memory card"], "Internal RAM"),
                ],
            ),
            Self::section(
                "imgsettings",
                "Image Settings",
                vec![
                    Self::radio("iso", "ISO Speed", &["Auto", "100", "200", "400", "800", "1600", "3200"], "Auto"),
                    Self::radio("whitebalance", "WhiteBalance", &["Auto", "Daylight", "Shadow", "Cloudy", "Tungsten", "Fluorescent", "Flash"], "Auto"),
                    Self::radio("imageformat", "Image Format", &["Large Fine JPEG", "Medium Fine JPEG", "Small Fine JPEG", "RAW", "RAW + Large Fine JPEG"], "Large Fine JPEG"),
                ],
            ),
            Self::section(
                "capturesettings",
                "Capture Settings",
                vec![
                    Self::range("exposurecompensation", "Exposure Compensation", 0.0),
                    Self::menu("shutterspeed", "Shutter Speed", &["bulb", "30", "1", "1/30", "1/60", "1/125", "1/250", "1/500", "1/1000"], "1/125"),
                    Self::menu("aperture", "Aperture", &["2.8", "4", "5.6", "8", "11", "16"], "5.6"),
                    Self::radio("focusmode", "Focus Mode", &["One Shot", "AI Focus", "AI Servo", "Manual"], "One Shot"),
                ],
            ),
            Self::section(
                "status",
                "Camera Status Information",
                vec![
                    Self::text("batterylevel", "Battery Level", "100%"),
                    Self::text("serialnumber", "Serial Number", "0000000001"),
                ],
            ),
        ];
        root
    }
}

impl ConfigWidget for MockWidget {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> WidgetKind {
        self.kind
    }

    fn choices(&self) -> Vec<String> {
        if self.kind.has_choices() {
            self.choices.clone()
        } else {
            Vec::new()
        }
    }

    fn child_count(&self) -> usize {
        self.children.len()
    }

    fn child(&self, index: usize) -> Option<&dyn ConfigWidget> {
        self.children.get(index).map(|c| c as &dyn ConfigWidget)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut dyn ConfigWidget> {
        if self.name == name {
            return Some(self);
        }
        for child in self.children.iter_mut() {
            if let Some(found) = child.find_mut(name) {
                return Some(found);
            }
        }
        None
    }

    fn value(&self) -> Option<WidgetValue> {
        self.value.clone()
    }

    fn set_value(&mut self, value: WidgetValue) -> DriverResult<()> {
        let accepted = match (&self.kind, &value) {
            (WidgetKind::Toggle, WidgetValue::Toggle(_)) => true,
            (WidgetKind::Range, WidgetValue::Range(_)) => true,
            (WidgetKind::Text, WidgetValue::Text(_)) => true,
            (WidgetKind::Radio | WidgetKind::Menu, WidgetValue::Text(choice)) => {
                self.choices.iter().any(|c| c == choice)
            }
            _ => false,
        };
        if !accepted {
            return Err(DriverStatus::BAD_PARAMETERS);
        }
        self.value = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tree_has_live_view_widgets() {
        let tree = MockWidget::default_tree();
        assert_eq!(tree.find("controlmode").map(|w| w.kind), Some(WidgetKind::Toggle));
        let size = tree.find("liveviewsize").map(|w| w.choices.clone());
        assert_eq!(size, Some(vec!["VGA".into(), "SVGA".into(), "XGA".into()]));
    }

    #[test]
    fn set_value_validates_choices() {
        let mut tree = MockWidget::default_tree();
        let iso = tree.find_mut("iso").map(|w| w.set_value(WidgetValue::Text("400".into())));
        assert_eq!(iso, Some(Ok(())));
        let bad = tree.find_mut("iso").map(|w| w.set_value(WidgetValue::Text("12".into())));
        assert_eq!(bad, Some(Err(DriverStatus::BAD_PARAMETERS)));
        let wrong_kind = tree
            .find_mut("controlmode")
            .map(|w| w.set_value(WidgetValue::Text("on".into())));
        assert_eq!(wrong_kind, Some(Err(DriverStatus::BAD_PARAMETERS)));
    }

    #[test]
    fn snapshot_copies_through_trait() {
        let tree = MockWidget::default_tree();
        let copy = MockWidget::snapshot(&tree);
        assert_eq!(copy, tree);
    }

    #[test]
    fn choices_only_for_radio_and_menu() {
        let mut w = MockWidget::text("ownername", "Owner", "x");
        w.choices = vec!["ignored".into()];
        assert!(ConfigWidget::choices(&w).is_empty());
    }
}
