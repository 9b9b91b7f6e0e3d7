//! Configuration widget tree types.
//!
//! The driver exposes the device's settings as a tree of widgets
//! ([`ConfigWidget`]). The session layer never hands that live tree to
//! callers; it walks it once and returns an immutable [`ConfigNode`]
//! snapshot instead.

use crate::error::{DriverResult, DriverStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Widget type as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WidgetKind {
    /// Top-level window
    Window,
    /// Group of widgets
    Section,
    /// Free text
    Text,
    /// Numeric slider
    Range,
    /// On/off switch
    Toggle,
    /// Single choice, shown as radio buttons
    Radio,
    /// Single choice, shown as a drop-down
    Menu,
    /// Action without a value
    Button,
    /// Any type this crate does not know
    #[serde(other)]
    Unknown,
}

impl WidgetKind {
    /// Only radio and menu widgets carry a list of choices.
    pub fn has_choices(self) -> bool {
        matches!(self, WidgetKind::Radio | WidgetKind::Menu)
    }

    /// Driver spelling of the kind, as used in JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            WidgetKind::Window => "WINDOW",
            WidgetKind::Section => "SECTION",
            WidgetKind::Text => "TEXT",
            WidgetKind::Range => "RANGE",
            WidgetKind::Toggle => "TOGGLE",
            WidgetKind::Radio => "RADIO",
            WidgetKind::Menu => "MENU",
            WidgetKind::Button => "BUTTON",
            WidgetKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value written to (or read from) a single widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WidgetValue {
    /// Toggle state
    Toggle(bool),
    /// Slider position
    Range(f32),
    /// Text or selected choice
    Text(String),
}

impl WidgetValue {
    /// Parse a command-line string into the value shape a widget kind expects.
    pub fn parse(kind: WidgetKind, raw: &str) -> DriverResult<Self> {
        match kind {
            WidgetKind::Toggle => match raw.to_ascii_lowercase().as_str() {
                "1" | "on" | "true" | "yes" => Ok(WidgetValue::Toggle(true)),
                "0" | "off" | "false" | "no" => Ok(WidgetValue::Toggle(false)),
                _ => Err(DriverStatus::BAD_PARAMETERS),
            },
            WidgetKind::Range => raw
                .parse::<f32>()
                .map(WidgetValue::Range)
                .map_err(|_| DriverStatus::BAD_PARAMETERS),
            WidgetKind::Text | WidgetKind::Radio | WidgetKind::Menu => {
                Ok(WidgetValue::Text(raw.to_string()))
            }
            WidgetKind::Window | WidgetKind::Section | WidgetKind::Button | WidgetKind::Unknown => {
                Err(DriverStatus::BAD_PARAMETERS)
            }
        }
    }
}

/// Live widget tree owned by the driver.
///
/// Returned by [`crate::driver::CameraHandle::get_config`]. Reading it does not
/// touch the device; only `set_config` on the handle pushes changes back.
pub trait ConfigWidget: Send {
    /// Widget name, unique within the tree.
    fn name(&self) -> &str;
    /// Display label.
    fn label(&self) -> &str;
    /// Widget type.
    fn kind(&self) -> WidgetKind;
    /// Ordered choices; empty for widgets that are not radio/menu.
    fn choices(&self) -> Vec<String>;
    /// Number of direct children.
    fn child_count(&self) -> usize;
    /// Direct child at `index`.
    fn child(&self, index: usize) -> Option<&dyn ConfigWidget>;
    /// Depth-first lookup of a descendant (or self) by name.
    fn find_mut(&mut self, name: &str) -> Option<&mut dyn ConfigWidget>;
    /// Current value; `None` for windows, sections and buttons.
    fn value(&self) -> Option<WidgetValue>;
    /// Change the value locally. Pushed to the device by `set_config`.
    fn set_value(&mut self, value: WidgetValue) -> DriverResult<()>;
}

/// Immutable snapshot of one node of the device configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigNode {
    /// Widget name
    pub name: String,
    /// Display label
    pub label: String,
    /// Widget type, serialized as `type`
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    /// Choices; present only for radio and menu widgets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    /// Child nodes in driver order
    #[serde(default)]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    /// Choices of a radio/menu node, empty otherwise.
    pub fn choices(&self) -> &[String] {
        self.choices.as_deref().unwrap_or(&[])
    }

    /// Depth-first search by widget name.
    pub fn find(&self, name: &str) -> Option<&ConfigNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Total number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ConfigNode::node_count).sum::<usize>()
    }

    /// Indented, human-readable dump of the tree.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        let name = if self.name.is_empty() { "?" } else { &self.name };
        let label = if self.label.is_empty() { "?" } else { &self.label };
        let _ = write!(out, "{}{} ({}) - {}", "  ".repeat(depth), name, label, self.kind);
        if let Some(choices) = &self.choices {
            out.push_str(" [choices:");
            for choice in choices {
                out.push(' ');
                out.push_str(choice);
            }
            out.push(']');
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(depth + 1, out);
        }
    }

    /// Compact JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Indented JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
