//! Opaque camera driver seam.
//!
//! The physical device is controlled through a blocking, bus-serialized
//! driver library. This module describes that library as two traits:
//!
//! - [`DriverBackend`]: library-wide state (plugin search paths, transport
//!   binding, autodetection, capability catalog, handle creation).
//! - [`CameraHandle`]: one camera connection. Every method blocks for the
//!   duration of the driver call and returns a [`DriverStatus`] on failure.
//!
//! Neither trait is safe to call concurrently on the same device; the session
//! layer serializes every call through its access guard.

use crate::capabilities::CameraAbilities;
use crate::error::DriverResult;
use crate::widget::ConfigWidget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// How the driver reaches the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransportDescriptor {
    /// Let the driver pick the first detected camera.
    Auto,
    /// An already-opened USB file descriptor handed over by the host platform.
    UsbFd(i32),
    /// A driver port string such as `usb:001,004`.
    Port(String),
}

impl Default for TransportDescriptor {
    fn default() -> Self {
        TransportDescriptor::Auto
    }
}

impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportDescriptor::Auto => f.write_str("auto"),
            TransportDescriptor::UsbFd(fd) => write!(f, "usb-fd:{}", fd),
            TransportDescriptor::Port(port) => f.write_str(port),
        }
    }
}

impl FromStr for TransportDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            return Ok(TransportDescriptor::Auto);
        }
        if let Some(fd) = s.strip_prefix("usb-fd:") {
            return fd
                .parse::<i32>()
                .map(TransportDescriptor::UsbFd)
                .map_err(|_| format!("Invalid USB file descriptor '{}'", fd));
        }
        Ok(TransportDescriptor::Port(s.to_string()))
    }
}

impl TryFrom<String> for TransportDescriptor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransportDescriptor> for String {
    fn from(value: TransportDescriptor) -> Self {
        value.to_string()
    }
}

/// Location of a file on the camera's storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraFilePath {
    /// Folder on the card, e.g. `/store_00020001/DCIM/100CANON`
    pub folder: String,
    /// File name within `folder`
    pub name: String,
}

impl CameraFilePath {
    /// Path from a folder and a file name.
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CameraFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder.trim_end_matches('/'), self.name)
    }
}

/// Event returned by [`CameraHandle::wait_for_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// The wait timed out with nothing to report.
    Timeout,
    /// A new file appeared on the camera (e.g. shutter pressed on the body).
    FileAdded(CameraFilePath),
    /// A capture finished; informational only.
    CaptureComplete,
    /// Any other driver event, carried as its text.
    Unknown(String),
}

/// A camera found by autodetection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedCamera {
    /// Model name reported by the camera
    pub model: String,
    /// Driver port string, e.g. `usb:001,004`
    pub port: String,
}

impl fmt::Display for DetectedCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.model, self.port)
    }
}

/// A transport known to the driver library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Human-readable transport name
    pub name: String,
    /// Port string accepted by `bind_transport`
    pub path: String,
}

/// Library-wide driver entry points.
pub trait DriverBackend: Send + Sync + 'static {
    /// Point the driver at its camera/port plugin directories.
    fn configure_search_path(&self, path: &Path) -> DriverResult<()>;

    /// Bind the transport used by the next handle to initialise.
    fn bind_transport(&self, transport: &TransportDescriptor) -> DriverResult<()>;

    /// Create a new, uninitialised handle.
    fn new_handle(&self) -> DriverResult<Box<dyn CameraHandle>>;

    /// List cameras currently attached.
    fn autodetect(&self) -> DriverResult<Vec<DetectedCamera>>;

    /// List transports the driver knows about.
    fn port_info(&self) -> DriverResult<Vec<PortInfo>>;

    /// Driver library name and version.
    fn library_version(&self) -> String;

    /// Look a model up in the driver's capability catalog.
    fn abilities(&self, model: &str) -> DriverResult<CameraAbilities>;
}

/// One connection to a camera.
pub trait CameraHandle: Send {
    /// Connect to the device over the bound transport.
    fn init(&mut self) -> DriverResult<()>;

    /// Disconnect. The handle is dropped afterwards.
    fn exit(&mut self) -> DriverResult<()>;

    /// Model name of the connected camera.
    fn model(&mut self) -> DriverResult<String>;

    /// Free-form summary text from the camera.
    fn summary(&mut self) -> DriverResult<String>;

    /// Trigger a still capture; returns where the camera stored the image.
    fn capture_image(&mut self) -> DriverResult<CameraFilePath>;

    /// Download a file from the camera.
    fn file_get(&mut self, path: &CameraFilePath) -> DriverResult<Vec<u8>>;

    /// Fetch one preview frame into `buf`, replacing its contents.
    fn capture_preview(&mut self, buf: &mut Vec<u8>) -> DriverResult<()>;

    /// Block until the device reports an event or `timeout` elapses.
    fn wait_for_event(&mut self, timeout: Duration) -> DriverResult<CameraEvent>;

    /// Read the full configuration tree.
    fn get_config(&mut self) -> DriverResult<Box<dyn ConfigWidget>>;

    /// Write a (modified) configuration tree back to the device.
    fn set_config(&mut self, config: &dyn ConfigWidget) -> DriverResult<()>;
}
