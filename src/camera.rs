//! Control surface over one tethered camera.
//!
//! [`TetherCamera`] wires the session registry, capture orchestrator, event
//! monitor, live-view streamer and config tree builder to a single driver
//! backend. Construct one per process and pass it by reference.
//!
//! # Shutdown ordering
//!
//! [`TetherCamera::close`] does not stop background tasks. Stop the live view
//! and the event monitor first, or call [`TetherCamera::shutdown`] which does
//! all three in order.

use crate::capture::CaptureOrchestrator;
use crate::config::TetherConfig;
use crate::config_tree::ConfigTreeBuilder;
use crate::event_monitor::{EventMonitor, MonitorSettings, MonitorState};
use crate::live_view::{LiveViewSettings, LiveViewStreamer};
use crate::notify::{CaptureListener, LiveViewListener};
use crate::session::SessionRegistry;
use crate::storage::MediaStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tether_core::{
    CapabilityReport, ConfigNode, DetectedCamera, DriverBackend, PortInfo, TetherResult,
    TransportDescriptor, WidgetValue,
};
use tracing::{info, warn};

/// Control surface over one tethered camera.
pub struct TetherCamera {
    registry: Arc<SessionRegistry>,
    store: MediaStore,
    capture: CaptureOrchestrator,
    monitor: EventMonitor,
    live_view: LiveViewStreamer,
    tree: ConfigTreeBuilder,
    transport: TransportDescriptor,
    search_path: PathBuf,
    stop_timeout: Duration,
}

impl TetherCamera {
    /// Wire every component to `backend`. No session is opened.
    pub fn new(backend: Arc<dyn DriverBackend>, config: &TetherConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(backend, config.retry.init.policy()));
        let store = MediaStore::new(config.storage.root.clone());
        Self {
            capture: CaptureOrchestrator::new(Arc::clone(&registry), store.clone()),
            monitor: EventMonitor::new(
                Arc::clone(&registry),
                store.clone(),
                MonitorSettings::from_config(config),
            ),
            live_view: LiveViewStreamer::new(
                Arc::clone(&registry),
                store.clone(),
                LiveViewSettings::from_config(config),
            ),
            tree: ConfigTreeBuilder::new(Arc::clone(&registry), config.retry.config_fetch.policy()),
            transport: config.driver.transport.clone(),
            search_path: config.driver.search_path.clone(),
            // one full event wait plus the poll grace period
            stop_timeout: config.timing.event_wait + config.timing.event_poll,
            store,
            registry,
        }
    }

    /// The session registry, for direct guarded access.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Directory captures are written to.
    pub fn storage_root(&self) -> &Path {
        self.store.root()
    }

    // --- session ---

    /// Open a session with the configured transport and driver search path.
    pub fn open(&self) -> TetherResult<()> {
        self.registry.open(&self.transport, &self.search_path)
    }

    /// Open a session with an explicit transport and search path.
    pub fn open_with(&self, transport: &TransportDescriptor, search_path: &Path) -> TetherResult<()> {
        self.registry.open(transport, search_path)
    }

    /// Close the session. Background tasks are not stopped.
    pub fn close(&self) {
        self.registry.close();
    }

    /// Whether a session is open.
    pub fn is_open(&self) -> bool {
        self.registry.is_open()
    }

    // --- capture ---

    /// Capture, download and save one image; returns the local path.
    pub fn capture(&self) -> TetherResult<PathBuf> {
        self.capture.capture()
    }

    /// Run [`TetherCamera::capture`] on a background thread and report to `listener`.
    pub fn capture_async(&self, listener: Arc<dyn CaptureListener>) -> TetherResult<JoinHandle<()>> {
        self.capture.capture_async(listener)
    }

    // --- event monitor ---

    /// Start downloading files the camera reports.
    pub fn start_event_monitor(&self, listener: Arc<dyn CaptureListener>) -> TetherResult<()> {
        self.monitor.start(listener)
    }

    /// Signal the event monitor to stop. Returns immediately.
    pub fn stop_event_monitor(&self) {
        self.monitor.stop();
    }

    /// Wait up to `timeout` for a stopping monitor to exit.
    pub fn await_event_monitor_stopped(&self, timeout: Duration) -> bool {
        self.monitor.await_stopped(timeout)
    }

    /// Idle, running or stopping.
    pub fn event_monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    // --- live view ---

    /// Start streaming preview frames to `listener`.
    pub fn start_live_preview(&self, listener: Arc<dyn LiveViewListener>) -> TetherResult<()> {
        self.live_view.start(listener)
    }

    /// Stop the live view and join its thread.
    pub fn stop_live_preview(&self) {
        self.live_view.stop();
    }

    /// Whether the preview loop is streaming.
    pub fn is_live_preview_running(&self) -> bool {
        self.live_view.is_running()
    }

    /// Ask the live view to capture after its next frame.
    pub fn request_capture(&self) {
        self.live_view.request_capture();
    }

    // --- configuration ---

    /// Snapshot the configuration tree, retrying while busy.
    pub fn build_config_tree(&self) -> TetherResult<ConfigNode> {
        self.tree.build_tree()
    }

    /// Configuration tree as indented text.
    pub fn config_text(&self) -> TetherResult<String> {
        self.tree.config_text()
    }

    /// Configuration tree as JSON.
    pub fn config_json(&self) -> TetherResult<String> {
        self.tree.config_json()
    }

    /// Set one widget from its string form.
    pub fn set_config_value(&self, name: &str, value: &str) -> TetherResult<WidgetValue> {
        self.tree.set_value(name, value)
    }

    /// Capability flags of the connected model.
    pub fn list_capabilities(&self) -> TetherResult<CapabilityReport> {
        self.tree.capabilities()
    }

    // --- diagnostics ---

    /// Camera summary text.
    pub fn summary(&self) -> TetherResult<String> {
        self.registry
            .with_session(|session| Ok(session.handle().summary()?))
    }

    /// List attached cameras. Works without a session but still takes the
    /// access guard, since detection goes over the same bus.
    pub fn autodetect(&self) -> TetherResult<Vec<DetectedCamera>> {
        let _access = self.registry.lock()?;
        Ok(self.registry.backend().autodetect()?)
    }

    /// Whether autodetection finds any camera.
    pub fn is_connected(&self) -> bool {
        match self.autodetect() {
            Ok(cameras) => !cameras.is_empty(),
            Err(e) => {
                warn!(error = %e, "Autodetect failed");
                false
            }
        }
    }

    /// Transports known to the driver.
    pub fn port_info(&self) -> TetherResult<Vec<PortInfo>> {
        Ok(self.registry.backend().port_info()?)
    }

    /// Driver library version.
    pub fn library_version(&self) -> String {
        self.registry.backend().library_version()
    }

    /// Stop the live view, stop and await the event monitor, then close.
    ///
    /// If the monitor does not exit in time the session is still closed; the
    /// loop then exits on its next iteration when it finds no session.
    pub fn shutdown(&self) {
        self.live_view.stop();
        self.monitor.stop();
        if !self.monitor.await_stopped(self.stop_timeout) {
            warn!(timeout = ?self.stop_timeout, "Event monitor still running at shutdown");
        }
        self.registry.close();
        info!("Camera shut down");
    }
}

impl std::fmt::Debug for TetherCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TetherCamera")
            .field("open", &self.is_open())
            .field("transport", &self.transport)
            .field("storage_root", &self.store.root())
            .finish_non_exhaustive()
    }
}
