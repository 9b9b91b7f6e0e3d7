//! Simulated tethered camera.
//!
//! [`MockCamera`] is both the test controller and the [`DriverBackend`]. The
//! handles it creates share its state, so a test can push device events,
//! inject faults and inspect call counts while the session layer drives the
//! camera from its own threads.

use crate::common::{ops, FaultPlan, MockRng, TimingConfig};
use crate::widget::MockWidget;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tether_core::{
    CameraAbilities, CameraEvent, CameraFilePath, CameraHandle, CameraOperations, ConfigWidget,
    DetectedCamera, DriverBackend, DriverResult, DriverStatus, FileOperations, FolderOperations,
    PortInfo, TransportDescriptor, WidgetValue,
};

/// Model reported unless the builder overrides it.
pub const DEFAULT_MODEL: &str = "Mock Canon EOS 80D";
/// Port reported by autodetection.
pub const DEFAULT_PORT: &str = "usb:001,004";
/// Folder that captured images land in.
pub const CAPTURE_FOLDER: &str = "/store_00020001/DCIM/100CANON";

const PREVIEW_PAYLOAD: usize = 256;
const IMAGE_PAYLOAD: usize = 4096;

struct Shared {
    model: String,
    port: String,
    timing: TimingConfig,
    rng: MockRng,
    catalog: HashMap<String, CameraAbilities>,
    faults: Mutex<FaultPlan>,
    connected: AtomicBool,
    config: Mutex<MockWidget>,
    staged_configs: Mutex<VecDeque<MockWidget>>,
    events: Mutex<VecDeque<CameraEvent>>,
    event_ready: Condvar,
    files: Mutex<HashMap<CameraFilePath, Vec<u8>>>,
    next_image: AtomicU32,
    frames: AtomicU64,
    calls: Mutex<HashMap<&'static str, u32>>,
    in_call: AtomicBool,
    overlaps: AtomicU32,
    live_handles: AtomicU32,
    max_live_handles: AtomicU32,
    search_path: Mutex<Option<PathBuf>>,
    transport: Mutex<Option<TransportDescriptor>>,
}

/// Marks one driver call in flight; clears the marker on drop.
struct CallScope<'a> {
    shared: &'a Shared,
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        self.shared.in_call.store(false, Ordering::SeqCst);
    }
}

impl Shared {
    fn enter(&self, operation: &'static str) -> DriverResult<CallScope<'_>> {
        if self.in_call.swap(true, Ordering::SeqCst) {
            let n = self.overlaps.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::warn!(operation, overlaps = n, "Overlapping driver calls detected");
        }
        let scope = CallScope { shared: self };
        *self.calls.lock().entry(operation).or_insert(0) += 1;
        if !self.timing.call_latency.is_zero() {
            thread::sleep(self.timing.call_latency);
        }
        let faults = self.faults.lock().clone();
        faults.check(operation)?;
        Ok(scope)
    }

    /// Install the next staged tree, if any, as the device configuration.
    fn advance_config(&self) {
        if let Some(next) = self.staged_configs.lock().pop_front() {
            *self.config.lock() = next;
        }
    }

    fn jpeg(&self, tag: u64, payload: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(payload + 14);
        data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        data.extend_from_slice(&tag.to_le_bytes());
        let start = data.len();
        data.resize(start + payload, 0);
        self.rng.fill_bytes(&mut data[start..]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        data
    }
}

/// Builder for [`MockCamera`].
pub struct MockCameraBuilder {
    model: String,
    port: String,
    timing: TimingConfig,
    seed: Option<u64>,
    faults: FaultPlan,
    config: MockWidget,
    catalog: HashMap<String, CameraAbilities>,
    connected: bool,
}

impl MockCameraBuilder {
    /// Model name the camera reports.
    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Port the camera is attached to.
    pub fn port(mut self, port: &str) -> Self {
        self.port = port.to_string();
        self
    }

    /// Simulated call latencies.
    pub fn timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Seed for generated image data.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Initial fault plan.
    pub fn faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Initial configuration tree.
    pub fn config(mut self, config: MockWidget) -> Self {
        self.config = config;
        self
    }

    /// Add or replace a catalog entry.
    pub fn abilities(mut self, abilities: CameraAbilities) -> Self {
        self.catalog.insert(abilities.model.clone(), abilities);
        self
    }

    /// Whether the camera starts plugged in.
    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    /// Build the camera. The configured model is added to the catalog if missing.
    pub fn build(self) -> MockCamera {
        let mut catalog = self.catalog;
        catalog
            .entry(self.model.clone())
            .or_insert_with(|| full_abilities(&self.model));
        MockCamera {
            shared: Arc::new(Shared {
                model: self.model,
                port: self.port,
                timing: self.timing,
                rng: MockRng::new(self.seed),
                catalog,
                faults: Mutex::new(self.faults),
                connected: AtomicBool::new(self.connected),
                config: Mutex::new(self.config),
                staged_configs: Mutex::new(VecDeque::new()),
                events: Mutex::new(VecDeque::new()),
                event_ready: Condvar::new(),
                files: Mutex::new(HashMap::new()),
                next_image: AtomicU32::new(0),
                frames: AtomicU64::new(0),
                calls: Mutex::new(HashMap::new()),
                in_call: AtomicBool::new(false),
                overlaps: AtomicU32::new(0),
                live_handles: AtomicU32::new(0),
                max_live_handles: AtomicU32::new(0),
                search_path: Mutex::new(None),
                transport: Mutex::new(None),
            }),
        }
    }
}

fn full_abilities(model: &str) -> CameraAbilities {
    CameraAbilities {
        model: model.to_string(),
        operations: CameraOperations::CAPTURE_IMAGE
            | CameraOperations::CAPTURE_PREVIEW
            | CameraOperations::CONFIG
            | CameraOperations::TRIGGER_CAPTURE,
        file_operations: FileOperations::DELETE | FileOperations::PREVIEW | FileOperations::EXIF,
        folder_operations: FolderOperations::PUT_FILE | FolderOperations::MAKE_DIR,
    }
}

/// Simulated camera and its test controller.
#[derive(Clone)]
pub struct MockCamera {
    shared: Arc<Shared>,
}

impl MockCamera {
    /// Builder with the default model, tree and an empty fault plan.
    pub fn builder() -> MockCameraBuilder {
        MockCameraBuilder {
            model: DEFAULT_MODEL.to_string(),
            port: DEFAULT_PORT.to_string(),
            timing: TimingConfig::instant(),
            seed: None,
            faults: FaultPlan::none(),
            config: MockWidget::default_tree(),
            catalog: HashMap::new(),
            connected: true,
        }
    }

    /// Default camera.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// This camera as a shareable driver backend.
    pub fn backend(&self) -> Arc<dyn DriverBackend> {
        Arc::new(self.clone())
    }

    /// Configured model name.
    pub fn model(&self) -> &str {
        &self.shared.model
    }

    // ---- device-side stimuli ----

    /// Queue a device event, waking a blocked `wait_for_event`.
    pub fn push_event(&self, event: CameraEvent) {
        self.shared.events.lock().push_back(event);
        self.shared.event_ready.notify_all();
    }

    /// Store a file on the simulated card without announcing it.
    pub fn add_file(&self, path: CameraFilePath, data: Vec<u8>) {
        self.shared.files.lock().insert(path, data);
    }

    /// Store a file and announce it with a `FileAdded` event, as a shutter
    /// press on the camera body would.
    pub fn shoot_on_body(&self, name: &str) -> CameraFilePath {
        let path = CameraFilePath::new(CAPTURE_FOLDER, name);
        let tag = u64::from(self.shared.next_image.fetch_add(1, Ordering::SeqCst) + 1);
        self.add_file(path.clone(), self.shared.jpeg(tag, IMAGE_PAYLOAD));
        self.push_event(CameraEvent::FileAdded(path.clone()));
        path
    }

    /// Replace the fault plan for all later calls.
    pub fn set_faults(&self, faults: FaultPlan) {
        *self.shared.faults.lock() = faults;
    }

    /// Simulate unplugging (or replugging) the camera.
    pub fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
    }

    /// Replace the device configuration.
    pub fn set_config_tree(&self, tree: MockWidget) {
        *self.shared.config.lock() = tree;
    }

    /// Queue trees the device switches to, one per `get_config` call.
    ///
    /// The switch happens whether or not the call then fails, so the tree a
    /// call serves is the one staged for that call.
    pub fn stage_config_trees(&self, trees: impl IntoIterator<Item = MockWidget>) {
        self.shared.staged_configs.lock().extend(trees);
    }

    // ---- inspection ----

    /// Number of times `operation` reached the driver, failed or not.
    pub fn calls(&self, operation: &str) -> u32 {
        self.shared.calls.lock().get(operation).copied().unwrap_or(0)
    }

    /// Driver calls that started while another was still in flight.
    pub fn overlapping_calls(&self) -> u32 {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    /// Handles currently initialised and not yet exited.
    pub fn live_handles(&self) -> u32 {
        self.shared.live_handles.load(Ordering::SeqCst)
    }

    /// Highest number of live handles seen at once.
    pub fn max_live_handles(&self) -> u32 {
        self.shared.max_live_handles.load(Ordering::SeqCst)
    }

    /// Preview frames delivered.
    pub fn frames_served(&self) -> u64 {
        self.shared.frames.load(Ordering::SeqCst)
    }

    /// Copy of the current device configuration.
    pub fn config_tree(&self) -> MockWidget {
        self.shared.config.lock().clone()
    }

    /// Current value of a named widget.
    pub fn config_value(&self, name: &str) -> Option<WidgetValue> {
        self.shared
            .config
            .lock()
            .find(name)
            .and_then(|w| w.value.clone())
    }

    /// Contents of a file on the simulated card.
    pub fn file(&self, path: &CameraFilePath) -> Option<Vec<u8>> {
        self.shared.files.lock().get(path).cloned()
    }

    /// Last configured driver search path.
    pub fn search_path(&self) -> Option<PathBuf> {
        self.shared.search_path.lock().clone()
    }

    /// Last bound transport.
    pub fn bound_transport(&self) -> Option<TransportDescriptor> {
        self.shared.transport.lock().clone()
    }

    /// Events queued but not yet delivered.
    pub fn pending_events(&self) -> usize {
        self.shared.events.lock().len()
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCamera")
            .field("model", &self.shared.model)
            .field("port", &self.shared.port)
            .finish_non_exhaustive()
    }
}

impl DriverBackend for MockCamera {
    fn configure_search_path(&self, path: &Path) -> DriverResult<()> {
        tracing::debug!(path = %path.display(), "Driver search path configured");
        *self.shared.search_path.lock() = Some(path.to_path_buf());
        Ok(())
    }

    fn bind_transport(&self, transport: &TransportDescriptor) -> DriverResult<()> {
        match transport {
            TransportDescriptor::UsbFd(fd) if *fd < 0 => return Err(DriverStatus::BAD_PARAMETERS),
            TransportDescriptor::Port(port) if port != &self.shared.port => {
                return Err(DriverStatus::UNKNOWN_PORT)
            }
            _ => {}
        }
        *self.shared.transport.lock() = Some(transport.clone());
        Ok(())
    }

    fn new_handle(&self) -> DriverResult<Box<dyn CameraHandle>> {
        let _call = self.shared.enter(ops::NEW_HANDLE)?;
        Ok(Box::new(MockHandle {
            shared: Arc::clone(&self.shared),
            initialized: false,
        }))
    }

    fn autodetect(&self) -> DriverResult<Vec<DetectedCamera>> {
        let _call = self.shared.enter(ops::AUTODETECT)?;
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![DetectedCamera {
            model: self.shared.model.clone(),
            port: self.shared.port.clone(),
        }])
    }

    fn port_info(&self) -> DriverResult<Vec<PortInfo>> {
        Ok(vec![
            PortInfo {
                name: "Universal Serial Bus".into(),
                path: "usb:".into(),
            },
            PortInfo {
                name: "Universal Serial Bus".into(),
                path: self.shared.port.clone(),
            },
            PortInfo {
                name: "PTP/IP Connection".into(),
                path: "ptpip:".into(),
            },
        ])
    }

    fn library_version(&self) -> String {
        format!("tether-driver-mock {}", env!("CARGO_PKG_VERSION"))
    }

    fn abilities(&self, model: &str) -> DriverResult<CameraAbilities> {
        self.shared
            .catalog
            .get(model)
            .cloned()
            .ok_or(DriverStatus::MODEL_NOT_FOUND)
    }
}

/// One simulated connection.
struct MockHandle {
    shared: Arc<Shared>,
    initialized: bool,
}

impl MockHandle {
    fn ready(&self) -> DriverResult<()> {
        if !self.initialized {
            return Err(DriverStatus::BAD_PARAMETERS);
        }
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(DriverStatus::IO_USB_FIND);
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.initialized {
            self.initialized = false;
            self.shared.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl CameraHandle for MockHandle {
    fn init(&mut self) -> DriverResult<()> {
        let _call = self.shared.enter(ops::INIT)?;
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(DriverStatus::IO_USB_FIND);
        }
        if !self.initialized {
            self.initialized = true;
            let live = self.shared.live_handles.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared.max_live_handles.fetch_max(live, Ordering::SeqCst);
        }
        Ok(())
    }

    fn exit(&mut self) -> DriverResult<()> {
        let outcome = self.shared.enter(ops::EXIT).map(drop);
        self.release();
        outcome
    }

    fn model(&mut self) -> DriverResult<String> {
        let _call = self.shared.enter(ops::MODEL)?;
        self.ready()?;
        Ok(self.shared.model.clone())
    }

    fn summary(&mut self) -> DriverResult<String> {
        let _call = self.shared.enter(ops::SUMMARY)?;
        self.ready()?;
        Ok(format!(
            "Manufacturer: Mock Imaging\nModel: {}\n  Version: 1.0.0\n  Serial Number: 0000000001\n\
             Capture Formats: JPEG\nDisplay Formats: JPEG, Association/Directory\n\
             Device Capabilities:\n  File Download, File Deletion, File Upload\n  \
             Generic Image Capture, Open Capture, Canon EOS Capture\n",
            self.shared.model
        ))
    }

    fn capture_image(&mut self) -> DriverResult<CameraFilePath> {
        let _call = self.shared.enter(ops::CAPTURE_IMAGE)?;
        self.ready()?;
        if !self.shared.timing.capture_time.is_zero() {
            thread::sleep(self.shared.timing.capture_time);
        }
        let n = self.shared.next_image.fetch_add(1, Ordering::SeqCst) + 1;
        let path = CameraFilePath::new(CAPTURE_FOLDER, format!("IMG_{:04}.JPG", n));
        let data = self.shared.jpeg(u64::from(n), IMAGE_PAYLOAD);
        self.shared.files.lock().insert(path.clone(), data);
        Ok(path)
    }

    fn file_get(&mut self, path: &CameraFilePath) -> DriverResult<Vec<u8>> {
        let _call = self.shared.enter(ops::FILE_GET)?;
        self.ready()?;
        self.shared
            .files
            .lock()
            .get(path)
            .cloned()
            .ok_or(DriverStatus::FILE_NOT_FOUND)
    }

    fn capture_preview(&mut self, buf: &mut Vec<u8>) -> DriverResult<()> {
        let _call = self.shared.enter(ops::CAPTURE_PREVIEW)?;
        self.ready()?;
        if !self.shared.timing.preview_readout.is_zero() {
            thread::sleep(self.shared.timing.preview_readout);
        }
        let n = self.shared.frames.fetch_add(1, Ordering::SeqCst) + 1;
        buf.clear();
        buf.extend_from_slice(&self.shared.jpeg(n, PREVIEW_PAYLOAD));
        Ok(())
    }

    fn wait_for_event(&mut self, timeout: Duration) -> DriverResult<CameraEvent> {
        let _call = self.shared.enter(ops::WAIT_FOR_EVENT)?;
        self.ready()?;
        let deadline = Instant::now() + timeout;
        let mut queue = self.shared.events.lock();
        loop {
            if let Some(event) = queue.pop_front() {
                return Ok(event);
            }
            if self
                .shared
                .event_ready
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                return Ok(queue.pop_front().unwrap_or(CameraEvent::Timeout));
            }
        }
    }

    fn get_config(&mut self) -> DriverResult<Box<dyn ConfigWidget>> {
        let entered = self.shared.enter(ops::GET_CONFIG);
        self.shared.advance_config();
        let _call = entered?;
        self.ready()?;
        Ok(Box::new(self.shared.config.lock().clone()))
    }

    fn set_config(&mut self, config: &dyn ConfigWidget) -> DriverResult<()> {
        let _call = self.shared.enter(ops::SET_CONFIG)?;
        self.ready()?;
        *self.shared.config.lock() = MockWidget::snapshot(config);
        Ok(())
    }
}
