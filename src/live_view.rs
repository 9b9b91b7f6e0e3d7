//! Live preview streamer.
//!
//! One loop thread fetches a preview frame per iteration under the access
//! guard. If a capture was requested since the last frame, the capture and
//! download run inside the same guarded section, right after the frame, so a
//! preview-triggered shot never waits behind another device user. Listener
//! callbacks run after the guard is released.
//!
//! The capture request is a single coalescing flag: any number of
//! [`LiveViewStreamer::request_capture`] calls before the loop services it
//! result in exactly one capture.

use crate::capture::trigger_and_download;
use crate::config::TetherConfig;
use crate::notify::LiveViewListener;
use crate::session::SessionRegistry;
use crate::storage::MediaStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tether_core::{CameraFilePath, CameraHandle, TetherError, TetherResult, WidgetValue};
use tracing::{debug, error, info, trace, warn};

/// Name of the preview loop thread.
pub const LIVE_VIEW_THREAD: &str = "tether-live-view";

/// Cadence and camera widgets used by the streamer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveViewSettings {
    /// Sleep between frames
    pub frame_interval: Duration,
    /// Sleep after a failed preview fetch
    pub backoff: Duration,
    /// Toggle switched on while streaming
    pub control_mode_widget: String,
    /// Preview size widget
    pub size_widget: String,
    /// Preview size set on start
    pub size: String,
}

impl LiveViewSettings {
    /// Settings from the `[timing]` and `[live_view]` sections.
    pub fn from_config(config: &TetherConfig) -> Self {
        Self {
            frame_interval: config.timing.frame_interval,
            backoff: config.timing.transient_backoff,
            control_mode_widget: config.live_view.control_mode_widget.clone(),
            size_widget: config.live_view.size_widget.clone(),
            size: config.live_view.size.clone(),
        }
    }
}

impl Default for LiveViewSettings {
    fn default() -> Self {
        Self::from_config(&TetherConfig::default())
    }
}

/// Flags owned by one run of the loop. Each `start` makes a fresh set, so a
/// loop that is still winding down never sees or clears a later run's flags.
#[derive(Default)]
struct RunFlags {
    running: AtomicBool,
    capture_requested: AtomicBool,
}

struct Worker {
    handle: JoinHandle<()>,
    listener: Arc<dyn LiveViewListener>,
    flags: Arc<RunFlags>,
}

impl Worker {
    fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    fn on_current_thread(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }
}

/// Background preview loop with a coalescing capture request.
pub struct LiveViewStreamer {
    registry: Arc<SessionRegistry>,
    store: MediaStore,
    settings: LiveViewSettings,
    worker: Mutex<Option<Worker>>,
}

impl LiveViewStreamer {
    /// Create an idle streamer. Nothing runs until [`LiveViewStreamer::start`].
    pub fn new(registry: Arc<SessionRegistry>, store: MediaStore, settings: LiveViewSettings) -> Self {
        Self {
            registry,
            store,
            settings,
            worker: Mutex::new(None),
        }
    }

    /// Whether the current run has not been asked to stop and has not ended.
    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(Worker::is_running)
    }

    /// Start streaming frames to `listener`.
    ///
    /// A no-op while already running (the first listener stays in place).
    /// Fails with `StillStopping` while a stopped loop has not exited yet,
    /// which happens after `stop` is called from a listener callback, and
    /// with `NotInitialized` when no session is open.
    pub fn start(&self, listener: Arc<dyn LiveViewListener>) -> TetherResult<()> {
        let mut slot = self.worker.lock();
        if let Some(current) = slot.as_ref() {
            if current.is_running() {
                debug!("Live view already running");
                return Ok(());
            }
            if !current.handle.is_finished() {
                return Err(TetherError::StillStopping("live view"));
            }
        }
        if !self.registry.is_open() {
            warn!("Live view requested without an open session");
            return Err(TetherError::NotInitialized);
        }
        // a loop that has exited (session closed, or stopped from its own
        // callback) is reaped here
        if let Some(old) = slot.take() {
            join_worker(old);
        }

        self.prepare_camera();
        let flags = Arc::new(RunFlags::default());
        flags.running.store(true, Ordering::SeqCst);

        let stream = StreamLoop {
            registry: Arc::clone(&self.registry),
            store: self.store.clone(),
            frame_interval: self.settings.frame_interval,
            backoff: self.settings.backoff,
            flags: Arc::clone(&flags),
            listener: Arc::clone(&listener),
        };
        let spawned = thread::Builder::new()
            .name(LIVE_VIEW_THREAD.into())
            .spawn(move || stream.run());

        match spawned {
            Ok(handle) => {
                *slot = Some(Worker {
                    handle,
                    listener,
                    flags,
                });
                info!("Live view started");
                Ok(())
            }
            Err(source) => Err(TetherError::Spawn {
                name: LIVE_VIEW_THREAD,
                source,
            }),
        }
    }

    /// Stop streaming and join the loop thread.
    ///
    /// Blocks for at most one loop iteration. The listener is released only
    /// after the thread has exited.
    ///
    /// Called from a listener callback, this only signals: the loop exits
    /// after the callback returns and the next `start` reaps it.
    pub fn stop(&self) {
        let worker = {
            let mut slot = self.worker.lock();
            let Some(current) = slot.as_ref() else {
                return;
            };
            current.flags.running.store(false, Ordering::SeqCst);
            if current.on_current_thread() {
                debug!("Live view stop requested from its own thread; not joining");
                return;
            }
            slot.take()
        };
        let Some(worker) = worker else {
            return;
        };
        join_worker(worker);
        self.restore_camera();
        info!("Live view stopped");
    }

    /// Ask the loop to capture a still after its next frame.
    ///
    /// Repeated requests before the loop services one collapse into a single
    /// capture. Ignored when the streamer is not running.
    pub fn request_capture(&self) {
        match self.worker.lock().as_ref() {
            Some(worker) if worker.is_running() => {
                worker.flags.capture_requested.store(true, Ordering::SeqCst);
            }
            _ => trace!("Capture request ignored; live view not running"),
        }
    }

    fn prepare_camera(&self) {
        let values = [
            (
                self.settings.control_mode_widget.as_str(),
                WidgetValue::Toggle(true),
            ),
            (
                self.settings.size_widget.as_str(),
                WidgetValue::Text(self.settings.size.clone()),
            ),
        ];
        let result = self
            .registry
            .with_session(|session| apply_best_effort(session.handle(), &values));
        if let Err(e) = result {
            warn!(error = %e, "Live view preparation failed");
        }
    }

    fn restore_camera(&self) {
        let values = [(
            self.settings.control_mode_widget.as_str(),
            WidgetValue::Toggle(false),
        )];
        if !self.registry.is_open() {
            return;
        }
        let result = self
            .registry
            .with_session(|session| apply_best_effort(session.handle(), &values));
        if let Err(e) = result {
            warn!(error = %e, "Live view teardown failed");
        }
    }
}

impl Drop for LiveViewStreamer {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut() {
            worker.flags.running.store(false, Ordering::SeqCst);
        }
    }
}

fn join_worker(worker: Worker) {
    if let Err(e) = worker.handle.join() {
        error!("Live view thread panicked: {:?}", e);
    }
    drop(worker.listener);
}

/// Read config, set whichever of `values` exist, write back once.
fn apply_best_effort(
    handle: &mut dyn CameraHandle,
    values: &[(&str, WidgetValue)],
) -> TetherResult<()> {
    let mut root = handle.get_config()?;
    let mut changed = false;
    for (name, value) in values {
        match root.find_mut(name) {
            Some(widget) => match widget.set_value(value.clone()) {
                Ok(()) => changed = true,
                Err(status) => warn!(widget = name, %status, "Cannot set widget"),
            },
            None => debug!(widget = name, "Widget not present on this camera"),
        }
    }
    if changed {
        handle.set_config(&*root)?;
    }
    Ok(())
}

enum Step {
    Failed(tether_core::DriverStatus),
    Frame(Option<TetherResult<(CameraFilePath, Vec<u8>)>>),
}

struct StreamLoop {
    registry: Arc<SessionRegistry>,
    store: MediaStore,
    frame_interval: Duration,
    backoff: Duration,
    flags: Arc<RunFlags>,
    listener: Arc<dyn LiveViewListener>,
}

impl StreamLoop {
    fn run(self) {
        debug!("Live view loop running");
        let mut frame = Vec::new();

        while self.flags.running.load(Ordering::SeqCst) {
            let step = {
                let mut access = match self.registry.lock() {
                    Ok(access) => access,
                    Err(e) => {
                        error!(error = %e, "Live view cannot acquire access guard");
                        break;
                    }
                };
                let Ok(session) = access.session() else {
                    debug!("Session closed; live view exiting");
                    break;
                };
                let handle = session.handle();
                match handle.capture_preview(&mut frame) {
                    Err(status) => Step::Failed(status),
                    Ok(()) => {
                        let capture = self
                            .flags
                            .capture_requested
                            .swap(false, Ordering::SeqCst)
                            .then(|| trigger_and_download(handle));
                        Step::Frame(capture)
                    }
                }
            };

            match step {
                Step::Failed(status) => {
                    debug!(%status, "Preview fetch failed; backing off");
                    thread::sleep(self.backoff);
                    continue;
                }
                Step::Frame(capture) => {
                    self.listener.on_frame(&frame);
                    if let Some(result) = capture {
                        self.finish_capture(result);
                    }
                }
            }

            frame = Vec::new();
            thread::sleep(self.frame_interval);
        }

        self.flags.running.store(false, Ordering::SeqCst);
        debug!("Live view loop exited");
    }

    fn finish_capture(&self, result: TetherResult<(CameraFilePath, Vec<u8>)>) {
        let saved = result.and_then(|(remote, data)| {
            let path = self.store.capture_path();
            self.store.save(&path, &data)?;
            info!(remote = %remote, local = %path.display(), "Live capture saved");
            Ok(path)
        });
        match saved {
            Ok(path) => self.listener.on_live_capture(&path),
            Err(e) => {
                warn!(error = %e, class = %e.class(), "Live capture failed");
                self.listener.on_capture_failed(e.code());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelBridge, Notification};
    use std::path::Path;
    use tether_core::{RetryPolicy, TransportDescriptor};
    use tether_driver_mock::{ops, MockCamera};

    fn fast() -> LiveViewSettings {
        LiveViewSettings {
            frame_interval: Duration::from_millis(5),
            backoff: Duration::from_millis(5),
            ..LiveViewSettings::default()
        }
    }

    fn streamer(camera: &MockCamera, root: &Path, open: bool) -> LiveViewStreamer {
        let registry = Arc::new(SessionRegistry::new(camera.backend(), RetryPolicy::once()));
        if open {
            registry.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        }
        LiveViewStreamer::new(registry, MediaStore::new(root), fast())
    }

    #[test]
    fn start_without_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new();
        let streamer = streamer(&camera, dir.path(), false);
        let (bridge, _rx) = ChannelBridge::new();
        assert!(matches!(streamer.start(bridge), Err(TetherError::NotInitialized)));
        assert!(!streamer.is_running());
    }

    #[test]
    fn request_before_start_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new();
        let streamer = streamer(&camera, dir.path(), true);
        streamer.request_capture();

        let (bridge, _rx) = ChannelBridge::new();
        streamer.start(bridge).unwrap();
        let pending = streamer
            .worker
            .lock()
            .as_ref()
            .map(|w| w.flags.capture_requested.load(Ordering::SeqCst));
        streamer.stop();
        assert_eq!(pending, Some(false));
        assert_eq!(camera.calls(ops::CAPTURE_IMAGE), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_and_stop_toggle_control_mode() {
        let dir = tempfile::tempdir().unwrap();
        let camera = MockCamera::new();
        let streamer = streamer(&camera, dir.path(), true);
        let (bridge, mut rx) = ChannelBridge::new();

        streamer.start(bridge).unwrap();
        assert_eq!(camera.config_value("controlmode"), Some(WidgetValue::Toggle(true)));
        assert_eq!(
            camera.config_value("liveviewsize"),
            Some(WidgetValue::Text("XGA".into()))
        );

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(frame, Notification::Frame(ref b) if b.starts_with(&[0xFF, 0xD8])));

        streamer.stop();
        assert!(!streamer.is_running());
        assert_eq!(camera.config_value("controlmode"), Some(WidgetValue::Toggle(false)));
        assert_eq!(camera.overlapping_calls(), 0);
        assert!(camera.calls(ops::CAPTURE_PREVIEW) >= 1);
    }
}
