//! Background device-event monitor.
//!
//! Repeatedly blocks in `wait_for_event` (holding the access guard only for
//! that call). A file-added event is downloaded with its own bounded retry,
//! saved under a unique name and reported through the [`CaptureListener`].
//! Capture-complete and other informational events are swallowed. Failed
//! waits are treated as transient: the loop backs off and keeps going.
//!
//! State machine: `Idle -> Running -> Stopping -> Idle`. [`EventMonitor::stop`]
//! only signals; it never blocks the caller. [`EventMonitor::await_stopped`]
//! waits (bounded) for the loop thread and joins it.

use crate::config::TetherConfig;
use crate::notify::CaptureListener;
use crate::session::SessionRegistry;
use crate::storage::MediaStore;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tether_core::{CameraEvent, CameraFilePath, RetryPolicy, TetherError, TetherResult};
use tracing::{debug, error, info, trace, warn};

/// Name of the monitor loop thread.
pub const EVENT_MONITOR_THREAD: &str = "tether-event-monitor";

/// Lifecycle of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No loop thread alive
    Idle,
    /// Loop running
    Running,
    /// Stop requested; loop not exited yet
    Stopping,
}

/// Timing and retry knobs for the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Timeout of each wait-for-event call
    pub event_wait: Duration,
    /// Stop-signal wait after each iteration
    pub poll: Duration,
    /// Sleep after a failed wait
    pub backoff: Duration,
    /// Download retry after a file-added event
    pub fetch_retry: RetryPolicy,
}

impl MonitorSettings {
    /// Settings from the `[timing]` and `[retry]` sections.
    pub fn from_config(config: &TetherConfig) -> Self {
        Self {
            event_wait: config.timing.event_wait,
            poll: config.timing.event_poll,
            backoff: config.timing.transient_backoff,
            fetch_retry: config.retry.event_fetch.policy(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&TetherConfig::default())
    }
}

struct MonitorSignals {
    running: AtomicBool,
    stop_lock: Mutex<()>,
    stop_cv: Condvar,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl MonitorSignals {
    /// Sleep up to `timeout`, returning early once a stop is requested.
    fn wait_for_stop(&self, timeout: Duration) {
        let mut guard = self.stop_lock.lock();
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_cv.wait_for(&mut guard, timeout);
    }

    fn request_stop(&self) {
        let _guard = self.stop_lock.lock();
        self.running.store(false, Ordering::SeqCst);
        self.stop_cv.notify_all();
    }
}

/// Marks the loop finished even if it unwinds.
struct FinishOnDrop(Arc<MonitorSignals>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
        *self.0.finished.lock() = true;
        self.0.finished_cv.notify_all();
    }
}

/// Background loop downloading files the camera reports.
pub struct EventMonitor {
    registry: Arc<SessionRegistry>,
    store: MediaStore,
    settings: MonitorSettings,
    signals: Arc<MonitorSignals>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventMonitor {
    /// Create an idle monitor.
    pub fn new(registry: Arc<SessionRegistry>, store: MediaStore, settings: MonitorSettings) -> Self {
        Self {
            registry,
            store,
            settings,
            signals: Arc::new(MonitorSignals {
                running: AtomicBool::new(false),
                stop_lock: Mutex::new(()),
                stop_cv: Condvar::new(),
                finished: Mutex::new(true),
                finished_cv: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        if self.signals.running.load(Ordering::SeqCst) {
            MonitorState::Running
        } else if !*self.signals.finished.lock() {
            MonitorState::Stopping
        } else {
            MonitorState::Idle
        }
    }

    /// Whether the loop is running and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.signals.running.load(Ordering::SeqCst)
    }

    /// Start the monitor loop. A no-op while already running.
    ///
    /// Fails with `StillStopping` if a previous loop has been asked to stop
    /// but has not exited yet.
    pub fn start(&self, listener: Arc<dyn CaptureListener>) -> TetherResult<()> {
        let mut slot = self.thread.lock();
        if self.signals.running.load(Ordering::SeqCst) {
            debug!("Event monitor already running");
            return Ok(());
        }
        if !*self.signals.finished.lock() {
            return Err(TetherError::StillStopping("event monitor"));
        }
        if let Some(old) = slot.take() {
            if let Err(e) = old.join() {
                error!("Event monitor thread panicked: {:?}", e);
            }
        }

        *self.signals.finished.lock() = false;
        self.signals.running.store(true, Ordering::SeqCst);

        let worker = MonitorLoop {
            registry: Arc::clone(&self.registry),
            store: self.store.clone(),
            settings: self.settings,
            signals: Arc::clone(&self.signals),
            listener,
        };
        let spawned = thread::Builder::new()
            .name(EVENT_MONITOR_THREAD.into())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                info!("Event monitor started");
                Ok(())
            }
            Err(source) => {
                self.signals.running.store(false, Ordering::SeqCst);
                *self.signals.finished.lock() = true;
                Err(TetherError::Spawn {
                    name: EVENT_MONITOR_THREAD,
                    source,
                })
            }
        }
    }

    /// Request the loop to stop. Never blocks; safe to call repeatedly.
    pub fn stop(&self) {
        if self.signals.running.load(Ordering::SeqCst) {
            info!("Stopping event monitor");
        }
        self.signals.request_stop();
    }

    /// Wait up to `timeout` for the loop thread to exit, then join it.
    ///
    /// Returns `true` once no loop thread is alive. A loop blocked inside a
    /// driver call exits only after that call returns.
    pub fn await_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        {
            let mut finished = self.signals.finished.lock();
            while !*finished {
                if self
                    .signals
                    .finished_cv
                    .wait_until(&mut finished, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if !*finished {
                warn!(?timeout, "Event monitor did not stop in time");
                return false;
            }
        }
        if let Some(handle) = self.thread.lock().take() {
            if let Err(e) = handle.join() {
                error!("Event monitor thread panicked: {:?}", e);
            }
            debug!("Event monitor joined");
        }
        true
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        self.signals.request_stop();
    }
}

struct MonitorLoop {
    registry: Arc<SessionRegistry>,
    store: MediaStore,
    settings: MonitorSettings,
    signals: Arc<MonitorSignals>,
    listener: Arc<dyn CaptureListener>,
}

impl MonitorLoop {
    fn run(self) {
        let _finish = FinishOnDrop(Arc::clone(&self.signals));
        debug!("Event monitor loop running");

        while self.signals.running.load(Ordering::SeqCst) {
            let waited = {
                let mut access = match self.registry.lock() {
                    Ok(access) => access,
                    Err(e) => {
                        error!(error = %e, "Event monitor cannot acquire access guard");
                        break;
                    }
                };
                let Ok(session) = access.session() else {
                    debug!("Session closed; event monitor exiting");
                    break;
                };
                session.handle().wait_for_event(self.settings.event_wait)
            };

            match waited {
                Err(status) => {
                    debug!(%status, "wait_for_event failed; backing off");
                    self.signals.wait_for_stop(self.settings.backoff);
                    continue;
                }
                Ok(CameraEvent::FileAdded(remote)) => self.download(&remote),
                Ok(CameraEvent::CaptureComplete) => trace!("Capture complete"),
                Ok(CameraEvent::Timeout) => {}
                Ok(CameraEvent::Unknown(text)) => trace!(event = %text, "Ignoring device event"),
            }

            self.signals.wait_for_stop(self.settings.poll);
        }

        debug!("Event monitor loop exited");
    }

    fn download(&self, remote: &CameraFilePath) {
        let local = self.store.event_path();
        info!(remote = %remote, "File added on camera");

        let fetched = self.settings.fetch_retry.run(
            |e: &TetherError| e.status().is_some(),
            |attempt| {
                let result = self
                    .registry
                    .with_session(|session| Ok(session.handle().file_get(remote)?));
                if let Err(e) = &result {
                    debug!(attempt, error = %e, "File download attempt failed");
                }
                result
            },
        );

        match fetched {
            Ok(data) => match self.store.save(&local, &data) {
                Ok(()) => {
                    info!(local = %local.display(), "Saved file from camera");
                    self.listener.on_file_captured(&local);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to save downloaded file");
                    self.listener.on_capture_failed(TetherError::Io(e).code());
                }
            },
            Err(exhausted) => {
                warn!(
                    remote = %remote,
                    attempts = exhausted.attempts,
                    error = %exhausted.error,
                    "Giving up on file download"
                );
                self.listener.on_capture_failed(exhausted.error.code());
            }
        }
    }
}
