//! Device session registry and exclusive access guard.
//!
//! The driver can hold one live connection and cannot process two requests at
//! once. [`SessionRegistry`] owns that connection ([`DeviceSession`]) inside a
//! single [`AccessGuard`]; every driver call, from any thread, goes through
//! [`SessionRegistry::lock`] or [`SessionRegistry::with_session`].
//!
//! The guard is not re-entrant. A thread that already holds it and asks again
//! gets [`TetherError::ReentrantAccess`] instead of deadlocking.

use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tether_core::{
    CameraHandle, DriverBackend, RetryPolicy, TetherError, TetherResult, TransportDescriptor,
};
use tracing::{debug, info, warn};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn thread_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// The single live device connection.
pub struct DeviceSession {
    handle: Box<dyn CameraHandle>,
    transport: TransportDescriptor,
}

impl DeviceSession {
    /// The driver handle. Only reachable through a held [`SessionAccess`].
    pub fn handle(&mut self) -> &mut dyn CameraHandle {
        self.handle.as_mut()
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Mutual exclusion over the device session.
#[derive(Default)]
pub struct AccessGuard {
    session: Mutex<Option<DeviceSession>>,
    owner: AtomicU64,
    acquisitions: AtomicU64,
}

impl AccessGuard {
    /// Block until the guard is free, then hold it until the returned
    /// [`SessionAccess`] is dropped.
    pub fn acquire(&self) -> TetherResult<SessionAccess<'_>> {
        let me = thread_token();
        if self.owner.load(Ordering::SeqCst) == me {
            warn!("Re-entrant access guard acquisition rejected");
            return Err(TetherError::ReentrantAccess);
        }
        let inner = self.session.lock();
        self.owner.store(me, Ordering::SeqCst);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(SessionAccess { guard: self, inner })
    }

    /// Total successful acquisitions since construction.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

/// Scoped exclusive access to the (possibly absent) session.
pub struct SessionAccess<'a> {
    guard: &'a AccessGuard,
    inner: MutexGuard<'a, Option<DeviceSession>>,
}

impl SessionAccess<'_> {
    /// The live session, or `NotInitialized` if it has been closed.
    pub fn session(&mut self) -> TetherResult<&mut DeviceSession> {
        self.inner.as_mut().ok_or(TetherError::NotInitialized)
    }
}

impl Deref for SessionAccess<'_> {
    type Target = Option<DeviceSession>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for SessionAccess<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for SessionAccess<'_> {
    fn drop(&mut self) {
        // cleared before the mutex guard field is dropped
        self.guard.owner.store(0, Ordering::SeqCst);
    }
}

/// Owns the driver backend and the single device session.
pub struct SessionRegistry {
    backend: Arc<dyn DriverBackend>,
    guard: AccessGuard,
    open: AtomicBool,
    init_retry: RetryPolicy,
}

impl SessionRegistry {
    /// Create a registry with no session. `init_retry` bounds the
    /// create-and-init loop in [`SessionRegistry::open`].
    pub fn new(backend: Arc<dyn DriverBackend>, init_retry: RetryPolicy) -> Self {
        Self {
            backend,
            guard: AccessGuard::default(),
            open: AtomicBool::new(false),
            init_retry,
        }
    }

    /// The driver backend, for calls that need no session (autodetect,
    /// port listing, capability catalog, version).
    pub fn backend(&self) -> &Arc<dyn DriverBackend> {
        &self.backend
    }

    /// Open a session, replacing any existing one.
    ///
    /// Repeats {create handle; init} until init succeeds or the init retry
    /// policy is exhausted, in which case the last driver status is returned.
    pub fn open(&self, transport: &TransportDescriptor, search_path: &Path) -> TetherResult<()> {
        let mut access = self.guard.acquire()?;

        if let Some(old) = access.take() {
            self.open.store(false, Ordering::SeqCst);
            info!(transport = %old.transport, "Closing existing session before reopen");
            teardown(old);
        }

        self.backend.configure_search_path(search_path)?;
        self.backend.bind_transport(transport)?;

        let result = self.init_retry.run(
            |_| true,
            |attempt| {
                let mut handle = self.backend.new_handle()?;
                match handle.init() {
                    Ok(()) => Ok(handle),
                    Err(status) => {
                        warn!(attempt, %status, "Camera init failed");
                        Err(status)
                    }
                }
            },
        );

        match result {
            Ok(handle) => {
                *access = Some(DeviceSession {
                    handle,
                    transport: transport.clone(),
                });
                self.open.store(true, Ordering::SeqCst);
                info!(%transport, "Camera session opened");
                Ok(())
            }
            Err(exhausted) => {
                warn!(
                    %transport,
                    attempts = exhausted.attempts,
                    status = %exhausted.error,
                    "Giving up on camera init"
                );
                Err(TetherError::from_status(exhausted.error, exhausted.attempts))
            }
        }
    }

    /// Release the session if there is one.
    ///
    /// Background tasks must be stopped first; this does not wait for them.
    pub fn close(&self) {
        if !self.is_open() {
            return;
        }
        let mut access = match self.guard.acquire() {
            Ok(access) => access,
            Err(e) => {
                warn!(error = %e, "Cannot close session");
                return;
            }
        };
        self.open.store(false, Ordering::SeqCst);
        if let Some(session) = access.take() {
            teardown(session);
            info!("Camera session closed");
        }
    }

    /// Whether a session is live. Does not touch the access guard.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Acquire the access guard.
    pub fn lock(&self) -> TetherResult<SessionAccess<'_>> {
        self.guard.acquire()
    }

    /// Run `f` against the live session under the access guard.
    ///
    /// Fails with `NotInitialized` before touching the guard when no session
    /// is open.
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&mut DeviceSession) -> TetherResult<T>,
    ) -> TetherResult<T> {
        if !self.is_open() {
            return Err(TetherError::NotInitialized);
        }
        let mut access = self.guard.acquire()?;
        f(access.session()?)
    }

    /// Successful access guard acquisitions since construction.
    pub fn guard_acquisitions(&self) -> u64 {
        self.guard.acquisitions()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn teardown(mut session: DeviceSession) {
    if let Err(status) = session.handle.exit() {
        warn!(%status, "Camera exit failed");
    } else {
        debug!("Camera handle released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::DriverStatus;
    use tether_driver_mock::{ops, FaultPlan, FaultScenario, MockCamera};

    fn registry(camera: &MockCamera) -> SessionRegistry {
        SessionRegistry::new(camera.backend(), RetryPolicy::new(3, Duration::from_millis(5)))
    }

    #[test]
    fn open_binds_transport_and_search_path() {
        let camera = MockCamera::new();
        let reg = registry(&camera);
        reg.open(&TransportDescriptor::UsbFd(9), Path::new("/opt/drivers")).unwrap();
        assert!(reg.is_open());
        assert_eq!(camera.bound_transport(), Some(TransportDescriptor::UsbFd(9)));
        assert_eq!(camera.search_path().as_deref(), Some(Path::new("/opt/drivers")));
        assert_eq!(camera.live_handles(), 1);
    }

    #[test]
    fn init_retries_then_succeeds() {
        let camera = MockCamera::builder()
            .faults(FaultPlan::scenario(FaultScenario::FailTimes {
                operation: ops::INIT,
                status: DriverStatus::IO_USB_CLAIM,
                times: 2,
            }))
            .build();
        let reg = registry(&camera);
        reg.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        assert_eq!(camera.calls(ops::INIT), 3);
        assert_eq!(camera.calls(ops::NEW_HANDLE), 3);
        assert_eq!(camera.live_handles(), 1);
    }

    #[test]
    fn init_gives_up_with_last_status() {
        let camera = MockCamera::builder().connected(false).build();
        let reg = registry(&camera);
        let err = reg.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap_err();
        assert_eq!(err.status(), Some(DriverStatus::IO_USB_FIND));
        assert_eq!(camera.calls(ops::INIT), 3);
        assert!(!reg.is_open());
    }

    #[test]
    fn reopen_replaces_session() {
        let camera = MockCamera::new();
        let reg = registry(&camera);
        reg.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        reg.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        assert_eq!(camera.calls(ops::EXIT), 1);
        assert_eq!(camera.live_handles(), 1);
        assert_eq!(camera.max_live_handles(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let camera = MockCamera::new();
        let reg = registry(&camera);
        reg.close();
        reg.open(&TransportDescriptor::Auto, Path::new("/d")).unwrap();
        reg.close();
        reg.close();
        assert!(!reg.is_open());
        assert_eq!(camera.live_handles(), 0);
        assert_eq!(camera.calls(ops::EXIT), 1);
    }

    #[test]
    fn reentrant_acquire_fails_fast() {
        let camera = MockCamera::new();
        let reg = registry(&camera);
        let held = reg.lock().unwrap();
        assert!(matches!(reg.lock(), Err(TetherError::ReentrantAccess)));
        drop(held);
        assert!(reg.lock().is_ok());
    }

    #[test]
    fn with_session_without_open_skips_guard() {
        let camera = MockCamera::new();
        let reg = registry(&camera);
        let result: TetherResult<()> = reg.with_session(|_| Ok(()));
        assert!(matches!(result, Err(TetherError::NotInitialized)));
        assert_eq!(reg.guard_acquisitions(), 0);
    }
}
