//! Driver status codes and the tethering error taxonomy.
//!
//! The camera driver reports every outcome as a signed status code: `0` is
//! success and negative values are failures. [`DriverStatus`] wraps the raw
//! code so it can be classified and printed, and [`TetherError`] is the error
//! type returned by every operation in the session layer.
//!
//! ## Error Classes
//!
//! - **NotInitialized**: an operation was invoked without an open session.
//!   Reported immediately and never retried.
//! - **TransientBusy**: the driver reported that the device or bus is in the
//!   middle of another operation. Call sites that define a retry policy absorb
//!   it; exhausting the policy yields [`TetherError::Busy`].
//! - **DeviceError**: any other failure status (not found, I/O, permission).
//!   Propagated as-is via [`TetherError::Driver`].
//!
//! Informational driver events such as capture-complete are not errors; they
//! arrive as `CameraEvent`s and the event monitor swallows them.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results from the session layer.
pub type TetherResult<T> = std::result::Result<T, TetherError>;

/// Result of a single blocking driver call.
pub type DriverResult<T> = std::result::Result<T, DriverStatus>;

/// Raw status code returned by the camera driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverStatus(i32);

impl DriverStatus {
    /// Success
    pub const OK: Self = Self(0);
    /// Unspecified failure
    pub const GENERIC: Self = Self(-1);
    /// Bad parameters
    pub const BAD_PARAMETERS: Self = Self(-2);
    /// Out of memory
    pub const NO_MEMORY: Self = Self(-3);
    /// Driver library error
    pub const LIBRARY: Self = Self(-4);
    /// Unknown port
    pub const UNKNOWN_PORT: Self = Self(-5);
    /// Not supported by this camera
    pub const NOT_SUPPORTED: Self = Self(-6);
    /// Generic I/O error
    pub const IO: Self = Self(-7);
    /// I/O timeout
    pub const TIMEOUT: Self = Self(-10);
    /// Port initialisation failed
    pub const IO_INIT: Self = Self(-31);
    /// Read failed
    pub const IO_READ: Self = Self(-34);
    /// Write failed
    pub const IO_WRITE: Self = Self(-35);
    /// No USB device found
    pub const IO_USB_FIND: Self = Self(-52);
    /// USB interface could not be claimed
    pub const IO_USB_CLAIM: Self = Self(-53);
    /// Port could not be locked
    pub const IO_LOCK: Self = Self(-60);
    /// Corrupted data
    pub const CORRUPTED_DATA: Self = Self(-102);
    /// Model not in the catalog
    pub const MODEL_NOT_FOUND: Self = Self(-105);
    /// Directory not found
    pub const DIRECTORY_NOT_FOUND: Self = Self(-107);
    /// File not found
    pub const FILE_NOT_FOUND: Self = Self(-108);
    /// Device is mid-operation; the only status worth retrying.
    pub const CAMERA_BUSY: Self = Self(-110);
    /// Cancelled
    pub const CANCEL: Self = Self(-112);
    /// Unspecified camera error
    pub const CAMERA_ERROR: Self = Self(-113);
    /// Operating system failure
    pub const OS_FAILURE: Self = Self(-114);
    /// Not enough space
    pub const NO_SPACE: Self = Self(-115);

    /// Wrap a raw driver code.
    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    /// The raw driver code.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Whether the code reports success.
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    /// Whether retrying after a short delay is known to help.
    pub const fn is_transient(self) -> bool {
        self.0 == Self::CAMERA_BUSY.0
    }

    /// Classify a failure status.
    pub fn class(self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::TransientBusy
        } else {
            ErrorClass::DeviceError
        }
    }

    /// Convert a raw code into a `DriverResult`.
    pub fn check(code: i32) -> DriverResult<()> {
        if code >= 0 {
            Ok(())
        } else {
            Err(Self(code))
        }
    }

    /// Short human-readable description of the status.
    pub fn as_str(self) -> &'static str {
        match self.0 {
            c if c >= 0 => "No error",
            -1 => "Unspecified error",
            -2 => "Bad parameters",
            -3 => "Out of memory",
            -4 => "Error in the camera driver",
            -5 => "Unknown port",
            -6 => "Unsupported operation",
            -7 => "I/O problem",
            -10 => "Timeout reading from or writing to the port",
            -31 => "Error initializing the port",
            -34 => "Error reading from the port",
            -35 => "Error writing to the port",
            -52 => "Could not find the requested device on the USB port",
            -53 => "Could not claim the USB device",
            -60 => "Could not lock the device",
            -102 => "Corrupted data",
            -105 => "Unknown model",
            -107 => "Directory not found",
            -108 => "File not found",
            -110 => "I/O in progress",
            -112 => "Cancelled",
            -113 => "Unspecified camera error",
            -114 => "OS failure",
            -115 => "Not enough space",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.0)
    }
}

impl From<std::io::Error> for DriverStatus {
    fn from(_: std::io::Error) -> Self {
        Self::OS_FAILURE
    }
}

/// Coarse classification used by retry policies and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No open session
    NotInitialized,
    /// Device busy; retrying may help
    TransientBusy,
    /// Any other device or driver failure
    DeviceError,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::NotInitialized => "not_initialized",
            ErrorClass::TransientBusy => "transient_busy",
            ErrorClass::DeviceError => "device_error",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for the tethering session layer.
#[derive(Error, Debug)]
pub enum TetherError {
    /// No device session is open.
    #[error("Camera not initialized")]
    NotInitialized,

    /// The device stayed busy for every attempt of a retry policy.
    #[error("Camera busy after {attempts} attempt(s): {status}")]
    Busy {
        /// The busy status from the last attempt
        status: DriverStatus,
        /// Attempts made
        attempts: u32,
    },

    /// The driver reported a non-transient failure.
    #[error("Driver error: {0}")]
    Driver(DriverStatus),

    /// The calling thread already holds the access guard.
    #[error("Access guard is already held by this thread")]
    ReentrantAccess,

    /// A named configuration widget does not exist on this device.
    #[error("Config widget '{0}' not found")]
    WidgetNotFound(String),

    /// A background task was asked to start while its previous run is still winding down.
    #[error("{0} is still stopping")]
    StillStopping(&'static str),

    /// A background thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name
        name: &'static str,
        /// Error from the thread builder
        #[source]
        source: std::io::Error,
    },

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TetherError {
    /// Build the error for a failed driver call, keeping the busy class distinct.
    pub fn from_status(status: DriverStatus, attempts: u32) -> Self {
        if status.is_transient() {
            TetherError::Busy { status, attempts }
        } else {
            TetherError::Driver(status)
        }
    }

    /// The driver status behind this error, if any.
    pub fn status(&self) -> Option<DriverStatus> {
        match self {
            TetherError::Busy { status, .. } | TetherError::Driver(status) => Some(*status),
            TetherError::Io(_) => Some(DriverStatus::OS_FAILURE),
            _ => None,
        }
    }

    /// Status code suitable for a callback boundary (`on_capture_failed`).
    pub fn code(&self) -> DriverStatus {
        self.status().unwrap_or(DriverStatus::GENERIC)
    }

    /// Coarse class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            TetherError::NotInitialized => ErrorClass::NotInitialized,
            TetherError::Busy { .. } => ErrorClass::TransientBusy,
            _ => ErrorClass::DeviceError,
        }
    }
}

impl From<DriverStatus> for TetherError {
    fn from(status: DriverStatus) -> Self {
        TetherError::from_status(status, 1)
    }
}
