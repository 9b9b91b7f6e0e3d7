//! `tether-core`
//!
//! Driver seam and shared types for rust-tether.
//!
//! The camera is reached through a blocking driver library that is not safe
//! for concurrent use on one device. This crate describes that library as
//! traits so the session layer (and tests) can run against real or simulated
//! backends alike.
//!
//! ## Key Types
//!
//! - [`DriverBackend`] / [`CameraHandle`]: the driver seam
//! - [`DriverStatus`]: raw driver status codes, with `CAMERA_BUSY` as the
//!   only transient code
//! - [`TetherError`]: error type returned by the session layer
//! - [`ConfigWidget`] / [`ConfigNode`]: live and snapshot configuration trees
//! - [`RetryPolicy`]: fixed-delay retry for blocking calls

/// Capability catalog entries and flags.
pub mod capabilities;
/// Blocking driver traits and device-side types.
pub mod driver;
/// Status codes and error types.
pub mod error;
/// Fixed-delay retry policy.
pub mod retry;
/// Configuration widgets and tree snapshots.
pub mod widget;

pub use capabilities::{
    CameraAbilities, CameraOperations, CapabilityReport, FileOperations, FolderOperations,
};
pub use driver::{
    CameraEvent, CameraFilePath, CameraHandle, DetectedCamera, DriverBackend, PortInfo,
    TransportDescriptor,
};
pub use error::{DriverResult, DriverStatus, ErrorClass, TetherError, TetherResult};
pub use retry::{Exhausted, RetryPolicy};
pub use widget::{ConfigNode, ConfigWidget, WidgetKind, WidgetValue};
