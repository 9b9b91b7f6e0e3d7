//! # Rust Tether
//!
//! Session and concurrency layer for a tethered camera driven through an
//! opaque, blocking driver library that can serve one request at a time.
//!
//! ## Crate Structure
//!
//! - **`session`**: the single device session and the non-reentrant access
//!   guard every driver call goes through.
//! - **`capture`**: synchronous and background "trigger, download, save".
//! - **`event_monitor`**: background loop waiting on device events and
//!   downloading files the camera reports.
//! - **`live_view`**: background preview streamer with a coalescing capture
//!   request.
//! - **`config_tree`**: configuration tree snapshots, single-widget writes and
//!   the capability catalog.
//! - **`camera`**: `TetherCamera`, the control surface tying the above together.
//! - **`notify`**: listener traits and the channel bridge for async consumers.
//! - **`storage`**: file naming and writing under the storage root.
//! - **`config`** / **`logging`** / **`error`**: application plumbing.
//!
//! Driver-facing types (status codes, handle traits, `ConfigNode`, retry
//! policy) live in the `tether-core` crate; a simulated driver lives in
//! `tether-driver-mock`.

/// Control surface.
pub mod camera;
/// Synchronous and background capture.
pub mod capture;
/// Figment-backed configuration.
pub mod config;
/// Configuration tree access.
pub mod config_tree;
/// Application error type.
pub mod error;
/// Device event monitor.
pub mod event_monitor;
/// Live preview streamer.
pub mod live_view;
/// Tracing setup.
pub mod logging;
/// Listener traits and channel bridge.
pub mod notify;
/// Session registry and access guard.
pub mod session;
/// Captured file naming and writing.
pub mod storage;

pub use camera::TetherCamera;
pub use config::TetherConfig;
pub use error::{AppError, AppResult};
pub use event_monitor::MonitorState;
pub use notify::{CaptureListener, ChannelBridge, LiveViewListener, Notification};
pub use tether_core::{TetherError, TetherResult};
