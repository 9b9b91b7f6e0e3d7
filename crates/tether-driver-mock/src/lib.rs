//! Simulated camera driver for rust-tether.
//!
//! Implements the `tether-core` driver traits without hardware so the session
//! layer, the CLI (`--mock`) and the test suites can run anywhere.
//!
//! # Features
//!
//! - Device event queue with blocking, timeout-bounded `wait_for_event`
//! - Preview frame generator and an in-memory card for captured files
//! - Configuration widget tree with `controlmode` and `liveviewsize`
//! - Capability catalog keyed by model
//! - Fault injection: scripted status sequences and seeded random busy
//! - Concurrency detector counting driver calls that overlap in time
//!
//! ```rust,ignore
//! use tether_driver_mock::{FaultPlan, FaultScenario, MockCamera, ops};
//! use tether_core::DriverStatus;
//!
//! let camera = MockCamera::builder()
//!     .faults(FaultPlan::scenario(FaultScenario::FailTimes {
//!         operation: ops::GET_CONFIG,
//!         status: DriverStatus::CAMERA_BUSY,
//!         times: 2,
//!     }))
//!     .build();
//! let backend = camera.backend();
//! ```

/// Fault injection, RNG and timing shared by the mock.
pub mod common;
mod mock_camera;
mod widget;

pub use common::{ops, FaultPlan, FaultScenario, MockRng, TimingConfig};
pub use mock_camera::{MockCamera, MockCameraBuilder, CAPTURE_FOLDER, DEFAULT_MODEL, DEFAULT_PORT};
pub use widget::MockWidget;
