//! Shared infrastructure for the simulated driver.
//!
//! - **faults**: status injection (scripted and seeded-random)
//! - **rng**: seeded random number generator
//! - **timing**: simulated call latencies

/// Status injection.
pub mod faults;
/// Seeded RNG.
pub mod rng;
/// Simulated latencies.
pub mod timing;

pub use faults::{ops, FaultPlan, FaultScenario};
pub use rng::MockRng;
pub use timing::TimingConfig;
