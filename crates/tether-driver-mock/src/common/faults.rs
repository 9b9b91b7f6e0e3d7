//! Status injection for the simulated driver.
//!
//! A [`FaultPlan`] decides, per driver call, whether the call fails and with
//! which [`DriverStatus`]. Scripted scenarios are matched first; per-operation
//! random rates (with a `"*"` wildcard) inject `CAMERA_BUSY` afterwards.

use super::rng::MockRng;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::{DriverResult, DriverStatus};

/// Operation names used for fault matching and call counting.
pub mod ops {
    /// `CameraHandle::init`
    pub const INIT: &str = "init";
    /// `CameraHandle::exit`
    pub const EXIT: &str = "exit";
    /// `CameraHandle::model`
    pub const MODEL: &str = "model";
    /// `CameraHandle::summary`
    pub const SUMMARY: &str = "summary";
    /// `CameraHandle::capture_image`
    pub const CAPTURE_IMAGE: &str = "capture_image";
    /// `CameraHandle::file_get`
    pub const FILE_GET: &str = "file_get";
    /// `CameraHandle::capture_preview`
    pub const CAPTURE_PREVIEW: &str = "capture_preview";
    /// `CameraHandle::wait_for_event`
    pub const WAIT_FOR_EVENT: &str = "wait_for_event";
    /// `CameraHandle::get_config`
    pub const GET_CONFIG: &str = "get_config";
    /// `CameraHandle::set_config`
    pub const SET_CONFIG: &str = "set_config";
    /// `DriverBackend::new_handle`
    pub const NEW_HANDLE: &str = "new_handle";
    /// `DriverBackend::autodetect`
    pub const AUTODETECT: &str = "autodetect";
}

/// Scripted failure of one operation.
#[derive(Debug, Clone)]
pub enum FaultScenario {
    /// The first `times` calls of `operation` fail, later calls succeed.
    FailTimes {
        /// Operation name from [`ops`]
        operation: &'static str,
        /// Status returned while failing
        status: DriverStatus,
        /// Number of failing calls
        times: u32,
    },
    /// Every call of `operation` fails.
    FailAlways {
        /// Operation name from [`ops`]
        operation: &'static str,
        /// Status returned on every call
        status: DriverStatus,
    },
    /// `count` calls succeed, every later call fails.
    FailAfterN {
        /// Operation name from [`ops`]
        operation: &'static str,
        /// Calls that succeed first
        count: u32,
        /// Status returned afterwards
        status: DriverStatus,
    },
}

impl FaultScenario {
    fn operation(&self) -> &'static str {
        match self {
            FaultScenario::FailTimes { operation, .. }
            | FaultScenario::FailAlways { operation, .. }
            | FaultScenario::FailAfterN { operation, .. } => operation,
        }
    }

    /// `nth` is the 1-based index of the current call to this operation.
    fn fails(&self, nth: u32) -> Option<DriverStatus> {
        match *self {
            FaultScenario::FailTimes { status, times, .. } if nth <= times => Some(status),
            FaultScenario::FailAlways { status, .. } => Some(status),
            FaultScenario::FailAfterN { status, count, .. } if nth > count => Some(status),
            _ => None,
        }
    }
}

/// Fault injection configuration shared by a mock backend and its handles.
#[derive(Clone, Debug)]
pub struct FaultPlan {
    busy_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<FaultScenario>>,
    rng: Arc<MockRng>,
    counts: Arc<Mutex<HashMap<&'static str, u32>>>,
}

impl FaultPlan {
    /// No injected failures.
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// One scripted scenario.
    pub fn scenario(scenario: FaultScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scripted scenarios, matched in order.
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Random `CAMERA_BUSY` on every operation with probability `rate`.
    pub fn random_busy_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// Random `CAMERA_BUSY` with a per-operation rate.
    pub fn with_busy_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self::build(rates, Vec::new(), seed)
    }

    fn build(
        busy_rates: HashMap<&'static str, f64>,
        scenarios: Vec<FaultScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            busy_rates: Arc::new(busy_rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Decide the outcome of one call to `operation`.
    pub fn check(&self, operation: &'static str) -> DriverResult<()> {
        let nth = {
            let mut counts = self.counts.lock();
            let n = counts.entry(operation).or_insert(0);
            *n += 1;
            *n
        };

        for scenario in self.scenarios.iter() {
            if scenario.operation() != operation {
                continue;
            }
            if let Some(status) = scenario.fails(nth) {
                tracing::trace!(operation, nth, %status, "Injected driver failure");
                return Err(status);
            }
        }

        let rate = self
            .busy_rates
            .get(operation)
            .or_else(|| self.busy_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            tracing::trace!(operation, nth, "Injected random busy");
            return Err(DriverStatus::CAMERA_BUSY);
        }
        Ok(())
    }

    /// Clear scenario counters.
    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self::none()
    }
}
