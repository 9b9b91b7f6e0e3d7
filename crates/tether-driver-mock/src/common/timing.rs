//! Simulated driver call latencies.

use std::time::Duration;

/// Delays applied inside the mock driver calls.
///
/// The default is instant. Non-zero latencies widen the window in which two
/// overlapping calls would be caught by the concurrency detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Added to every handle call.
    pub call_latency: Duration,
    /// Preview frame readout.
    pub preview_readout: Duration,
    /// Shutter and write-to-card time of `capture_image`.
    pub capture_time: Duration,
}

impl TimingConfig {
    /// No delays at all.
    pub fn instant() -> Self {
        Self::default()
    }

    /// Roughly what a USB-tethered DSLR does.
    pub fn realistic() -> Self {
        Self {
            call_latency: Duration::from_millis(2),
            preview_readout: Duration::from_millis(30),
            capture_time: Duration::from_millis(250),
        }
    }
}
