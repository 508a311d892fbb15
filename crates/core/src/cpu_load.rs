//! CPU load measured as the delta between successive tick snapshots

use crate::provider::{CpuTicks, MetricsProvider};
use anyhow::Result;
use std::sync::{Mutex, MutexGuard};

/// Fraction of non-idle ticks between two snapshots (0.0 to 1.0)
pub fn load_between_ticks(previous: &CpuTicks, current: &CpuTicks) -> f64 {
    let total = current.total().saturating_sub(previous.total());
    if total == 0 {
        return 0.0;
    }
    let idle = current.idle_total().saturating_sub(previous.idle_total());
    total.saturating_sub(idle) as f64 / total as f64
}

/// Process-wide tick snapshot shared by every CPU load read.
///
/// The read-modify-write of the snapshot happens under one lock, so each
/// call measures the load since the previous call and concurrent readers
/// never interleave.
#[derive(Debug, Default)]
pub struct CpuLoadState {
    previous: Mutex<Option<CpuTicks>>,
}

impl CpuLoadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known snapshot instead of the counters at boot
    pub fn with_baseline(ticks: CpuTicks) -> Self {
        Self {
            previous: Mutex::new(Some(ticks)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CpuTicks>> {
        self.previous.lock().unwrap_or_else(|poisoned| {
            log::warn!("CPU tick state mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Load since the last call as a fraction, then retain the current snapshot.
    ///
    /// Built with [`CpuLoadState::with_baseline`], the first call measures
    /// since that snapshot. Without one it measures against zero, i.e. the
    /// average load since boot. A failing provider leaves the snapshot untouched.
    pub fn sample(&self, provider: &dyn MetricsProvider) -> Result<f64> {
        let mut previous = self.lock();
        let current = provider.cpu_ticks()?;
        let baseline = previous.replace(current).unwrap_or_default();
        Ok(load_between_ticks(&baseline, &current))
    }

    /// Snapshot the next call will measure against
    pub fn snapshot(&self) -> Option<CpuTicks> {
        *self.lock()
    }
}
