//! Shared constants for the engine

use std::time::Duration;

/// Bytes per megabyte (1024^2)
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Refresh interval used for the startup snapshot.
///
/// Long enough that the device caches warmed by the snapshot are still
/// valid when the first periodic poll arrives.
pub const INITIAL_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Number of topics the poll driver reads concurrently
pub const DEFAULT_WORKER_COUNT: usize = 3;
