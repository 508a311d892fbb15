//! rg-probe-sources: the Linux implementation of the metrics provider.

pub mod procfs;
mod provider;
mod shared_sensors;
pub mod sysfs;

pub use provider::{parse_os_release, SysinfoProvider};

/// Initialize shared sensor caches (call once at startup)
pub fn initialize_sensors() {
    shared_sensors::initialize();
}
