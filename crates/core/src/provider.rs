//! Platform metrics provider trait and the device handles it hands out

use anyhow::Result;

/// Physical memory counters, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
}

/// Swap counters, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwapInfo {
    pub total: u64,
    pub used: u64,
}

/// Static processor identification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuIdentity {
    pub name: String,
    pub model: String,
    pub family: String,
    pub vendor: String,
    pub identifier: String,
    pub is_64bit: bool,
    /// Serial number of the machine, usually only readable by root
    pub serial_number: Option<String>,
    pub logical_cores: usize,
    pub physical_cores: usize,
}

/// Aggregate CPU time counters since boot, in clock ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTicks {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Ticks during which the CPU had nothing to run
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// 1, 5 and 15 minute load averages; negative when the platform has none
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Operating system identification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OsInfo {
    pub family: String,
    pub manufacturer: String,
    pub version: String,
}

/// A mounted file system
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileStore {
    pub name: String,
    pub description: String,
    pub fs_type: String,
    pub mount_point: String,
    pub total_space: u64,
    pub usable_space: u64,
}

/// A network adapter and its traffic counters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkInterface {
    pub name: String,
    pub display_name: String,
    pub mac_address: String,
    pub ipv4_addresses: Vec<String>,
    pub ipv6_addresses: Vec<String>,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// A connected display
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Display {
    pub name: String,
    /// Raw EDID block as reported by the display
    pub edid: Vec<u8>,
}

/// A battery or other power supply
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PowerSource {
    pub name: String,
    /// Remaining capacity as a fraction between 0.0 and 1.0
    pub remaining_capacity: f64,
    /// Estimated seconds until empty; negative when unknown
    pub time_remaining: f64,
}

/// A physical disk drive
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskStore {
    pub name: String,
    pub model: String,
    pub serial: String,
}

/// Snapshot of a single running process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: String,
    pub path: String,
    /// Milliseconds spent in kernel mode
    pub kernel_time: u64,
    /// Milliseconds spent in user mode
    pub user_time: u64,
    /// Milliseconds since the process started
    pub up_time: u64,
    /// Resident set size in bytes
    pub resident_set_size: u64,
    pub thread_count: u32,
}

/// Capability surface of the platform metrics provider
///
/// Every call may block on the operating system and may fail independently.
/// Enumerations return devices in a stable order so that configured indices
/// keep pointing at the same device between refreshes.
pub trait MetricsProvider: Send + Sync {
    fn memory(&self) -> Result<MemoryInfo>;

    fn swap(&self) -> Result<SwapInfo>;

    fn cpu_identity(&self) -> Result<CpuIdentity>;

    /// Current aggregate tick counters
    fn cpu_ticks(&self) -> Result<CpuTicks>;

    fn load_average(&self) -> Result<LoadAverage>;

    /// Seconds since boot
    fn uptime(&self) -> Result<u64>;

    /// Number of threads across all processes
    fn thread_count(&self) -> Result<u32>;

    /// CPU temperature in degrees Celsius, 0.0 when unavailable
    fn cpu_temperature(&self) -> Result<f64>;

    /// CPU core voltage in volts, 0.0 when unavailable
    fn cpu_voltage(&self) -> Result<f64>;

    /// Fan speeds in RPM
    fn fan_speeds(&self) -> Result<Vec<i32>>;

    fn file_stores(&self) -> Result<Vec<FileStore>>;

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>>;

    /// Re-read the counters and addresses of one interface in place
    fn update_network_attributes(&self, interface: &mut NetworkInterface) -> Result<()>;

    fn displays(&self) -> Result<Vec<Display>>;

    fn power_sources(&self) -> Result<Vec<PowerSource>>;

    fn disk_stores(&self) -> Result<Vec<DiskStore>>;

    /// Look up a process, `Ok(None)` when no such process exists
    fn process(&self, pid: i32) -> Result<Option<ProcessInfo>>;

    fn os_info(&self) -> Result<OsInfo>;

    /// Process id of the running service
    fn process_id(&self) -> u32 {
        std::process::id()
    }
}
