//! Metric categories and channels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level metric grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Memory,
    Swap,
    Storage,
    Drive,
    Display,
    Battery,
    Cpu,
    Sensors,
    Network,
    Process,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Memory,
        Category::Swap,
        Category::Storage,
        Category::Drive,
        Category::Display,
        Category::Battery,
        Category::Cpu,
        Category::Sensors,
        Category::Network,
        Category::Process,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Memory => "MEMORY",
            Category::Swap => "SWAP",
            Category::Storage => "STORAGE",
            Category::Drive => "DRIVE",
            Category::Display => "DISPLAY",
            Category::Battery => "BATTERY",
            Category::Cpu => "CPU",
            Category::Sensors => "SENSORS",
            Category::Network => "NETWORK",
            Category::Process => "PROCESS",
        }
    }

    /// Whether topics of this category address one entry of a device list.
    ///
    /// Such topics get `index = 0` when the configuration leaves it out.
    pub fn requires_index(&self) -> bool {
        matches!(
            self,
            Category::Storage
                | Category::Drive
                | Category::Display
                | Category::Battery
                | Category::Network
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specific measurement within a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Available,
    Total,
    /// Older configurations spell this `MEMORY_USED`
    #[serde(alias = "MEMORY_USED")]
    Used,
    AvailablePercent,
    UsedPercent,
    Name,
    Description,
    Type,
    Model,
    SerialNumber,
    Information,
    RemainingCapacity,
    RemainingTime,
    Load,
    Load1,
    Load5,
    Load15,
    Uptime,
    Threads,
    CpuTemperature,
    CpuVoltage,
    FanSpeed,
    IpAddress,
    MacAddress,
    NetworkDisplayName,
    NetworkName,
    PacketsSent,
    PacketsReceived,
    DataSent,
    DataReceived,
    Path,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Available => "AVAILABLE",
            Channel::Total => "TOTAL",
            Channel::Used => "USED",
            Channel::AvailablePercent => "AVAILABLE_PERCENT",
            Channel::UsedPercent => "USED_PERCENT",
            Channel::Name => "NAME",
            Channel::Description => "DESCRIPTION",
            Channel::Type => "TYPE",
            Channel::Model => "MODEL",
            Channel::SerialNumber => "SERIAL_NUMBER",
            Channel::Information => "INFORMATION",
            Channel::RemainingCapacity => "REMAINING_CAPACITY",
            Channel::RemainingTime => "REMAINING_TIME",
            Channel::Load => "LOAD",
            Channel::Load1 => "LOAD1",
            Channel::Load5 => "LOAD5",
            Channel::Load15 => "LOAD15",
            Channel::Uptime => "UPTIME",
            Channel::Threads => "THREADS",
            Channel::CpuTemperature => "CPU_TEMPERATURE",
            Channel::CpuVoltage => "CPU_VOLTAGE",
            Channel::FanSpeed => "FAN_SPEED",
            Channel::IpAddress => "IP_ADDRESS",
            Channel::MacAddress => "MAC_ADDRESS",
            Channel::NetworkDisplayName => "NETWORK_DISPLAY_NAME",
            Channel::NetworkName => "NETWORK_NAME",
            Channel::PacketsSent => "PACKETS_SENT",
            Channel::PacketsReceived => "PACKETS_RECEIVED",
            Channel::DataSent => "DATA_SENT",
            Channel::DataReceived => "DATA_RECEIVED",
            Channel::Path => "PATH",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
