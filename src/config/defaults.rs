//! Built-in topic set used when no config file exists

use rg_probe_core::{Category, Channel, RefreshInterval, TimeUnit, TopicConfig};

fn topic(path: &str, category: Category, channel: Channel) -> TopicConfig {
    TopicConfig::new(path, category, channel)
}

/// A small host overview: memory, CPU, the first disk and interface, and this process
pub fn default_topics() -> Vec<TopicConfig> {
    let every_second = RefreshInterval::new(1, TimeUnit::Seconds);
    let every_minute = RefreshInterval::new(1, TimeUnit::Minutes);
    let own_pid = i32::try_from(std::process::id()).unwrap_or(0);

    vec![
        topic("host/memory/total", Category::Memory, Channel::Total)
            .with_refresh_interval(every_minute),
        topic("host/memory/used_percent", Category::Memory, Channel::UsedPercent),
        topic("host/swap/used_percent", Category::Swap, Channel::UsedPercent),
        topic("host/cpu/name", Category::Cpu, Channel::Name).with_refresh_interval(every_minute),
        topic("host/cpu/load", Category::Cpu, Channel::Load).with_refresh_interval(every_second),
        topic("host/cpu/load1", Category::Cpu, Channel::Load1),
        topic("host/cpu/uptime", Category::Cpu, Channel::Uptime)
            .with_refresh_interval(every_minute),
        topic("host/cpu/threads", Category::Cpu, Channel::Threads),
        topic("host/sensors/cpu_temperature", Category::Sensors, Channel::CpuTemperature),
        topic("host/storage/0/available_percent", Category::Storage, Channel::AvailablePercent)
            .with_index(0)
            .with_refresh_interval(every_minute),
        topic("host/network/0/ip_address", Category::Network, Channel::IpAddress).with_index(0),
        topic("host/network/0/data_received", Category::Network, Channel::DataReceived)
            .with_index(0),
        topic("host/network/0/data_sent", Category::Network, Channel::DataSent).with_index(0),
        topic("probe/process/used", Category::Process, Channel::Used).with_process_id(own_pid),
        topic("probe/process/load", Category::Process, Channel::Load).with_process_id(own_pid),
    ]
}
