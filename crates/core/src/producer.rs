//! Producer table keyed by `(category, channel)`
//!
//! Every valid pair maps to one [`Producer`] that declares the published
//! value type, the extra input it needs (device index, sensor index or
//! process id) and how to compute the value. The same table serves type
//! resolution at startup and dispatch at poll time.

use crate::convert::{percent, positive, ratio_percent, seconds_to_minutes, size_in_mb};
use crate::cpu_load::CpuLoadState;
use crate::edid::EdidSummary;
use crate::error::{MetricError, MetricResult, ResolveError};
use crate::provider::{
    CpuIdentity, DiskStore, Display, FileStore, MemoryInfo, MetricsProvider, NetworkInterface,
    PowerSource, ProcessInfo, SwapInfo,
};
use crate::registry::DeviceRegistry;
use once_cell::sync::Lazy;
use rg_probe_types::{Category, Channel, MetricValue, ValueType};
use std::collections::HashMap;

/// Input a producer needs besides the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    None,
    /// Position in the category's device list (defaults to 0)
    Device,
    /// Position in the fan list; must be configured explicitly
    SensorIndex,
    /// Process id; values are absent without a positive id
    ProcessId,
}

/// Everything a producer may consult for one read
pub struct ReadContext<'a> {
    pub provider: &'a dyn MetricsProvider,
    pub registry: &'a DeviceRegistry,
    pub cpu_load: &'a CpuLoadState,
    pub index: Option<usize>,
    pub process_id: Option<i32>,
    pub now_ms: i64,
    pub ttl_ms: i64,
}

impl ReadContext<'_> {
    fn device_index(&self) -> usize {
        self.index.unwrap_or(0)
    }

    fn file_store(&self) -> MetricResult<FileStore> {
        self.registry
            .file_store(self.provider, self.device_index(), self.now_ms, self.ttl_ms)
    }

    fn network(&self) -> MetricResult<NetworkInterface> {
        self.registry
            .network(self.provider, self.device_index(), self.now_ms, self.ttl_ms)
    }

    fn display(&self) -> MetricResult<Display> {
        self.registry
            .display(self.provider, self.device_index(), self.now_ms, self.ttl_ms)
    }

    fn power_source(&self) -> MetricResult<PowerSource> {
        self.registry
            .power_source(self.provider, self.device_index(), self.now_ms, self.ttl_ms)
    }

    fn disk_store(&self) -> MetricResult<DiskStore> {
        self.registry
            .disk_store(self.provider, self.device_index(), self.now_ms, self.ttl_ms)
    }

    fn memory(&self) -> MetricResult<MemoryInfo> {
        Ok(self.provider.memory()?)
    }

    fn swap(&self) -> MetricResult<SwapInfo> {
        Ok(self.provider.swap()?)
    }

    fn cpu(&self) -> MetricResult<CpuIdentity> {
        Ok(self.provider.cpu_identity()?)
    }

    /// The configured process, `None` when no positive id is configured
    fn process(&self) -> MetricResult<Option<ProcessInfo>> {
        match self.process_id {
            Some(pid) if pid > 0 => self
                .provider
                .process(pid)?
                .map(Some)
                .ok_or_else(|| MetricError::process_not_found(pid)),
            _ => Ok(None),
        }
    }
}

type Read = fn(&ReadContext<'_>) -> MetricResult<Option<MetricValue>>;

/// Computes one kind of measurement
#[derive(Clone, Copy)]
pub struct Producer {
    pub value_type: ValueType,
    pub input: Input,
    read: Read,
}

impl Producer {
    pub fn read(&self, ctx: &ReadContext<'_>) -> MetricResult<Option<MetricValue>> {
        (self.read)(ctx)
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("value_type", &self.value_type)
            .field("input", &self.input)
            .finish()
    }
}

static PRODUCERS: Lazy<HashMap<(Category, Channel), Producer>> = Lazy::new(build_table);

/// Producer for a pair, `None` if the pair is not a valid measurement
pub fn producer(category: Category, channel: Channel) -> Option<&'static Producer> {
    PRODUCERS.get(&(category, channel))
}

/// Value type of a topic, checking that the inputs the producer needs are configured
pub fn resolve_type(
    category: Category,
    channel: Channel,
    index: Option<usize>,
) -> Result<ValueType, ResolveError> {
    let producer =
        producer(category, channel).ok_or(ResolveError::UnresolvedType { category, channel })?;

    if producer.input == Input::SensorIndex && index.is_none() {
        return Err(ResolveError::MissingIndex { category, channel });
    }

    Ok(producer.value_type)
}

/// All valid pairs, in no particular order
pub fn supported_pairs() -> impl Iterator<Item = (Category, Channel, ValueType)> {
    PRODUCERS
        .iter()
        .map(|((category, channel), producer)| (*category, *channel, producer.value_type))
}

fn long(value: i64) -> Option<MetricValue> {
    Some(MetricValue::Long(value))
}

fn count(value: u64) -> Option<MetricValue> {
    long(i64::try_from(value).unwrap_or(i64::MAX))
}

fn integer(value: u32) -> Option<MetricValue> {
    Some(MetricValue::Integer(i32::try_from(value).unwrap_or(i32::MAX)))
}

fn double(value: f64) -> Option<MetricValue> {
    Some(MetricValue::Double(value))
}

fn text(value: impl Into<String>) -> Option<MetricValue> {
    Some(MetricValue::String(value.into()))
}

/// Size in MB, absent when it rounds to nothing
fn positive_size(bytes: u64) -> Option<MetricValue> {
    let mb = size_in_mb(bytes);
    (mb > 0).then_some(MetricValue::Long(mb))
}

fn cpu_description(cpu: &CpuIdentity) -> String {
    format!(
        "Model: {} {}, family: {}, vendor: {}, sn: {}, identifier: {}",
        cpu.model,
        if cpu.is_64bit { "64 bit" } else { "32 bit" },
        cpu.family,
        cpu.vendor,
        cpu.serial_number.as_deref().unwrap_or("unknown"),
        cpu.identifier
    )
}

fn first_ip_address(interface: &NetworkInterface) -> Option<MetricValue> {
    interface
        .ipv4_addresses
        .first()
        .or_else(|| interface.ipv6_addresses.first())
        .and_then(|address| text(address.as_str()))
}

fn process_cpu_usage(process: &ProcessInfo) -> Option<f64> {
    if process.up_time == 0 {
        return None;
    }
    let busy = (process.kernel_time + process.user_time) as f64;
    Some(percent(busy / process.up_time as f64))
}

#[derive(Default)]
struct ProducerTable(HashMap<(Category, Channel), Producer>);

impl ProducerTable {
    fn add(&mut self, category: Category, channel: Channel, value_type: ValueType, input: Input, read: Read) {
        self.0.insert(
            (category, channel),
            Producer {
                value_type,
                input,
                read,
            },
        );
    }
}

fn build_table() -> HashMap<(Category, Channel), Producer> {
    use Category as Cat;
    use Channel as Ch;
    use ValueType::{Double, Integer, Long, String};

    let mut table = ProducerTable::default();

    // Memory
    table.add(Cat::Memory, Ch::Available, Long, Input::None, |ctx| {
        Ok(long(size_in_mb(ctx.memory()?.available)))
    });
    table.add(Cat::Memory, Ch::Total, Long, Input::None, |ctx| {
        Ok(long(size_in_mb(ctx.memory()?.total)))
    });
    table.add(Cat::Memory, Ch::Used, Long, Input::None, |ctx| {
        let memory = ctx.memory()?;
        Ok(long(size_in_mb(memory.total.saturating_sub(memory.available))))
    });
    table.add(Cat::Memory, Ch::AvailablePercent, Double, Input::None, |ctx| {
        let memory = ctx.memory()?;
        Ok(ratio_percent(memory.available, memory.total).and_then(double))
    });
    table.add(Cat::Memory, Ch::UsedPercent, Double, Input::None, |ctx| {
        let memory = ctx.memory()?;
        let used = memory.total.saturating_sub(memory.available);
        Ok(ratio_percent(used, memory.total).and_then(double))
    });

    // Swap
    table.add(Cat::Swap, Ch::Available, Long, Input::None, |ctx| {
        let swap = ctx.swap()?;
        Ok(positive_size(swap.total.saturating_sub(swap.used)))
    });
    table.add(Cat::Swap, Ch::Total, Long, Input::None, |ctx| {
        Ok(positive_size(ctx.swap()?.total))
    });
    table.add(Cat::Swap, Ch::Used, Long, Input::None, |ctx| {
        Ok(positive_size(ctx.swap()?.used))
    });
    table.add(Cat::Swap, Ch::AvailablePercent, Double, Input::None, |ctx| {
        let swap = ctx.swap()?;
        let free = swap.total.saturating_sub(swap.used);
        Ok(ratio_percent(free, swap.total).and_then(double))
    });
    table.add(Cat::Swap, Ch::UsedPercent, Double, Input::None, |ctx| {
        let swap = ctx.swap()?;
        Ok(ratio_percent(swap.used, swap.total).and_then(double))
    });

    // Storage (mounted file systems)
    table.add(Cat::Storage, Ch::Available, Long, Input::Device, |ctx| {
        Ok(long(size_in_mb(ctx.file_store()?.usable_space)))
    });
    table.add(Cat::Storage, Ch::Total, Long, Input::Device, |ctx| {
        Ok(long(size_in_mb(ctx.file_store()?.total_space)))
    });
    table.add(Cat::Storage, Ch::Used, Long, Input::Device, |ctx| {
        let store = ctx.file_store()?;
        Ok(long(size_in_mb(store.total_space.saturating_sub(store.usable_space))))
    });
    table.add(Cat::Storage, Ch::AvailablePercent, Double, Input::Device, |ctx| {
        let store = ctx.file_store()?;
        Ok(ratio_percent(store.usable_space, store.total_space).and_then(double))
    });
    table.add(Cat::Storage, Ch::UsedPercent, Double, Input::Device, |ctx| {
        let store = ctx.file_store()?;
        let used = store.total_space.saturating_sub(store.usable_space);
        Ok(ratio_percent(used, store.total_space).and_then(double))
    });
    table.add(Cat::Storage, Ch::Name, String, Input::Device, |ctx| {
        Ok(text(ctx.file_store()?.name))
    });
    table.add(Cat::Storage, Ch::Description, String, Input::Device, |ctx| {
        Ok(text(ctx.file_store()?.description))
    });
    table.add(Cat::Storage, Ch::Type, String, Input::Device, |ctx| {
        Ok(text(ctx.file_store()?.fs_type))
    });

    // Drives
    table.add(Cat::Drive, Ch::Name, String, Input::Device, |ctx| {
        Ok(text(ctx.disk_store()?.name))
    });
    table.add(Cat::Drive, Ch::Model, String, Input::Device, |ctx| {
        Ok(text(ctx.disk_store()?.model))
    });
    table.add(Cat::Drive, Ch::SerialNumber, String, Input::Device, |ctx| {
        Ok(text(ctx.disk_store()?.serial))
    });

    // Displays
    table.add(Cat::Display, Ch::Information, String, Input::Device, |ctx| {
        let display = ctx.display()?;
        Ok(EdidSummary::parse(&display.edid).and_then(|edid| text(edid.to_string())))
    });

    // Batteries
    table.add(Cat::Battery, Ch::Name, String, Input::Device, |ctx| {
        Ok(text(ctx.power_source()?.name))
    });
    table.add(Cat::Battery, Ch::RemainingCapacity, Double, Input::Device, |ctx| {
        Ok(double(percent(ctx.power_source()?.remaining_capacity)))
    });
    table.add(Cat::Battery, Ch::RemainingTime, Double, Input::Device, |ctx| {
        let seconds = ctx.power_source()?.time_remaining;
        Ok(positive(seconds_to_minutes(seconds)).and_then(double))
    });

    // CPU
    table.add(Cat::Cpu, Ch::Name, String, Input::None, |ctx| Ok(text(ctx.cpu()?.name)));
    table.add(Cat::Cpu, Ch::Description, String, Input::None, |ctx| {
        Ok(text(cpu_description(&ctx.cpu()?)))
    });
    table.add(Cat::Cpu, Ch::Load, Double, Input::None, |ctx| {
        Ok(double(percent(ctx.cpu_load.sample(ctx.provider)?)))
    });
    table.add(Cat::Cpu, Ch::Load1, Double, Input::None, |ctx| {
        let load = ctx.provider.load_average()?.one;
        Ok((load >= 0.0).then_some(load).and_then(double))
    });
    table.add(Cat::Cpu, Ch::Load5, Double, Input::None, |ctx| {
        let load = ctx.provider.load_average()?.five;
        Ok((load >= 0.0).then_some(load).and_then(double))
    });
    table.add(Cat::Cpu, Ch::Load15, Double, Input::None, |ctx| {
        let load = ctx.provider.load_average()?.fifteen;
        Ok((load >= 0.0).then_some(load).and_then(double))
    });
    table.add(Cat::Cpu, Ch::Uptime, Double, Input::None, |ctx| {
        Ok(double(seconds_to_minutes(ctx.provider.uptime()? as f64)))
    });
    table.add(Cat::Cpu, Ch::Threads, Integer, Input::None, |ctx| {
        Ok(integer(ctx.provider.thread_count()?))
    });

    // Sensors
    table.add(Cat::Sensors, Ch::CpuTemperature, Double, Input::None, |ctx| {
        Ok(positive(ctx.provider.cpu_temperature()?).and_then(double))
    });
    table.add(Cat::Sensors, Ch::CpuVoltage, Double, Input::None, |ctx| {
        Ok(positive(ctx.provider.cpu_voltage()?).and_then(double))
    });
    table.add(Cat::Sensors, Ch::FanSpeed, Integer, Input::SensorIndex, |ctx| {
        let Some(index) = ctx.index else {
            return Ok(None);
        };
        let speeds = ctx.provider.fan_speeds()?;
        Ok(speeds
            .get(index)
            .copied()
            .filter(|rpm| *rpm > 0)
            .map(MetricValue::Integer))
    });

    // Network
    table.add(Cat::Network, Ch::IpAddress, String, Input::Device, |ctx| {
        Ok(first_ip_address(&ctx.network()?))
    });
    table.add(Cat::Network, Ch::MacAddress, String, Input::Device, |ctx| {
        Ok(text(ctx.network()?.mac_address))
    });
    table.add(Cat::Network, Ch::NetworkDisplayName, String, Input::Device, |ctx| {
        Ok(text(ctx.network()?.display_name))
    });
    table.add(Cat::Network, Ch::NetworkName, String, Input::Device, |ctx| {
        Ok(text(ctx.network()?.name))
    });
    table.add(Cat::Network, Ch::PacketsSent, Long, Input::Device, |ctx| {
        Ok(count(ctx.network()?.packets_sent))
    });
    table.add(Cat::Network, Ch::PacketsReceived, Long, Input::Device, |ctx| {
        Ok(count(ctx.network()?.packets_received))
    });
    table.add(Cat::Network, Ch::DataSent, Long, Input::Device, |ctx| {
        Ok(long(size_in_mb(ctx.network()?.bytes_sent)))
    });
    table.add(Cat::Network, Ch::DataReceived, Long, Input::Device, |ctx| {
        Ok(long(size_in_mb(ctx.network()?.bytes_received)))
    });

    // Processes
    table.add(Cat::Process, Ch::Name, String, Input::ProcessId, |ctx| {
        Ok(ctx.process()?.and_then(|process| text(process.name)))
    });
    table.add(Cat::Process, Ch::Path, String, Input::ProcessId, |ctx| {
        Ok(ctx.process()?.and_then(|process| text(process.path)))
    });
    table.add(Cat::Process, Ch::Load, Double, Input::ProcessId, |ctx| {
        Ok(ctx
            .process()?
            .and_then(|process| process_cpu_usage(&process))
            .and_then(double))
    });
    table.add(Cat::Process, Ch::Used, Long, Input::ProcessId, |ctx| {
        Ok(ctx
            .process()?
            .and_then(|process| long(size_in_mb(process.resident_set_size))))
    });
    table.add(Cat::Process, Ch::Threads, Integer, Input::ProcessId, |ctx| {
        Ok(ctx.process()?.and_then(|process| integer(process.thread_count)))
    });

    table.0
}
