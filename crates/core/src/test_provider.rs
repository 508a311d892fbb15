//! In-memory metrics provider for tests and hardware-free runs
//!
//! Every value the engine can ask for lives in a [`TestState`] that callers
//! may edit at any time. Enumeration calls are counted so cache behaviour can
//! be checked from the outside.

use crate::provider::{
    CpuIdentity, CpuTicks, DiskStore, Display, FileStore, LoadAverage, MemoryInfo,
    MetricsProvider, NetworkInterface, OsInfo, PowerSource, ProcessInfo, SwapInfo,
};
use anyhow::{bail, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

const GIB: u64 = 1024 * 1024 * 1024;

/// Number of calls made to the expensive provider operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub file_stores: usize,
    pub network_interfaces: usize,
    pub network_updates: usize,
    pub displays: usize,
    pub power_sources: usize,
    pub disk_stores: usize,
    pub process_lookups: usize,
}

/// Everything the test provider reports
#[derive(Debug, Clone, Default)]
pub struct TestState {
    /// Make every call fail
    pub failing: bool,
    /// Advance tick and traffic counters on every read
    pub simulate: bool,
    pub memory: MemoryInfo,
    pub swap: SwapInfo,
    pub cpu: CpuIdentity,
    /// Snapshots handed out in order; the last one repeats once drained
    pub cpu_ticks: VecDeque<CpuTicks>,
    pub last_cpu_ticks: CpuTicks,
    pub load_average: LoadAverage,
    pub uptime: u64,
    pub thread_count: u32,
    pub cpu_temperature: f64,
    pub cpu_voltage: f64,
    pub fan_speeds: Vec<i32>,
    pub file_stores: Vec<FileStore>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub displays: Vec<Display>,
    pub power_sources: Vec<PowerSource>,
    pub disk_stores: Vec<DiskStore>,
    pub processes: HashMap<i32, ProcessInfo>,
    pub os: OsInfo,
    pub calls: CallCounts,
}

/// Provider backed by a [`TestState`]
#[derive(Debug, Default)]
pub struct TestProvider {
    state: Mutex<TestState>,
}

impl TestProvider {
    /// Provider with no devices and all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider describing a plausible single-socket desktop
    pub fn sample() -> Self {
        let pid = std::process::id() as i32;
        let mut processes = HashMap::new();
        processes.insert(
            pid,
            ProcessInfo {
                pid,
                name: "rg-probe".to_string(),
                path: "/usr/bin/rg-probe".to_string(),
                kernel_time: 1_500,
                user_time: 4_500,
                up_time: 60_000,
                resident_set_size: 24 * 1024 * 1024,
                thread_count: 6,
            },
        );

        let state = TestState {
            simulate: true,
            memory: MemoryInfo {
                total: 16 * GIB,
                available: 8 * GIB,
            },
            swap: SwapInfo {
                total: 4 * GIB,
                used: GIB,
            },
            cpu: CpuIdentity {
                name: "Test CPU @ 3.00GHz".to_string(),
                model: "158".to_string(),
                family: "6".to_string(),
                vendor: "GenuineTest".to_string(),
                identifier: "Test Family 6 Model 158 Stepping 10".to_string(),
                is_64bit: true,
                serial_number: None,
                logical_cores: 8,
                physical_cores: 4,
            },
            load_average: LoadAverage {
                one: 0.5,
                five: 0.4,
                fifteen: 0.3,
            },
            uptime: 5 * 60 * 60,
            thread_count: 512,
            cpu_temperature: 45.0,
            cpu_voltage: 1.2,
            fan_speeds: vec![1200, 0],
            file_stores: vec![FileStore {
                name: "/dev/nvme0n1p2".to_string(),
                description: "Local Disk".to_string(),
                fs_type: "ext4".to_string(),
                mount_point: "/".to_string(),
                total_space: 500 * GIB,
                usable_space: 200 * GIB,
            }],
            network_interfaces: vec![
                NetworkInterface {
                    name: "lo".to_string(),
                    display_name: "lo".to_string(),
                    mac_address: "00:00:00:00:00:00".to_string(),
                    ipv4_addresses: vec!["127.0.0.1".to_string()],
                    ipv6_addresses: vec!["::1".to_string()],
                    ..NetworkInterface::default()
                },
                NetworkInterface {
                    name: "eth0".to_string(),
                    display_name: "eth0".to_string(),
                    mac_address: "52:54:00:12:34:56".to_string(),
                    ipv4_addresses: vec!["192.168.1.20".to_string()],
                    ipv6_addresses: vec!["fe80::5054:ff:fe12:3456".to_string()],
                    ..NetworkInterface::default()
                },
            ],
            displays: vec![Display {
                name: "card0-HDMI-A-1".to_string(),
                edid: sample_edid(),
            }],
            power_sources: vec![PowerSource {
                name: "BAT0".to_string(),
                remaining_capacity: 0.8,
                time_remaining: 5_400.0,
            }],
            disk_stores: vec![DiskStore {
                name: "nvme0n1".to_string(),
                model: "Test NVMe SSD 512GB".to_string(),
                serial: "TST0001".to_string(),
            }],
            processes,
            os: OsInfo {
                family: "Linux".to_string(),
                manufacturer: "GNU/Linux".to_string(),
                version: "test".to_string(),
            },
            ..TestState::default()
        };

        Self {
            state: Mutex::new(state),
        }
    }

    /// Direct access to the reported values
    pub fn state(&self) -> MutexGuard<'_, TestState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("Test provider mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Queue tick snapshots for successive `cpu_ticks` calls
    pub fn push_cpu_ticks(&self, ticks: impl IntoIterator<Item = CpuTicks>) {
        self.state().cpu_ticks.extend(ticks);
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Lock the state, failing if the provider was told to
    fn checked(&self) -> Result<MutexGuard<'_, TestState>> {
        let state = self.state();
        if state.failing {
            bail!("test provider is set to fail");
        }
        Ok(state)
    }
}

fn sample_edid() -> Vec<u8> {
    let mut edid = vec![0u8; 128];
    edid[..8].copy_from_slice(&[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]);
    edid[8] = 0x10;
    edid[9] = 0xac;
    edid[10] = 0xc3;
    edid[11] = 0xa0;
    edid[12..16].copy_from_slice(&[0x41, 0x30, 0x53, 0x4c]);
    edid[21] = 53;
    edid[22] = 30;
    edid
}

impl MetricsProvider for TestProvider {
    fn memory(&self) -> Result<MemoryInfo> {
        Ok(self.checked()?.memory)
    }

    fn swap(&self) -> Result<SwapInfo> {
        Ok(self.checked()?.swap)
    }

    fn cpu_identity(&self) -> Result<CpuIdentity> {
        Ok(self.checked()?.cpu.clone())
    }

    fn cpu_ticks(&self) -> Result<CpuTicks> {
        let mut state = self.checked()?;
        let ticks = match state.cpu_ticks.pop_front() {
            Some(ticks) => ticks,
            None if state.simulate => {
                let last = state.last_cpu_ticks;
                CpuTicks {
                    user: last.user + 35,
                    system: last.system + 10,
                    idle: last.idle + 155,
                    ..last
                }
            }
            None => state.last_cpu_ticks,
        };
        state.last_cpu_ticks = ticks;
        Ok(ticks)
    }

    fn load_average(&self) -> Result<LoadAverage> {
        Ok(self.checked()?.load_average)
    }

    fn uptime(&self) -> Result<u64> {
        Ok(self.checked()?.uptime)
    }

    fn thread_count(&self) -> Result<u32> {
        Ok(self.checked()?.thread_count)
    }

    fn cpu_temperature(&self) -> Result<f64> {
        Ok(self.checked()?.cpu_temperature)
    }

    fn cpu_voltage(&self) -> Result<f64> {
        Ok(self.checked()?.cpu_voltage)
    }

    fn fan_speeds(&self) -> Result<Vec<i32>> {
        Ok(self.checked()?.fan_speeds.clone())
    }

    fn file_stores(&self) -> Result<Vec<FileStore>> {
        let mut state = self.checked()?;
        state.calls.file_stores += 1;
        Ok(state.file_stores.clone())
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let mut state = self.checked()?;
        state.calls.network_interfaces += 1;
        Ok(state.network_interfaces.clone())
    }

    fn update_network_attributes(&self, interface: &mut NetworkInterface) -> Result<()> {
        let mut state = self.checked()?;
        state.calls.network_updates += 1;
        let simulate = state.simulate;
        if let Some(current) = state
            .network_interfaces
            .iter_mut()
            .find(|candidate| candidate.name == interface.name)
        {
            if simulate {
                current.packets_sent += 40;
                current.packets_received += 60;
                current.bytes_sent += 48_000;
                current.bytes_received += 90_000;
            }
            *interface = current.clone();
        }
        Ok(())
    }

    fn displays(&self) -> Result<Vec<Display>> {
        let mut state = self.checked()?;
        state.calls.displays += 1;
        Ok(state.displays.clone())
    }

    fn power_sources(&self) -> Result<Vec<PowerSource>> {
        let mut state = self.checked()?;
        state.calls.power_sources += 1;
        Ok(state.power_sources.clone())
    }

    fn disk_stores(&self) -> Result<Vec<DiskStore>> {
        let mut state = self.checked()?;
        state.calls.disk_stores += 1;
        Ok(state.disk_stores.clone())
    }

    fn process(&self, pid: i32) -> Result<Option<ProcessInfo>> {
        let mut state = self.checked()?;
        state.calls.process_lookups += 1;
        Ok(state.processes.get(&pid).cloned())
    }

    fn os_info(&self) -> Result<OsInfo> {
        Ok(self.checked()?.os.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerations_are_counted() {
        let provider = TestProvider::sample();
        provider.file_stores().unwrap();
        provider.file_stores().unwrap();
        provider.displays().unwrap();

        let calls = provider.calls();
        assert_eq!(calls.file_stores, 2);
        assert_eq!(calls.displays, 1);
        assert_eq!(calls.network_interfaces, 0);
    }

    #[test]
    fn test_failing_provider() {
        let provider = TestProvider::sample();
        provider.state().failing = true;
        assert!(provider.memory().is_err());
        assert!(provider.network_interfaces().is_err());
    }

    #[test]
    fn test_simulated_traffic_grows() {
        let provider = TestProvider::sample();
        let mut eth0 = provider.network_interfaces().unwrap().remove(1);
        provider.update_network_attributes(&mut eth0).unwrap();
        let first = eth0.packets_sent;
        provider.update_network_attributes(&mut eth0).unwrap();
        assert!(eth0.packets_sent > first);
    }
}
