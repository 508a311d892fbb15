//! Linux metrics provider built on sysinfo plus direct `/proc` and `/sys` reads

use crate::procfs::{self, Procfs};
use crate::shared_sensors;
use crate::sysfs::Sysfs;
use anyhow::Result;
use once_cell::sync::{Lazy, OnceCell};
use rg_probe_core::{
    CpuIdentity, CpuTicks, DiskStore, Display, FileStore, LoadAverage, MemoryInfo,
    MetricsProvider, NetworkInterface, OsInfo, PowerSource, ProcessInfo, SwapInfo,
};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{
    CpuRefreshKind, Disks, NetworkData, Networks, Pid, ProcessesToUpdate, RefreshKind, System,
};

/// Shared System instance for memory and swap reads
static SHARED_MEMORY_SYSTEM: Lazy<Mutex<System>> = Lazy::new(|| {
    log::info!("Creating shared memory sysinfo::System instance");
    Mutex::new(System::new())
});

/// Shared System instance for single-process lookups
static SHARED_PROCESS_SYSTEM: Lazy<Mutex<System>> = Lazy::new(|| {
    log::info!("Creating shared process sysinfo::System instance");
    Mutex::new(System::new())
});

/// Shared Networks instance for traffic counter refreshes
static SHARED_NETWORKS: Lazy<Mutex<Networks>> = Lazy::new(|| {
    log::info!("Creating shared Networks sysinfo instance");
    Mutex::new(Networks::new_with_refreshed_list())
});

const NETWORK_FILE_SYSTEMS: &[&str] = &["nfs", "nfs4", "cifs", "smbfs", "sshfs", "fuse.sshfs"];

/// Provider for the local Linux host
#[derive(Debug, Default)]
pub struct SysinfoProvider {
    procfs: Procfs,
    sysfs: Sysfs,
    cpu_identity: OnceCell<CpuIdentity>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider reading `/proc` and `/sys` from other locations
    pub fn with_roots(procfs: Procfs, sysfs: Sysfs) -> Self {
        Self {
            procfs,
            sysfs,
            cpu_identity: OnceCell::new(),
        }
    }

    fn read_cpu_identity(&self) -> Result<CpuIdentity> {
        let info = self.procfs.cpu_info()?;
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
        let first = system.cpus().first();

        let name = first
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| info.model_name.clone());
        let vendor = first
            .map(|cpu| cpu.vendor_id().to_string())
            .filter(|vendor| !vendor.is_empty())
            .unwrap_or_else(|| info.vendor.clone());

        Ok(CpuIdentity {
            name,
            identifier: info.identifier(),
            model: info.model.clone(),
            family: info.family.clone(),
            vendor,
            is_64bit: info.is_64bit,
            serial_number: self.sysfs.product_serial(),
            logical_cores: info.logical_cores.max(system.cpus().len()),
            physical_cores: info.physical_cores,
        })
    }
}

fn lock_memory_system() -> MutexGuard<'static, System> {
    SHARED_MEMORY_SYSTEM.lock().unwrap_or_else(|poisoned| {
        log::warn!("Shared memory system mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn lock_process_system() -> MutexGuard<'static, System> {
    SHARED_PROCESS_SYSTEM.lock().unwrap_or_else(|poisoned| {
        log::warn!("Shared process system mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn apply_counters(interface: &mut NetworkInterface, data: &NetworkData) {
    interface.packets_sent = data.total_packets_transmitted();
    interface.packets_received = data.total_packets_received();
    interface.bytes_sent = data.total_transmitted();
    interface.bytes_received = data.total_received();
}

/// Fields of `/etc/os-release`
pub fn parse_os_release(content: &str) -> OsInfo {
    let values: BTreeMap<&str, String> = content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches('"').to_string()))
        .collect();

    OsInfo {
        family: values
            .get("NAME")
            .cloned()
            .unwrap_or_else(|| "Linux".to_string()),
        manufacturer: "GNU/Linux".to_string(),
        version: values
            .get("VERSION")
            .or_else(|| values.get("VERSION_ID"))
            .or_else(|| values.get("BUILD_ID"))
            .cloned()
            .unwrap_or_default(),
    }
}

fn describe_file_system(fs_type: &str, removable: bool) -> &'static str {
    if NETWORK_FILE_SYSTEMS.contains(&fs_type) {
        "Network Drive"
    } else if removable {
        "Removable Disk"
    } else {
        "Local Disk"
    }
}

impl MetricsProvider for SysinfoProvider {
    fn memory(&self) -> Result<MemoryInfo> {
        let mut system = lock_memory_system();
        system.refresh_memory();
        Ok(MemoryInfo {
            total: system.total_memory(),
            available: system.available_memory(),
        })
    }

    fn swap(&self) -> Result<SwapInfo> {
        let mut system = lock_memory_system();
        system.refresh_memory();
        Ok(SwapInfo {
            total: system.total_swap(),
            used: system.used_swap(),
        })
    }

    fn cpu_identity(&self) -> Result<CpuIdentity> {
        self.cpu_identity
            .get_or_try_init(|| self.read_cpu_identity())
            .cloned()
    }

    fn cpu_ticks(&self) -> Result<CpuTicks> {
        self.procfs.cpu_ticks()
    }

    fn load_average(&self) -> Result<LoadAverage> {
        let load = System::load_average();
        Ok(LoadAverage {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    }

    fn uptime(&self) -> Result<u64> {
        Ok(System::uptime())
    }

    fn thread_count(&self) -> Result<u32> {
        self.procfs.thread_count()
    }

    fn cpu_temperature(&self) -> Result<f64> {
        Ok(shared_sensors::cpu_temperature()
            .map(f64::from)
            .unwrap_or(0.0))
    }

    fn cpu_voltage(&self) -> Result<f64> {
        Ok(self.sysfs.cpu_voltage())
    }

    fn fan_speeds(&self) -> Result<Vec<i32>> {
        Ok(self.sysfs.fan_speeds())
    }

    fn file_stores(&self) -> Result<Vec<FileStore>> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .iter()
            .map(|disk| {
                let fs_type = disk.file_system().to_string_lossy().to_string();
                FileStore {
                    name: disk.name().to_string_lossy().to_string(),
                    description: describe_file_system(&fs_type, disk.is_removable()).to_string(),
                    mount_point: disk.mount_point().to_string_lossy().to_string(),
                    total_space: disk.total_space(),
                    usable_space: disk.available_space(),
                    fs_type,
                }
            })
            .collect())
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>> {
        let networks = Networks::new_with_refreshed_list();
        let mut ipv4 = self.procfs.ipv4_addresses();
        let mut ipv6 = self.procfs.ipv6_addresses();

        let mut interfaces: Vec<(i64, NetworkInterface)> = networks
            .iter()
            .map(|(name, data)| {
                let mut interface = NetworkInterface {
                    name: name.clone(),
                    display_name: name.clone(),
                    mac_address: data.mac_address().to_string(),
                    ipv4_addresses: ipv4.remove(name).unwrap_or_default(),
                    ipv6_addresses: ipv6.remove(name).unwrap_or_default(),
                    ..NetworkInterface::default()
                };
                apply_counters(&mut interface, data);
                let order = self.sysfs.interface_index(name).unwrap_or(i64::MAX);
                (order, interface)
            })
            .collect();

        interfaces.sort_by(|(a_order, a), (b_order, b)| {
            a_order.cmp(b_order).then_with(|| a.name.cmp(&b.name))
        });
        Ok(interfaces.into_iter().map(|(_, interface)| interface).collect())
    }

    fn update_network_attributes(&self, interface: &mut NetworkInterface) -> Result<()> {
        let mut networks = SHARED_NETWORKS.lock().unwrap_or_else(|poisoned| {
            log::warn!("Shared networks mutex was poisoned, recovering");
            poisoned.into_inner()
        });
        networks.refresh();

        if !networks.contains_key(&interface.name) {
            // Interface appeared after the shared list was built
            networks.refresh_list();
        }

        match networks.get(&interface.name) {
            Some(data) => apply_counters(interface, data),
            None => log::debug!("Interface {} is gone, keeping last counters", interface.name),
        }
        Ok(())
    }

    fn displays(&self) -> Result<Vec<Display>> {
        Ok(self.sysfs.displays())
    }

    fn power_sources(&self) -> Result<Vec<PowerSource>> {
        Ok(self.sysfs.power_sources())
    }

    fn disk_stores(&self) -> Result<Vec<DiskStore>> {
        Ok(self.sysfs.disk_stores())
    }

    fn process(&self, pid: i32) -> Result<Option<ProcessInfo>> {
        let Ok(raw_pid) = u32::try_from(pid) else {
            return Ok(None);
        };
        let sys_pid = Pid::from_u32(raw_pid);

        let mut system = lock_process_system();
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));
        let Some(process) = system.process(sys_pid) else {
            return Ok(None);
        };

        // sysinfo has no kernel/user split or thread count
        let Some(stat) = self.procfs.process_stat(raw_pid)? else {
            log::debug!("Process {} exited during lookup", pid);
            return Ok(None);
        };
        let ticks_per_sec = procfs::clock_ticks_per_sec();

        Ok(Some(ProcessInfo {
            pid,
            name: OsStr::new(process.name()).to_string_lossy().into_owned(),
            // Executable links of other users' processes are not readable
            path: process
                .exe()
                .map(|exe| exe.to_string_lossy().into_owned())
                .unwrap_or_default(),
            kernel_time: stat.kernel_ms(ticks_per_sec),
            user_time: stat.user_ms(ticks_per_sec),
            up_time: process.run_time().saturating_mul(1000),
            resident_set_size: process.memory(),
            thread_count: stat.threads,
        }))
    }

    fn os_info(&self) -> Result<OsInfo> {
        let content = std::fs::read_to_string("/etc/os-release")
            .or_else(|_| std::fs::read_to_string("/usr/lib/os-release"))
            .unwrap_or_default();
        Ok(parse_os_release(&content))
    }
}
