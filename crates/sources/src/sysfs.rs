//! Readers for `/sys`: hwmon fans and voltages, DRM connectors, power
//! supplies, block devices and DMI.

use once_cell::sync::Lazy;
use regex::Regex;
use rg_probe_core::{DiskStore, Display, PowerSource};
use std::path::{Path, PathBuf};

static FAN_INPUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^fan(\d+)_input$").expect("Invalid regex"));
static VOLTAGE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^in(\d+)_label$").expect("Invalid regex"));

/// Block devices that are not drives
const VIRTUAL_BLOCK_PREFIXES: &[&str] = &["loop", "ram", "zram"];

/// Location of the sys file system
#[derive(Debug, Clone)]
pub struct Sysfs {
    root: PathBuf,
}

impl Default for Sysfs {
    fn default() -> Self {
        Self::new("/sys")
    }
}

fn read_string(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}

fn read_i64(path: &Path) -> Option<i64> {
    read_string(path).and_then(|s| s.parse().ok())
}

/// Directory entries sorted by name, so indices are stable between enumerations
fn sorted_entries(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut entries: Vec<(String, PathBuf)> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| (entry.file_name().to_string_lossy().to_string(), entry.path()))
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries
}

/// Files of a hwmon directory whose name matches `pattern`, ordered by the captured channel number
fn numbered_files(dir: &Path, pattern: &Regex) -> Vec<(u32, PathBuf)> {
    let mut files: Vec<(u32, PathBuf)> = sorted_entries(dir)
        .into_iter()
        .filter_map(|(name, path)| {
            let number = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((number, path))
        })
        .collect();
    files.sort();
    files
}

/// Remaining battery time in seconds, negative when unknown
fn time_remaining(dir: &Path) -> f64 {
    let discharging = read_string(&dir.join("status")).as_deref() == Some("Discharging");
    if !discharging {
        return -1.0;
    }

    // Energy-based (µWh / µW) or charge-based (µAh / µA) reporting
    let pairs = [("energy_now", "power_now"), ("charge_now", "current_now")];
    for (level, rate) in pairs {
        if let (Some(level), Some(rate)) = (read_i64(&dir.join(level)), read_i64(&dir.join(rate))) {
            if rate > 0 {
                return level as f64 / rate as f64 * 3600.0;
            }
        }
    }
    -1.0
}

impl Sysfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn hwmon_dirs(&self) -> Vec<PathBuf> {
        sorted_entries(&self.root.join("class/hwmon"))
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// Every fan reading in RPM, idle fans included as 0
    pub fn fan_speeds(&self) -> Vec<i32> {
        self.hwmon_dirs()
            .iter()
            .flat_map(|dir| numbered_files(dir, &FAN_INPUT))
            .map(|(_, path)| {
                read_i64(&path)
                    .and_then(|rpm| i32::try_from(rpm).ok())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// CPU core voltage in volts from the first `Vcore`-labelled input, 0 when none exists
    pub fn cpu_voltage(&self) -> f64 {
        for dir in self.hwmon_dirs() {
            for (number, label_path) in numbered_files(&dir, &VOLTAGE_LABEL) {
                let is_core = read_string(&label_path)
                    .map(|label| label.to_lowercase().contains("vcore"))
                    .unwrap_or(false);
                if !is_core {
                    continue;
                }
                if let Some(millivolts) = read_i64(&dir.join(format!("in{}_input", number))) {
                    return millivolts as f64 / 1000.0;
                }
            }
        }
        0.0
    }

    /// Connectors that expose a non-empty EDID blob
    pub fn displays(&self) -> Vec<Display> {
        sorted_entries(&self.root.join("class/drm"))
            .into_iter()
            .filter_map(|(name, path)| {
                let edid = std::fs::read(path.join("edid")).ok()?;
                (!edid.is_empty()).then_some(Display { name, edid })
            })
            .collect()
    }

    pub fn power_sources(&self) -> Vec<PowerSource> {
        sorted_entries(&self.root.join("class/power_supply"))
            .into_iter()
            .filter(|(_, path)| {
                read_string(&path.join("type"))
                    .map(|kind| kind.eq_ignore_ascii_case("battery"))
                    .unwrap_or(false)
            })
            .map(|(name, path)| PowerSource {
                remaining_capacity: read_i64(&path.join("capacity"))
                    .map(|percent| percent as f64 / 100.0)
                    .unwrap_or(0.0),
                time_remaining: time_remaining(&path),
                name,
            })
            .collect()
    }

    pub fn disk_stores(&self) -> Vec<DiskStore> {
        sorted_entries(&self.root.join("block"))
            .into_iter()
            .filter(|(name, _)| {
                !VIRTUAL_BLOCK_PREFIXES
                    .iter()
                    .any(|prefix| name.starts_with(prefix))
            })
            .map(|(name, path)| {
                let device = path.join("device");
                DiskStore {
                    model: read_string(&device.join("model")).unwrap_or_default(),
                    serial: read_string(&device.join("serial"))
                        .or_else(|| read_string(&device.join("wwid")))
                        .unwrap_or_default(),
                    name,
                }
            })
            .collect()
    }

    /// Kernel interface index, used to order network interfaces
    pub fn interface_index(&self, name: &str) -> Option<i64> {
        read_i64(&self.root.join("class/net").join(name).join("ifindex"))
    }

    /// System serial number; usually readable by root only
    pub fn product_serial(&self) -> Option<String> {
        read_string(&self.root.join("class/dmi/id/product_serial")).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn sysfs() -> (TempDir, Sysfs) {
        let dir = tempfile::tempdir().unwrap();
        let sysfs = Sysfs::new(dir.path());
        (dir, sysfs)
    }

    #[test]
    fn test_fan_speeds_in_channel_order() {
        let (dir, sysfs) = sysfs();
        write(dir.path(), "class/hwmon/hwmon0/temp1_input", "45000\n");
        write(dir.path(), "class/hwmon/hwmon1/fan10_input", "300\n");
        write(dir.path(), "class/hwmon/hwmon1/fan2_input", "0\n");
        write(dir.path(), "class/hwmon/hwmon1/fan1_input", "1150\n");
        write(dir.path(), "class/hwmon/hwmon2/fan1_input", "garbage\n");

        assert_eq!(sysfs.fan_speeds(), vec![1150, 0, 300, 0]);
    }

    #[test]
    fn test_no_hwmon_means_no_fans() {
        let (_dir, sysfs) = sysfs();
        assert!(sysfs.fan_speeds().is_empty());
        assert_eq!(sysfs.cpu_voltage(), 0.0);
    }

    #[test]
    fn test_cpu_voltage_from_vcore_label() {
        let (dir, sysfs) = sysfs();
        write(dir.path(), "class/hwmon/hwmon3/in0_label", "+12V\n");
        write(dir.path(), "class/hwmon/hwmon3/in0_input", "12000\n");
        write(dir.path(), "class/hwmon/hwmon3/in1_label", "Vcore\n");
        write(dir.path(), "class/hwmon/hwmon3/in1_input", "1250\n");

        assert_eq!(sysfs.cpu_voltage(), 1.25);
    }

    #[test]
    fn test_displays_need_edid() {
        let (dir, sysfs) = sysfs();
        write(dir.path(), "class/drm/card0-HDMI-A-1/edid", "\u{0}\u{1}");
        write(dir.path(), "class/drm/card0-DP-1/edid", "");
        write(dir.path(), "class/drm/version", "drm 1.1.0\n");

        let displays = sysfs.displays();
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].name, "card0-HDMI-A-1");
        assert_eq!(displays[0].edid, vec![0, 1]);
    }

    #[test]
    fn test_power_sources_only_batteries() {
        let (dir, sysfs) = sysfs();
        write(dir.path(), "class/power_supply/AC/type", "Mains\n");
        write(dir.path(), "class/power_supply/BAT0/type", "Battery\n");
        write(dir.path(), "class/power_supply/BAT0/capacity", "75\n");
        write(dir.path(), "class/power_supply/BAT0/status", "Discharging\n");
        write(dir.path(), "class/power_supply/BAT0/energy_now", "30000000\n");
        write(dir.path(), "class/power_supply/BAT0/power_now", "10000000\n");
        write(dir.path(), "class/power_supply/BAT1/type", "Battery\n");
        write(dir.path(), "class/power_supply/BAT1/capacity", "100\n");
        write(dir.path(), "class/power_supply/BAT1/status", "Full\n");

        let batteries = sysfs.power_sources();
        assert_eq!(batteries.len(), 2);
        assert_eq!(batteries[0].name, "BAT0");
        assert_eq!(batteries[0].remaining_capacity, 0.75);
        assert_eq!(batteries[0].time_remaining, 10_800.0);
        assert_eq!(batteries[1].time_remaining, -1.0);
    }

    #[test]
    fn test_disk_stores_skip_virtual_devices() {
        let (dir, sysfs) = sysfs();
        write(dir.path(), "block/loop0/size", "0\n");
        write(dir.path(), "block/sda/device/model", "Samsung SSD 860  \n");
        write(dir.path(), "block/sda/device/serial", "S3Z9NB0K\n");
        write(dir.path(), "block/nvme0n1/device/model", "WD Blue SN570\n");
        write(dir.path(), "block/nvme0n1/device/wwid", "eui.e8238fa6bf530001\n");

        let disks = sysfs.disk_stores();
        let names: Vec<&str> = disks.iter().map(|disk| disk.name.as_str()).collect();
        assert_eq!(names, vec!["nvme0n1", "sda"]);
        assert_eq!(disks[0].serial, "eui.e8238fa6bf530001");
        assert_eq!(disks[1].model, "Samsung SSD 860");
        assert_eq!(disks[1].serial, "S3Z9NB0K");
    }

    #[test]
    fn test_product_serial() {
        let (dir, sysfs) = sysfs();
        assert_eq!(sysfs.product_serial(), None);
        write(dir.path(), "class/dmi/id/product_serial", "PF2ABCDE\n");
        assert_eq!(sysfs.product_serial().as_deref(), Some("PF2ABCDE"));
    }
}
