//! Shared temperature sensor cache
//!
//! One `sysinfo::Components` instance is discovered on first use and shared
//! by every temperature read, so sensor discovery happens once per process.

use once_cell::sync::Lazy;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::Components;

/// Minimum interval between sensor refreshes
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

struct SharedSensors {
    components: Components,
    last_refresh: Instant,
}

impl SharedSensors {
    fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
            last_refresh: Instant::now(),
        }
    }

    fn refresh_if_needed(&mut self) {
        if self.last_refresh.elapsed() >= MIN_REFRESH_INTERVAL {
            self.components.refresh();
            self.last_refresh = Instant::now();
        }
    }
}

static SHARED_COMPONENTS: Lazy<Mutex<SharedSensors>> = Lazy::new(|| {
    let sensors = SharedSensors::new();
    log::info!(
        "Shared temperature sensors initialized: {} components",
        sensors.components.len()
    );
    Mutex::new(sensors)
});

/// Whether a sensor label belongs to the CPU package or its cores
pub fn is_cpu_sensor(label: &str) -> bool {
    let label = label.to_lowercase();
    label.contains("cpu")
        || label.contains("package")
        || label.contains("tctl")
        || label.contains("tdie")
        || label.contains("coretemp")
        || label.starts_with("k10temp")
        || label.contains("processor")
}

/// Hottest CPU sensor reading in °C (refreshes if needed)
pub fn cpu_temperature() -> Option<f32> {
    let mut sensors = SHARED_COMPONENTS.lock().unwrap_or_else(|poisoned| {
        log::warn!("Shared sensors mutex was poisoned, recovering");
        poisoned.into_inner()
    });
    sensors.refresh_if_needed();
    sensors
        .components
        .iter()
        .filter(|component| is_cpu_sensor(component.label()))
        .map(|component| component.temperature())
        .filter(|temperature| temperature.is_finite())
        .reduce(f32::max)
}

/// Force sensor discovery (call once at startup)
pub fn initialize() {
    let _ = &*SHARED_COMPONENTS;
}
