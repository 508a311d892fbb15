//! Device registry: time-bounded caches over the expensive device enumerations
//!
//! Each category keeps its own list, fetch timestamp and mutex. A list is
//! replaced wholesale once `now - fetched_at >= ttl`, where both `now` and
//! `ttl` come from the caller. The check, the provider call and the store
//! all happen inside the category's critical section.

use crate::error::{MetricError, MetricResult};
use crate::provider::{DiskStore, Display, FileStore, MetricsProvider, NetworkInterface, PowerSource};
use anyhow::Result;
use log::debug;
use rg_probe_types::Category;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

fn is_stale(fetched_at: i64, now_ms: i64, ttl_ms: i64) -> bool {
    now_ms.saturating_sub(fetched_at) >= ttl_ms
}

fn lock_recovering<'a, T>(mutex: &'a Mutex<T>, category: Category) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("{} device cache mutex was poisoned, recovering", category);
        poisoned.into_inner()
    })
}

struct CachedList<T> {
    items: Vec<T>,
    fetched_at: i64,
}

/// Lazily fetched, TTL-bounded list of one kind of device
struct DeviceList<T> {
    category: Category,
    cache: Mutex<Option<CachedList<T>>>,
}

impl<T: Clone> DeviceList<T> {
    fn new(category: Category) -> Self {
        Self {
            category,
            cache: Mutex::new(None),
        }
    }

    fn resolve(
        &self,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
        fetch: impl FnOnce() -> Result<Vec<T>>,
    ) -> MetricResult<T> {
        let mut cache = lock_recovering(&self.cache, self.category);

        let stale = cache
            .as_ref()
            .map_or(true, |cached| is_stale(cached.fetched_at, now_ms, ttl_ms));
        if stale {
            let items = fetch()?;
            debug!("Refreshed {} device list: {} entries", self.category, items.len());
            *cache = Some(CachedList {
                items,
                fetched_at: now_ms,
            });
        }

        cache
            .as_ref()
            .and_then(|cached| cached.items.get(index))
            .cloned()
            .ok_or_else(|| MetricError::device_not_found(self.category, index))
    }
}

struct CachedNetworks {
    interfaces: Vec<NetworkInterface>,
    /// Interfaces whose attributes were already refreshed in this window
    resolved: HashMap<usize, NetworkInterface>,
    fetched_at: i64,
}

/// Network interfaces additionally memoize each refreshed entry by index
struct NetworkList {
    cache: Mutex<Option<CachedNetworks>>,
}

impl NetworkList {
    fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }

    fn resolve(
        &self,
        provider: &dyn MetricsProvider,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
    ) -> MetricResult<NetworkInterface> {
        let mut cache = lock_recovering(&self.cache, Category::Network);

        let stale = cache
            .as_ref()
            .map_or(true, |cached| is_stale(cached.fetched_at, now_ms, ttl_ms));
        if stale {
            let interfaces = provider.network_interfaces()?;
            debug!("Refreshed NETWORK device list: {} entries", interfaces.len());
            *cache = Some(CachedNetworks {
                interfaces,
                resolved: HashMap::new(),
                fetched_at: now_ms,
            });
        }

        let Some(cached) = cache.as_mut() else {
            return Err(MetricError::device_not_found(Category::Network, index));
        };

        if let Some(interface) = cached.resolved.get(&index) {
            return Ok(interface.clone());
        }

        let mut interface = cached
            .interfaces
            .get(index)
            .cloned()
            .ok_or_else(|| MetricError::device_not_found(Category::Network, index))?;
        provider.update_network_attributes(&mut interface)?;
        cached.resolved.insert(index, interface.clone());

        Ok(interface)
    }
}

/// Per-category device caches
pub struct DeviceRegistry {
    file_stores: DeviceList<FileStore>,
    networks: NetworkList,
    displays: DeviceList<Display>,
    power_sources: DeviceList<PowerSource>,
    disk_stores: DeviceList<DiskStore>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            file_stores: DeviceList::new(Category::Storage),
            networks: NetworkList::new(),
            displays: DeviceList::new(Category::Display),
            power_sources: DeviceList::new(Category::Battery),
            disk_stores: DeviceList::new(Category::Drive),
        }
    }

    pub fn file_store(
        &self,
        provider: &dyn MetricsProvider,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
    ) -> MetricResult<FileStore> {
        self.file_stores
            .resolve(index, now_ms, ttl_ms, || provider.file_stores())
    }

    pub fn network(
        &self,
        provider: &dyn MetricsProvider,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
    ) -> MetricResult<NetworkInterface> {
        self.networks.resolve(provider, index, now_ms, ttl_ms)
    }

    pub fn display(
        &self,
        provider: &dyn MetricsProvider,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
    ) -> MetricResult<Display> {
        self.displays
            .resolve(index, now_ms, ttl_ms, || provider.displays())
    }

    pub fn power_source(
        &self,
        provider: &dyn MetricsProvider,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
    ) -> MetricResult<PowerSource> {
        self.power_sources
            .resolve(index, now_ms, ttl_ms, || provider.power_sources())
    }

    pub fn disk_store(
        &self,
        provider: &dyn MetricsProvider,
        index: usize,
        now_ms: i64,
        ttl_ms: i64,
    ) -> MetricResult<DiskStore> {
        self.disk_stores
            .resolve(index, now_ms, ttl_ms, || provider.disk_stores())
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
