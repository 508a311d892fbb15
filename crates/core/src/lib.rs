//! rg-probe-core: metric resolution and caching engine.
//!
//! Topics name a measurement by category and channel. At startup each topic
//! is resolved against the producer table; afterwards the [`MetricService`]
//! reads values through a [`MetricsProvider`], caching expensive device
//! enumerations in the [`DeviceRegistry`], and hands every value to a
//! [`Publisher`].

pub mod constants;
pub mod convert;
pub mod cpu_load;
pub mod edid;
mod error;
pub mod producer;
mod provider;
mod publisher;
mod registry;
mod service;
pub mod test_provider;
mod topic;

pub use error::{DeviceKey, MetricError, MetricResult, ResolveError};
pub use provider::{
    CpuIdentity, CpuTicks, DiskStore, Display, FileStore, LoadAverage, MemoryInfo,
    MetricsProvider, NetworkInterface, OsInfo, PowerSource, ProcessInfo, SwapInfo,
};
pub use publisher::{ChannelPublisher, Publication, Publisher};
pub use registry::DeviceRegistry;
pub use service::{MetricService, PollOutcome};
pub use test_provider::TestProvider;
pub use topic::{Observation, Topic};

// Re-export the shared vocabulary so downstream crates need only this one
pub use rg_probe_types::{
    Category, Channel, MetricValue, RefreshInterval, TimeUnit, TopicConfig, ValueType,
};
