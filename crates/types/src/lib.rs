//! rg-probe-types: Shared data types for rg-probe.
//!
//! This crate contains pure data types (topic descriptors, categories,
//! channels, value types) that are shared across all rg-probe crates.
//! Nothing in here touches the hardware.

pub mod category;
pub mod topic;
pub mod value;

pub use category::{Category, Channel};
pub use topic::{RefreshInterval, TimeUnit, TopicConfig};
pub use value::{MetricValue, ValueType};
