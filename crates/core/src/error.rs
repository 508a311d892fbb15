//! Error types for topic resolution and metric reads

use rg_probe_types::{Category, Channel};
use std::fmt;
use thiserror::Error;

/// Which device a lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKey {
    Index(usize),
    ProcessId(i32),
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::Index(index) => write!(f, "index {}", index),
            DeviceKey::ProcessId(pid) => write!(f, "pid {}", pid),
        }
    }
}

/// Failure of a single metric read
#[derive(Debug, Error)]
pub enum MetricError {
    /// Index or process id lookup missed; the read is skipped for this cycle
    #[error("{category} device with {key} not found")]
    DeviceNotFound { category: Category, key: DeviceKey },

    /// The platform provider call itself failed
    #[error("platform provider failed: {0:#}")]
    Provider(#[from] anyhow::Error),
}

impl MetricError {
    pub fn device_not_found(category: Category, index: usize) -> Self {
        MetricError::DeviceNotFound {
            category,
            key: DeviceKey::Index(index),
        }
    }

    pub fn process_not_found(pid: i32) -> Self {
        MetricError::DeviceNotFound {
            category: Category::Process,
            key: DeviceKey::ProcessId(pid),
        }
    }
}

/// Failure to resolve a topic's value type at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("topic with category \"{category}\" and channel \"{channel}\" not found")]
    UnresolvedType { category: Category, channel: Channel },

    #[error("attribute \"index\" is required for topic with category \"{category}\" and channel \"{channel}\"")]
    MissingIndex { category: Category, channel: Channel },
}

pub type MetricResult<T> = std::result::Result<T, MetricError>;
