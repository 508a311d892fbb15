//! Topic descriptors as they appear in the configuration file.

use crate::category::{Category, Channel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unit of a refresh interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_millis(&self, value: u64) -> u64 {
        let factor = match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        };
        value.saturating_mul(factor)
    }
}

/// How often a topic is re-read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshInterval {
    pub value: u64,
    pub unit: TimeUnit,
}

impl RefreshInterval {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    pub fn as_millis(&self) -> u64 {
        self.unit.to_millis(self.value)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

impl Default for RefreshInterval {
    fn default() -> Self {
        Self::new(default_refresh_interval_value(), TimeUnit::Seconds)
    }
}

fn default_refresh_interval_value() -> u64 {
    10
}

/// One configured measurement point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Publish destination
    pub path: String,
    pub category: Category,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i32>,
    #[serde(default = "default_refresh_interval_value")]
    pub refresh_interval_value: u64,
    #[serde(default)]
    pub refresh_interval_unit: TimeUnit,
}

impl TopicConfig {
    pub fn new(path: impl Into<String>, category: Category, channel: Channel) -> Self {
        Self {
            path: path.into(),
            category,
            channel,
            index: None,
            process_id: None,
            refresh_interval_value: default_refresh_interval_value(),
            refresh_interval_unit: TimeUnit::Seconds,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_process_id(mut self, process_id: i32) -> Self {
        self.process_id = Some(process_id);
        self
    }

    pub fn with_refresh_interval(mut self, interval: RefreshInterval) -> Self {
        self.refresh_interval_value = interval.value;
        self.refresh_interval_unit = interval.unit;
        self
    }

    pub fn refresh_interval(&self) -> RefreshInterval {
        RefreshInterval::new(self.refresh_interval_value, self.refresh_interval_unit)
    }
}
