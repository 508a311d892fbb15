//! Runtime topic: a configured measurement plus its resolved type and last value

use crate::error::ResolveError;
use crate::producer;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use rg_probe_types::{Category, Channel, MetricValue, RefreshInterval, TopicConfig, ValueType};
use std::sync::Arc;

/// A value published for a topic and when it was observed
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub value: MetricValue,
    pub observed_at: DateTime<Utc>,
}

/// One configured measurement.
///
/// Identity (path, category, channel, index, process id) is fixed once the
/// startup resolution pass has run; only the last observation changes
/// afterwards, and that is swapped atomically so concurrent polls and
/// readers never see a torn value.
#[derive(Debug)]
pub struct Topic {
    path: String,
    category: Category,
    channel: Channel,
    index: Option<usize>,
    process_id: Option<i32>,
    refresh_interval: RefreshInterval,
    value_type: Option<ValueType>,
    last: ArcSwapOption<Observation>,
}

impl Topic {
    pub fn new(config: TopicConfig) -> Self {
        let refresh_interval = config.refresh_interval();
        Self {
            path: config.path,
            category: config.category,
            channel: config.channel,
            index: config.index,
            process_id: config.process_id,
            refresh_interval,
            value_type: None,
            last: ArcSwapOption::empty(),
        }
    }

    /// Build a topic and run type resolution on it
    pub fn resolved(config: TopicConfig) -> (Self, Result<ValueType, ResolveError>) {
        let mut topic = Self::new(config);
        let result = topic.resolve();
        (topic, result)
    }

    /// Default the index of indexed categories to 0 and look up the value type.
    ///
    /// The index default applies whether or not the pair turns out to be valid.
    pub fn resolve(&mut self) -> Result<ValueType, ResolveError> {
        if self.category.requires_index() && self.index.is_none() {
            self.index = Some(0);
        }

        let result = producer::resolve_type(self.category, self.channel, self.index);
        self.value_type = result.as_ref().ok().copied();
        result
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn process_id(&self) -> Option<i32> {
        self.process_id
    }

    pub fn refresh_interval(&self) -> RefreshInterval {
        self.refresh_interval
    }

    /// `None` until resolution succeeded; unresolved topics are never polled
    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    pub fn is_resolved(&self) -> bool {
        self.value_type.is_some()
    }

    pub fn last_observation(&self) -> Option<Arc<Observation>> {
        self.last.load_full()
    }

    pub fn record(&self, value: MetricValue, observed_at: DateTime<Utc>) {
        self.last.store(Some(Arc::new(Observation { value, observed_at })));
    }

    /// Forget the last observation (used on (re)initialization)
    pub fn reset(&self) {
        self.last.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_category_defaults_to_first_device() {
        let (topic, result) = Topic::resolved(TopicConfig::new(
            "/net/name",
            Category::Network,
            Channel::NetworkName,
        ));
        assert_eq!(result, Ok(ValueType::String));
        assert_eq!(topic.index(), Some(0));
    }

    #[test]
    fn test_index_defaults_even_when_unresolved() {
        let (topic, result) =
            Topic::resolved(TopicConfig::new("/bad", Category::Storage, Channel::Load));
        assert!(result.is_err());
        assert_eq!(topic.index(), Some(0));
        assert!(!topic.is_resolved());
    }

    #[test]
    fn test_configured_index_is_kept() {
        let (topic, _) = Topic::resolved(
            TopicConfig::new("/disk/2", Category::Drive, Channel::Model).with_index(2),
        );
        assert_eq!(topic.index(), Some(2));
    }

    #[test]
    fn test_unindexed_category_keeps_no_index() {
        let (topic, result) =
            Topic::resolved(TopicConfig::new("/mem", Category::Memory, Channel::Total));
        assert_eq!(result, Ok(ValueType::Long));
        assert_eq!(topic.index(), None);
    }

    #[test]
    fn test_sensors_are_not_defaulted() {
        let (topic, result) =
            Topic::resolved(TopicConfig::new("/fan", Category::Sensors, Channel::FanSpeed));
        assert!(matches!(result, Err(ResolveError::MissingIndex { .. })));
        assert_eq!(topic.index(), None);
        assert_eq!(topic.value_type(), None);
    }

    #[test]
    fn test_record_and_reset() {
        let topic = Topic::new(TopicConfig::new("/cpu", Category::Cpu, Channel::Load));
        assert!(topic.last_observation().is_none());

        let now = Utc::now();
        topic.record(MetricValue::Double(12.5), now);
        let last = topic.last_observation().unwrap();
        assert_eq!(last.value, MetricValue::Double(12.5));
        assert_eq!(last.observed_at, now);

        topic.reset();
        assert!(topic.last_observation().is_none());
    }
}
