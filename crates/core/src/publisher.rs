//! Outbound seam: where polled values go

use crate::topic::Topic;
use chrono::{DateTime, Utc};
use crossbeam::channel::{unbounded, Receiver, Sender};
use rg_probe_types::{Category, Channel, MetricValue, ValueType};
use serde::{Deserialize, Serialize};

/// Receives every successfully polled value. Absent values and failed reads
/// are never published.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &Topic, value: &MetricValue);
}

/// Self-contained record of one published value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub path: String,
    pub category: Category,
    pub channel: Channel,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: MetricValue,
    pub observed_at: DateTime<Utc>,
}

impl Publication {
    pub fn new(topic: &Topic, value: &MetricValue) -> Self {
        let observed_at = topic
            .last_observation()
            .map(|observation| observation.observed_at)
            .unwrap_or_else(Utc::now);

        Self {
            path: topic.path().to_string(),
            category: topic.category(),
            channel: topic.channel(),
            value_type: topic.value_type().unwrap_or_else(|| value.value_type()),
            value: value.clone(),
            observed_at,
        }
    }
}

/// Forwards publications over a crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: Sender<Publication>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, Receiver<Publication>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, topic: &Topic, value: &MetricValue) {
        if self.sender.send(Publication::new(topic, value)).is_err() {
            log::debug!("Dropping value for {}: receiver is gone", topic.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_probe_types::TopicConfig;

    #[test]
    fn test_channel_publisher_forwards_records() {
        let (publisher, receiver) = ChannelPublisher::new();
        let (topic, _) = Topic::resolved(TopicConfig::new(
            "/memory/total",
            Category::Memory,
            Channel::Total,
        ));
        let at = Utc::now();
        topic.record(MetricValue::Long(16_384), at);

        publisher.publish(&topic, &MetricValue::Long(16_384));

        let publication = receiver.try_recv().unwrap();
        assert_eq!(publication.path, "/memory/total");
        assert_eq!(publication.value_type, ValueType::Long);
        assert_eq!(publication.value, MetricValue::Long(16_384));
        assert_eq!(publication.observed_at, at);
    }

    #[test]
    fn test_publication_json_shape() {
        let (topic, _) = Topic::resolved(TopicConfig::new(
            "/cpu/load",
            Category::Cpu,
            Channel::Load,
        ));
        let publication = Publication::new(&topic, &MetricValue::Double(12.5));
        let json = serde_json::to_value(&publication).unwrap();

        assert_eq!(json["category"], "CPU");
        assert_eq!(json["channel"], "LOAD");
        assert_eq!(json["type"], "DOUBLE");
        assert_eq!(json["value"], 12.5);
    }

    #[test]
    fn test_publish_after_receiver_dropped_is_silent() {
        let (publisher, receiver) = ChannelPublisher::new();
        drop(receiver);
        let topic = Topic::new(TopicConfig::new("/x", Category::Cpu, Channel::Load));
        publisher.publish(&topic, &MetricValue::Double(1.0));
    }
}
