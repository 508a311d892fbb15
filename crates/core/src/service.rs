//! Metric service: resolves topics once, then answers polls

use crate::constants::INITIAL_REFRESH_INTERVAL;
use crate::cpu_load::CpuLoadState;
use crate::error::{MetricError, MetricResult};
use crate::producer::{self, ReadContext};
use crate::provider::MetricsProvider;
use crate::publisher::Publisher;
use crate::registry::DeviceRegistry;
use crate::topic::Topic;
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use rg_probe_types::{MetricValue, TopicConfig};
use std::sync::Arc;

/// What happened to one topic in one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Published,
    /// Nothing to report this cycle (sensor idle, no process id, ...)
    Absent,
    /// The topic failed resolution at startup and is never read
    Unresolved,
    DeviceNotFound,
    Failed,
}

/// Owns the provider, the device caches and the configured topics
pub struct MetricService {
    provider: Arc<dyn MetricsProvider>,
    publisher: Arc<dyn Publisher>,
    registry: DeviceRegistry,
    cpu_load: CpuLoadState,
    topics: Vec<Arc<Topic>>,
}

impl MetricService {
    /// Create the service and run the startup resolution pass.
    ///
    /// Topics whose category/channel pair is unknown (or that lack a
    /// required index) are logged once here and kept out of every poll.
    /// The CPU tick snapshot taken here is the baseline of the first load read.
    pub fn new(
        configs: Vec<TopicConfig>,
        provider: Arc<dyn MetricsProvider>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let topics: Vec<Arc<Topic>> = configs
            .into_iter()
            .map(|config| {
                let (topic, result) = Topic::resolved(config);
                match result {
                    Ok(value_type) => debug!(
                        "Resolved topic {} ({} {}) as {}",
                        topic.path(),
                        topic.category(),
                        topic.channel(),
                        value_type
                    ),
                    Err(e) => error!("{} (path {})", e, topic.path()),
                }
                Arc::new(topic)
            })
            .collect();

        let active = topics.iter().filter(|topic| topic.is_resolved()).count();
        info!("Resolved {} of {} topics", active, topics.len());

        // CPU load is measured from here on, not from boot
        let cpu_load = match provider.cpu_ticks() {
            Ok(ticks) => CpuLoadState::with_baseline(ticks),
            Err(e) => {
                warn!("Failed to take initial CPU tick snapshot: {:#}", e);
                CpuLoadState::new()
            }
        };

        Self {
            provider,
            publisher,
            registry: DeviceRegistry::new(),
            cpu_load,
            topics,
        }
    }

    /// Every configured topic, resolved or not
    pub fn topics(&self) -> &[Arc<Topic>] {
        &self.topics
    }

    /// Topics that passed resolution
    pub fn active_topics(&self) -> impl Iterator<Item = &Arc<Topic>> {
        self.topics.iter().filter(|topic| topic.is_resolved())
    }

    pub fn provider(&self) -> &dyn MetricsProvider {
        self.provider.as_ref()
    }

    /// Forget previous values and poll everything once with a long cache TTL
    pub fn on_init(&self) {
        let ttl_ms = i64::try_from(INITIAL_REFRESH_INTERVAL.as_millis()).unwrap_or(i64::MAX);
        self.on_init_with_ttl(ttl_ms);
    }

    pub fn on_init_with_ttl(&self, ttl_ms: i64) {
        self.on_init_at(Utc::now().timestamp_millis(), ttl_ms);
    }

    pub fn on_init_at(&self, now_ms: i64, ttl_ms: i64) {
        for topic in &self.topics {
            topic.reset();
        }
        for topic in self.active_topics() {
            self.poll_one(topic, now_ms, ttl_ms);
        }
    }

    /// Read the current value of a topic without publishing it.
    ///
    /// `refresh_ms` doubles as the time-to-live of any enumeration cache the
    /// read goes through. Unresolved topics read as absent.
    pub fn read(
        &self,
        topic: &Topic,
        now_ms: i64,
        refresh_ms: i64,
    ) -> MetricResult<Option<MetricValue>> {
        if !topic.is_resolved() {
            return Ok(None);
        }
        let Some(producer) = producer::producer(topic.category(), topic.channel()) else {
            return Ok(None);
        };

        let ctx = ReadContext {
            provider: self.provider.as_ref(),
            registry: &self.registry,
            cpu_load: &self.cpu_load,
            index: topic.index(),
            process_id: topic.process_id(),
            now_ms,
            ttl_ms: refresh_ms,
        };
        producer.read(&ctx)
    }

    /// Poll one topic and publish its value if there is one. Never fails:
    /// lookup misses and provider errors are logged and the cycle is skipped.
    pub fn poll_one(&self, topic: &Topic, now_ms: i64, refresh_ms: i64) -> PollOutcome {
        let Some(value_type) = topic.value_type() else {
            return PollOutcome::Unresolved;
        };

        match self.read(topic, now_ms, refresh_ms) {
            Ok(Some(value)) => {
                if value.value_type() != value_type {
                    warn!(
                        "Topic {} produced {} but resolved as {}",
                        topic.path(),
                        value.value_type(),
                        value_type
                    );
                }
                topic.record(value.clone(), observed_at(now_ms));
                self.publisher.publish(topic, &value);
                PollOutcome::Published
            }
            Ok(None) => {
                trace!("No value for {} this cycle", topic.path());
                PollOutcome::Absent
            }
            Err(e) => {
                error!("{}", failure_message(topic, &e));
                match e {
                    MetricError::DeviceNotFound { .. } => PollOutcome::DeviceNotFound,
                    MetricError::Provider(_) => PollOutcome::Failed,
                }
            }
        }
    }
}

/// Log line for a failed poll
fn failure_message(topic: &Topic, e: &MetricError) -> String {
    let action = match e {
        MetricError::DeviceNotFound { .. } => "Lookup failed for",
        MetricError::Provider(_) => "Failed to read",
    };
    format!(
        "{} topic with category \"{}\", channel \"{}\" and path \"{}\": {}",
        action,
        topic.category(),
        topic.channel(),
        topic.path(),
        e
    )
}

fn observed_at(now_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceKey;
    use crate::provider::{CpuTicks, MemoryInfo};
    use crate::publisher::ChannelPublisher;
    use crate::test_provider::TestProvider;
    use crate::publisher::Publication;
    use crossbeam::channel::Receiver;
    use rg_probe_types::{Category, Channel, ValueType};

    fn service(
        configs: Vec<TopicConfig>,
    ) -> (MetricService, Arc<TestProvider>, Receiver<Publication>) {
        let provider = Arc::new(TestProvider::sample());
        let (publisher, receiver) = ChannelPublisher::new();
        let service = MetricService::new(configs, provider.clone(), Arc::new(publisher));
        (service, provider, receiver)
    }

    #[test]
    fn test_unresolved_topics_are_excluded() {
        let (service, _, receiver) = service(vec![
            TopicConfig::new("/mem", Category::Memory, Channel::Total),
            TopicConfig::new("/bad", Category::Memory, Channel::MacAddress),
            TopicConfig::new("/fan", Category::Sensors, Channel::FanSpeed),
        ]);

        assert_eq!(service.topics().len(), 3);
        assert_eq!(service.active_topics().count(), 1);

        let bad = &service.topics()[1];
        assert_eq!(service.poll_one(bad, 0, 1_000), PollOutcome::Unresolved);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_missing_network_device_is_not_published() {
        let (service, provider, receiver) = service(vec![TopicConfig::new(
            "/net/1/packets_sent",
            Category::Network,
            Channel::PacketsSent,
        )
        .with_index(1)]);
        provider.state().network_interfaces.truncate(1);
        let topic = &service.topics()[0];

        assert_eq!(service.poll_one(topic, 0, 1_000), PollOutcome::DeviceNotFound);
        assert!(receiver.try_recv().is_err());
        assert!(topic.last_observation().is_none());

        let err = service.read(topic, 0, 1_000).unwrap_err();
        assert!(matches!(
            err,
            MetricError::DeviceNotFound {
                category: Category::Network,
                key: DeviceKey::Index(1),
            }
        ));
        let message = failure_message(topic, &err);
        assert!(message.starts_with("Lookup failed for topic with category \"NETWORK\""));
        assert!(message.contains("NETWORK device with index 1 not found"));
    }

    #[test]
    fn test_first_cpu_load_is_measured_since_service_start() {
        let provider = Arc::new(TestProvider::sample());
        let ticks = |busy, idle| CpuTicks {
            user: busy,
            idle,
            ..CpuTicks::default()
        };
        provider.push_cpu_ticks([ticks(900, 100), ticks(910, 190)]);
        let (publisher, receiver) = ChannelPublisher::new();
        let service = MetricService::new(
            vec![TopicConfig::new("/cpu/load", Category::Cpu, Channel::Load)],
            provider.clone(),
            Arc::new(publisher),
        );

        assert_eq!(service.poll_one(&service.topics()[0], 0, 1_000), PollOutcome::Published);
        match receiver.try_recv().unwrap().value {
            MetricValue::Double(load) => assert!((load - 10.0).abs() < 1e-9),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_cpu_load_without_startup_snapshot_falls_back_to_boot() {
        let provider = Arc::new(TestProvider::sample());
        provider.state().failing = true;
        let (publisher, receiver) = ChannelPublisher::new();
        let service = MetricService::new(
            vec![TopicConfig::new("/cpu/load", Category::Cpu, Channel::Load)],
            provider.clone(),
            Arc::new(publisher),
        );

        provider.state().failing = false;
        provider.push_cpu_ticks([CpuTicks {
            user: 30,
            idle: 70,
            ..CpuTicks::default()
        }]);
        service.poll_one(&service.topics()[0], 0, 1_000);
        match receiver.try_recv().unwrap().value {
            MetricValue::Double(load) => assert!((load - 30.0).abs() < 1e-9),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_memory_percent_is_published_as_double() {
        let (service, provider, receiver) = service(vec![TopicConfig::new(
            "/mem/available",
            Category::Memory,
            Channel::AvailablePercent,
        )]);
        provider.state().memory = MemoryInfo {
            total: 16_000,
            available: 8_000,
        };
        let topic = &service.topics()[0];

        assert_eq!(service.poll_one(topic, 1_000, 1_000), PollOutcome::Published);
        let publication = receiver.try_recv().unwrap();
        assert_eq!(publication.value, MetricValue::Double(50.0));
        assert_eq!(publication.value_type, ValueType::Double);
        assert_eq!(publication.observed_at.timestamp_millis(), 1_000);
    }

    #[test]
    fn test_process_without_id_is_absent() {
        let (service, _, receiver) = service(vec![TopicConfig::new(
            "/proc/name",
            Category::Process,
            Channel::Name,
        )]);
        let topic = &service.topics()[0];

        assert_eq!(service.poll_one(topic, 0, 1_000), PollOutcome::Absent);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_idle_fan_is_absent() {
        let (service, _, receiver) = service(vec![
            TopicConfig::new("/fan/0", Category::Sensors, Channel::FanSpeed).with_index(0),
            TopicConfig::new("/fan/1", Category::Sensors, Channel::FanSpeed).with_index(1),
        ]);

        assert_eq!(service.poll_one(&service.topics()[0], 0, 1_000), PollOutcome::Published);
        assert_eq!(service.poll_one(&service.topics()[1], 0, 1_000), PollOutcome::Absent);
        assert_eq!(receiver.try_recv().unwrap().value, MetricValue::Integer(1200));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_storage_is_published_in_megabytes() {
        let (service, provider, receiver) = service(vec![TopicConfig::new(
            "/disk/free",
            Category::Storage,
            Channel::Available,
        )]);
        provider.state().file_stores[0].usable_space = 500_000_000;

        service.poll_one(&service.topics()[0], 0, 1_000);
        assert_eq!(receiver.try_recv().unwrap().value, MetricValue::Long(477));
    }

    #[test]
    fn test_provider_failure_is_contained() {
        let (service, provider, receiver) = service(vec![TopicConfig::new(
            "/mem",
            Category::Memory,
            Channel::Total,
        )]);
        provider.state().failing = true;

        assert_eq!(service.poll_one(&service.topics()[0], 0, 1_000), PollOutcome::Failed);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_topics_share_the_enumeration_cache() {
        let (service, provider, _receiver) = service(vec![
            TopicConfig::new("/disk/name", Category::Storage, Channel::Name),
            TopicConfig::new("/disk/type", Category::Storage, Channel::Type),
            TopicConfig::new("/disk/total", Category::Storage, Channel::Total),
        ]);

        for topic in service.topics() {
            service.poll_one(topic, 0, 10_000);
        }
        assert_eq!(provider.calls().file_stores, 1);

        for topic in service.topics() {
            service.poll_one(topic, 10_000, 10_000);
        }
        assert_eq!(provider.calls().file_stores, 2);
    }

    #[test]
    fn test_on_init_publishes_everything_once() {
        let (service, provider, receiver) = service(vec![
            TopicConfig::new("/mem", Category::Memory, Channel::Total),
            TopicConfig::new("/bat", Category::Battery, Channel::Name),
            TopicConfig::new("/bad", Category::Drive, Channel::Load),
        ]);

        service.on_init_at(0, 3_600_000);
        let published: Vec<_> = receiver.try_iter().collect();
        assert_eq!(published.len(), 2);
        assert_eq!(provider.calls().power_sources, 1);

        // The initial pass caches enumerations for an hour
        service.poll_one(&service.topics()[1], 30 * 60 * 1000, 3_600_000);
        assert_eq!(provider.calls().power_sources, 1);
    }

    #[test]
    fn test_on_init_resets_last_values() {
        let (service, _provider, _receiver) = service(vec![TopicConfig::new(
            "/proc/name",
            Category::Process,
            Channel::Name,
        )]);
        let topic = &service.topics()[0];
        topic.record(MetricValue::from("stale"), Utc::now());

        service.on_init();
        assert!(topic.last_observation().is_none());
    }
}
