//! Poll driver for scheduling topic reads

use crate::config::PollSettings;
use chrono::Utc;
use log::{debug, error, trace};
use rg_probe_core::{MetricService, PollOutcome, Topic};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Tracks poll timing for a topic
struct TopicSchedule {
    topic: Arc<Topic>,
    interval: Duration,
    last_poll: Instant,
}

impl TopicSchedule {
    fn refresh_ms(&self) -> i64 {
        i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Polls every resolved topic at its own refresh interval
pub struct PollDriver {
    service: Arc<MetricService>,
    schedule: Mutex<Vec<TopicSchedule>>,
    workers: Arc<Semaphore>,
    base_interval: Duration,
}

impl PollDriver {
    /// Schedule every topic that passed resolution. Topics count as polled
    /// now, since the startup snapshot has just read them.
    pub fn new(service: Arc<MetricService>, settings: &PollSettings) -> Self {
        let now = Instant::now();
        let schedule = service
            .active_topics()
            .map(|topic| TopicSchedule {
                topic: topic.clone(),
                interval: topic.refresh_interval().as_duration(),
                last_poll: now,
            })
            .collect::<Vec<_>>();
        debug!("Scheduled {} topics", schedule.len());

        Self {
            service,
            schedule: Mutex::new(schedule),
            workers: Arc::new(Semaphore::new(settings.workers.max(1))),
            base_interval: settings.base_interval(),
        }
    }

    /// Number of scheduled topics
    pub fn len(&self) -> usize {
        self.lock_schedule().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_schedule(&self) -> std::sync::MutexGuard<'_, Vec<TopicSchedule>> {
        self.schedule.lock().unwrap_or_else(|poisoned| {
            log::warn!("Poll schedule mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Start the poll loop
    ///
    /// This runs indefinitely, polling each topic at its configured interval.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.base_interval);

        loop {
            interval.tick().await;

            let start = Instant::now();
            let polled = self.poll_due().await;
            if polled > 0 {
                trace!("Poll cycle of {} topics took {:?}", polled, start.elapsed());
            }
        }
    }

    /// Poll all topics that are due, returning how many were polled
    pub async fn poll_due(&self) -> usize {
        let now = Instant::now();

        // Collect due topics and mark them polled
        let due: Vec<(Arc<Topic>, i64)> = {
            let mut schedule = self.lock_schedule();
            schedule
                .iter_mut()
                .filter(|state| now.duration_since(state.last_poll) >= state.interval)
                .map(|state| {
                    state.last_poll = now;
                    (state.topic.clone(), state.refresh_ms())
                })
                .collect()
        };

        if due.is_empty() {
            return 0;
        }

        let now_ms = Utc::now().timestamp_millis();
        let mut tasks = Vec::with_capacity(due.len());

        for (topic, refresh_ms) in due {
            let permit = match self.workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker pool closed: {}", e);
                    break;
                }
            };
            let service = self.service.clone();
            let path = topic.path().to_string();
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                service.poll_one(&topic, now_ms, refresh_ms)
            });
            tasks.push((path, task));
        }

        let polled = tasks.len();

        // Wait for all polls to complete
        for (path, task) in tasks {
            match task.await {
                Ok(PollOutcome::Published) | Ok(PollOutcome::Absent) => {}
                Ok(outcome) => trace!("Poll of {} ended with {:?}", path, outcome),
                Err(e) => error!("Poll task failed for {}: {}", path, e),
            }
        }

        polled
    }
}
