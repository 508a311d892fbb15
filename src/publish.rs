//! Publishers that ship values out of the process

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use log::{error, info};
use rg_probe_core::{ChannelPublisher, MetricValue, Publication, Publisher, Topic};
use std::io::Write;
use std::thread::JoinHandle;

/// Logs each value as `path = value`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, topic: &Topic, value: &MetricValue) {
        info!("{} = {}", topic.path(), value);
    }
}

/// Writes one JSON object per value, one per line, from a dedicated thread
#[derive(Debug, Clone)]
pub struct JsonLinesPublisher {
    channel: ChannelPublisher,
}

/// Handle on the writer thread behind a [`JsonLinesPublisher`]
#[derive(Debug)]
pub struct JsonLinesWriter {
    handle: JoinHandle<()>,
}

impl JsonLinesPublisher {
    /// Start the writer thread. It runs until every clone of the returned
    /// publisher has been dropped.
    pub fn spawn<W: Write + Send + 'static>(writer: W) -> Result<(Self, JsonLinesWriter)> {
        let (channel, receiver) = ChannelPublisher::new();
        let handle = std::thread::Builder::new()
            .name("json-lines-writer".to_string())
            .spawn(move || write_lines(receiver, writer))
            .context("Failed to start JSON writer thread")?;

        Ok((Self { channel }, JsonLinesWriter { handle }))
    }
}

impl Publisher for JsonLinesPublisher {
    fn publish(&self, topic: &Topic, value: &MetricValue) {
        self.channel.publish(topic, value);
    }
}

impl JsonLinesWriter {
    /// Wait for every queued line to be written
    pub fn wait(self) {
        if self.handle.join().is_err() {
            error!("JSON writer thread panicked");
        }
    }
}

fn write_lines<W: Write>(receiver: Receiver<Publication>, mut writer: W) {
    for publication in receiver {
        let result = serde_json::to_writer(&mut writer, &publication)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(writer))
            .and_then(|_| writer.flush());
        if let Err(e) = result {
            error!("Failed to write value for {}: {}", publication.path, e);
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rg_probe_core::{Category, Channel, TopicConfig};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_lines_output() {
        let buffer = SharedBuffer::default();
        let (publisher, writer) = JsonLinesPublisher::spawn(buffer.clone()).unwrap();

        let (topic, _) = rg_probe_core::Topic::resolved(TopicConfig::new(
            "host/memory/total",
            Category::Memory,
            Channel::Total,
        ));
        topic.record(MetricValue::Long(16_384), Utc::now());
        publisher.publish(&topic, &MetricValue::Long(16_384));
        publisher.publish(&topic, &MetricValue::Long(16_000));

        drop(publisher);
        writer.wait();

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["path"], "host/memory/total");
        assert_eq!(lines[0]["category"], "MEMORY");
        assert_eq!(lines[0]["channel"], "TOTAL");
        assert_eq!(lines[0]["type"], "LONG");
        assert_eq!(lines[0]["value"], 16_384);
        assert!(lines[0]["observed_at"].is_string());
        assert_eq!(lines[1]["value"], 16_000);
    }
}
