//! Routes log records to their topic's handler, applying per-topic sampling.

use crate::config::TopicConfig;
use crate::handlers::Handler;
use crate::index::IndexRecord;
use crate::metadata::{MetadataEmitter, TopicIndex};
use crate::time::CaptureTime;
use anyhow::Result;
use std::collections::HashMap;

/// One message pulled from the log, in file order.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub capture_time: CaptureTime,
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No handler is configured for the topic.
    UnknownTopic,
    /// Dropped by the topic's sample interval.
    Sampled,
    /// Handed to the handler (which may still drop it).
    Processed,
    /// Would have been processed, but this is a dry run.
    DryRun,
}

/// Per-topic counters reported at the end of an export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSummary {
    pub topic: String,
    pub received: u64,
    pub dispatched: u64,
    pub sampled_out: u64,
    pub written: u64,
}

impl TopicSummary {
    /// Dispatched messages that produced no artifact.
    pub fn dropped(&self) -> u64 {
        self.dispatched.saturating_sub(self.written)
    }
}

#[derive(Debug)]
struct TopicSlot {
    config: TopicConfig,
    handler: Handler,
    /// Local message counter: every received message, sampled or not.
    counter: u64,
    dispatched: u64,
}

/// Exclusive owner of every handler for the lifetime of one export.
#[derive(Debug)]
pub struct Dispatcher {
    slots: Vec<TopicSlot>,
    by_topic: HashMap<String, usize>,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(topics: &[TopicConfig]) -> Self {
        let mut slots = Vec::with_capacity(topics.len());
        let mut by_topic = HashMap::new();

        for topic in topics {
            let Some(handler) = Handler::from_config(topic) else {
                tracing::warn!(topic = %topic.name, "no handler for this message type; topic will be ignored");
                continue;
            };
            let mut config = topic.clone();
            if config.sample_interval == 0 {
                tracing::warn!(topic = %topic.name, "sample interval 0; keeping every message");
                config.sample_interval = 1;
            }
            tracing::info!(
                topic = %topic.name,
                kind = ?handler.kind(),
                every = config.sample_interval,
                dir = %topic.output_dir.display(),
                "registered handler"
            );
            by_topic.insert(topic.name.clone(), slots.len());
            slots.push(TopicSlot {
                config,
                handler,
                counter: 0,
                dispatched: 0,
            });
        }

        Self {
            slots,
            by_topic,
            dry_run: false,
        }
    }

    /// Route and sample as usual, but never call into the handlers.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.config.name.as_str())
    }

    pub fn handles(&self, topic: &str) -> bool {
        self.by_topic.contains_key(topic)
    }

    pub fn records(&self, topic: &str) -> Option<&[IndexRecord]> {
        self.slot(topic).map(|s| s.handler.records())
    }

    /// Current value of a topic's local message counter.
    pub fn counter(&self, topic: &str) -> Option<u64> {
        self.slot(topic).map(|s| s.counter)
    }

    fn slot(&self, topic: &str) -> Option<&TopicSlot> {
        self.by_topic.get(topic).map(|&i| &self.slots[i])
    }

    pub fn dispatch(&mut self, record: LogRecord<'_>) -> Dispatch {
        let Some(&i) = self.by_topic.get(record.topic) else {
            return Dispatch::UnknownTopic;
        };
        let slot = &mut self.slots[i];

        let n = slot.counter;
        slot.counter += 1;
        if n % slot.config.sample_interval != 0 {
            return Dispatch::Sampled;
        }

        slot.dispatched += 1;
        if self.dry_run {
            return Dispatch::DryRun;
        }
        slot.handler.process(record.payload, record.topic, record.capture_time, n);
        Dispatch::Processed
    }

    /// Counters for every topic, in configuration order.
    pub fn summary(&self) -> Vec<TopicSummary> {
        self.slots
            .iter()
            .map(|s| TopicSummary {
                topic: s.config.name.clone(),
                received: s.counter,
                dispatched: s.dispatched,
                sampled_out: s.counter - s.dispatched,
                written: s.handler.records().len() as u64,
            })
            .collect()
    }

    /// Hands every topic's index to `emitter` and releases the handlers.
    pub fn finish(self, emitter: &mut dyn MetadataEmitter) -> Result<Vec<TopicSummary>> {
        let summary = self.summary();
        let topics: Vec<TopicIndex> = self
            .slots
            .into_iter()
            .map(|slot| TopicIndex {
                topic: slot.config.name,
                kind: slot.handler.kind(),
                directory: slot.config.output_dir,
                records: slot.handler.into_records(),
            })
            .collect();
        emitter.emit(&topics)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageKind;
    use crate::wire::testing::PayloadBuilder;
    use std::path::Path;

    fn gps_payload(sec: u32) -> Vec<u8> {
        let mut b = PayloadBuilder::new()
            .header(sec, 0, "gps")
            .u8(0)
            .u16(1)
            .f64(1.0)
            .f64(2.0)
            .f64(3.0);
        for _ in 0..9 {
            b = b.f64(0.0);
        }
        b.u8(0).build()
    }

    fn topic(name: &str, kind: MessageKind, every: u64, dir: &Path) -> TopicConfig {
        TopicConfig {
            name: name.to_string(),
            kind,
            encoding: String::new(),
            sample_interval: every,
            output_dir: dir.join(name.trim_start_matches('/')),
        }
    }

    struct Collect(Vec<TopicIndex>);

    impl MetadataEmitter for Collect {
        fn emit(&mut self, topics: &[TopicIndex]) -> Result<()> {
            self.0 = topics.to_vec();
            Ok(())
        }
    }

    #[test]
    fn test_sampling_counts_every_message() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(&[topic("/gps", MessageKind::Gps, 3, tmp.path())]);

        let mut outcomes = Vec::new();
        for sec in 0..7 {
            let payload = gps_payload(sec);
            outcomes.push(dispatcher.dispatch(LogRecord {
                topic: "/gps",
                payload: &payload,
                capture_time: CaptureTime::new(sec as i64, 0),
            }));
        }

        assert_eq!(
            outcomes,
            vec![
                Dispatch::Processed,
                Dispatch::Sampled,
                Dispatch::Sampled,
                Dispatch::Processed,
                Dispatch::Sampled,
                Dispatch::Sampled,
                Dispatch::Processed,
            ]
        );
        assert_eq!(dispatcher.counter("/gps"), Some(7));
        let indices: Vec<u64> = dispatcher.records("/gps").unwrap().iter().map(|r| r.local_index).collect();
        assert_eq!(indices, vec![0, 3, 6]);
    }

    #[test]
    fn test_zero_interval_keeps_every_message() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(&[topic("/gps", MessageKind::Gps, 0, tmp.path())]);
        for sec in 0..3u32 {
            let payload = gps_payload(sec);
            let outcome = dispatcher.dispatch(LogRecord {
                topic: "/gps",
                payload: &payload,
                capture_time: CaptureTime::new(sec as i64, 0),
            });
            assert_eq!(outcome, Dispatch::Processed);
        }
        assert_eq!(dispatcher.records("/gps").unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_topic_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(&[
            topic("/gps", MessageKind::Gps, 1, tmp.path()),
            topic("/odom", MessageKind::Unknown, 1, tmp.path()),
        ]);
        assert!(!dispatcher.handles("/odom"));
        assert_eq!(dispatcher.topics().collect::<Vec<_>>(), vec!["/gps"]);

        let outcome = dispatcher.dispatch(LogRecord {
            topic: "/odom",
            payload: &[1, 2, 3],
            capture_time: CaptureTime::new(1, 0),
        });
        assert_eq!(outcome, Dispatch::UnknownTopic);
        assert_eq!(dispatcher.counter("/gps"), Some(0));
    }

    #[test]
    fn test_dropped_message_still_consumes_index() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(&[topic("/gps", MessageKind::Gps, 1, tmp.path())]);

        for sec in 0..4u32 {
            let mut payload = gps_payload(sec);
            if sec == 2 {
                payload.truncate(10);
            }
            dispatcher.dispatch(LogRecord {
                topic: "/gps",
                payload: &payload,
                capture_time: CaptureTime::new(sec as i64, 0),
            });
        }

        let indices: Vec<u64> = dispatcher.records("/gps").unwrap().iter().map(|r| r.local_index).collect();
        assert_eq!(indices, vec![0, 1, 3]);

        let summary = dispatcher.summary();
        assert_eq!(summary[0].dispatched, 4);
        assert_eq!(summary[0].written, 3);
        assert_eq!(summary[0].dropped(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(&[topic("/gps", MessageKind::Gps, 2, tmp.path())]).with_dry_run(true);
        for sec in 0..4u32 {
            let payload = gps_payload(sec);
            dispatcher.dispatch(LogRecord {
                topic: "/gps",
                payload: &payload,
                capture_time: CaptureTime::new(sec as i64, 0),
            });
        }
        let summary = dispatcher.summary();
        assert_eq!(summary[0].dispatched, 2);
        assert_eq!(summary[0].sampled_out, 2);
        assert_eq!(summary[0].written, 0);
        assert!(!tmp.path().join("gps").exists());
    }

    #[test]
    fn test_finish_hands_over_every_topic() {
        let tmp = tempfile::tempdir().unwrap();
        let mut dispatcher = Dispatcher::new(&[
            topic("/gps", MessageKind::Gps, 1, tmp.path()),
            topic("/imu", MessageKind::Imu, 1, tmp.path()),
        ]);
        let payload = gps_payload(1);
        dispatcher.dispatch(LogRecord {
            topic: "/gps",
            payload: &payload,
            capture_time: CaptureTime::new(1, 0),
        });

        let mut emitter = Collect(Vec::new());
        let summary = dispatcher.finish(&mut emitter).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(emitter.0.len(), 2);
        assert_eq!(emitter.0[0].topic, "/gps");
        assert_eq!(emitter.0[0].kind, MessageKind::Gps);
        assert_eq!(emitter.0[0].records.len(), 1);
        assert!(emitter.0[1].records.is_empty());
    }
}
