//! ROS1 `.bag` files as the export's log source.

use crate::config::StampSource;
use crate::dispatcher::LogRecord;
use crate::time::CaptureTime;
use crate::wire::peek_stamp;
use anyhow::{Context, Result};
use rosbag::{ChunkRecord, MessageRecord, RosBag};
use std::collections::BTreeMap;

fn open(path: &str) -> Result<RosBag> {
    RosBag::new(path).with_context(|| format!("failed to open bag: {}", path))
}

/// conn id → (topic, type)
fn read_connections(bag: &RosBag) -> Result<BTreeMap<u32, (String, String)>> {
    let mut connections = BTreeMap::new();
    for record in bag.chunk_records() {
        let record = record?;
        if let ChunkRecord::Chunk(chunk) = record {
            for msg in chunk.messages() {
                let msg = msg?;
                if let MessageRecord::Connection(conn) = msg {
                    connections.insert(conn.id, (conn.topic.to_string(), conn.tp.to_string()));
                }
            }
        }
    }
    Ok(connections)
}

/// Capture time of a message according to `source`.
pub fn capture_time(source: StampSource, payload: &[u8], record_time_ns: u64) -> CaptureTime {
    let record_time = CaptureTime::from_nanos(record_time_ns as i64);
    match source {
        StampSource::Record => record_time,
        StampSource::Header => peek_stamp(payload).unwrap_or(record_time),
    }
}

/// Visits every message of a known connection in file order.
fn walk<F>(path: &str, mut f: F) -> Result<u64>
where
    F: FnMut(&str, &str, &[u8], u64) -> Result<()>,
{
    let bag = open(path)?;
    let connections = read_connections(&bag)?;

    let mut total = 0u64;
    for record in bag.chunk_records() {
        let record = record.with_context(|| format!("failed to read chunk in {}", path))?;
        if let ChunkRecord::Chunk(chunk) = record {
            for msg in chunk.messages() {
                if let MessageRecord::MessageData(msg_data) = msg? {
                    let Some((topic, tp)) = connections.get(&msg_data.conn_id) else {
                        tracing::debug!(conn = msg_data.conn_id, "message for unknown connection");
                        continue;
                    };
                    total += 1;
                    f(topic, tp, msg_data.data, msg_data.time)?;
                }
            }
        }
    }
    Ok(total)
}

/// Calls `f` for every message in file order, stopping at the first error.
/// Returns the number of messages read.
pub fn for_each_record<F>(path: &str, stamp_source: StampSource, mut f: F) -> Result<u64>
where
    F: FnMut(LogRecord<'_>) -> Result<()>,
{
    walk(path, |topic, _, payload, time| {
        f(LogRecord {
            topic,
            payload,
            capture_time: capture_time(stamp_source, payload, time),
        })
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicStat {
    pub ty: String,
    pub count: u64,
    pub first_ns: u64,
    pub last_ns: u64,
}

/// Per-topic message type, count and time span (record times).
pub fn topic_stats(path: &str) -> Result<BTreeMap<String, TopicStat>> {
    let mut stats: BTreeMap<String, TopicStat> = BTreeMap::new();
    walk(path, |topic, tp, _, time| {
        let entry = stats.entry(topic.to_string()).or_insert_with(|| TopicStat {
            ty: tp.to_string(),
            count: 0,
            first_ns: time,
            last_ns: time,
        });
        entry.count += 1;
        entry.first_ns = entry.first_ns.min(time);
        entry.last_ns = entry.last_ns.max(time);
        Ok(())
    })?;
    Ok(stats)
}

pub fn inspect_bag(path: &str) -> Result<()> {
    let stats = topic_stats(path)?;

    let start_ns = stats.values().map(|s| s.first_ns).min().unwrap_or(0);
    let end_ns = stats.values().map(|s| s.last_ns).max().unwrap_or(0);
    let total: u64 = stats.values().map(|s| s.count).sum();
    let rel = |ns: u64| (ns - start_ns) as f64 / 1_000_000_000.0;

    println!("Bag: {}", path);
    println!(
        "Start (s): {:.6}, End (s): {:.6}, Duration (s): {:.6}, Total messages: {}\n",
        start_ns as f64 / 1_000_000_000.0,
        end_ns as f64 / 1_000_000_000.0,
        rel(end_ns),
        total
    );

    println!("{:<35} {:<35} {:>7} {:>10} {:>10}", "Topic", "Type", "Count", "Start(s)", "End(s)");
    println!("{}", "-".repeat(97));
    for (topic, st) in &stats {
        println!(
            "{:<35} {:<35} {:>7} {:>10.6} {:>10.6}",
            topic,
            st.ty,
            st.count,
            rel(st.first_ns),
            rel(st.last_ns)
        );
    }

    Ok(())
}
