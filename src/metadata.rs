//! End-of-export metadata: every topic's artifact index, optionally with the
//! other topics aligned to a primary one by nearest capture time.

use crate::config::MessageKind;
use crate::index::{IndexRecord, NearestCursor};
use crate::time::CaptureTime;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A finished topic, handed over by the dispatcher.
#[derive(Debug, Clone)]
pub struct TopicIndex {
    pub topic: String,
    pub kind: MessageKind,
    pub directory: PathBuf,
    pub records: Vec<IndexRecord>,
}

pub trait MetadataEmitter {
    fn emit(&mut self, topics: &[TopicIndex]) -> Result<()>;
}

/// Nearest record of one secondary topic for a primary record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMatch {
    pub path: PathBuf,
    pub local_index: u64,
    /// secondary minus primary capture time
    pub offset_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub stamp: CaptureTime,
    pub local_index: u64,
    pub path: PathBuf,
    pub matches: BTreeMap<String, FrameMatch>,
}

/// Aligns every other non-empty topic to `primary`.
///
/// Uses one forward-only cursor per secondary topic, so matches inherit the
/// cursor's unimodality assumption. `None` when `primary` is not among
/// `topics`.
pub fn correlate(topics: &[TopicIndex], primary: &str) -> Option<Vec<Frame>> {
    let reference = topics.iter().find(|t| t.topic == primary)?;
    let others: Vec<&TopicIndex> = topics
        .iter()
        .filter(|t| t.topic != primary && !t.records.is_empty())
        .collect();
    let mut cursors = vec![NearestCursor::new(); others.len()];

    let frames = reference
        .records
        .iter()
        .map(|rec| {
            let mut matches = BTreeMap::new();
            for (other, cursor) in others.iter().zip(cursors.iter_mut()) {
                if let Some(i) = cursor.find_nearest(&other.records, rec.capture_time) {
                    let hit = &other.records[i];
                    matches.insert(
                        other.topic.clone(),
                        FrameMatch {
                            path: hit.path.clone(),
                            local_index: hit.local_index,
                            offset_ns: hit.capture_time.as_nanos() - rec.capture_time.as_nanos(),
                        },
                    );
                }
            }
            Frame {
                stamp: rec.capture_time,
                local_index: rec.local_index,
                path: rec.path.clone(),
                matches,
            }
        })
        .collect();
    Some(frames)
}

#[derive(Debug, Serialize)]
struct TopicEntry<'a> {
    topic: &'a str,
    #[serde(rename = "type")]
    kind: MessageKind,
    directory: &'a Path,
    count: usize,
    files: &'a [IndexRecord],
}

#[derive(Debug, Serialize)]
struct MetadataDocument<'a> {
    bag: &'a str,
    topics: Vec<TopicEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<Vec<Frame>>,
}

/// Writes `metadata.json` into the export's output directory.
#[derive(Debug)]
pub struct JsonMetadataEmitter {
    path: PathBuf,
    bag_path: String,
    primary_topic: Option<String>,
}

impl JsonMetadataEmitter {
    pub const FILE_NAME: &'static str = "metadata.json";

    pub fn new(output_dir: &Path, bag_path: &str, primary_topic: Option<String>) -> Self {
        Self {
            path: output_dir.join(Self::FILE_NAME),
            bag_path: bag_path.to_string(),
            primary_topic,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataEmitter for JsonMetadataEmitter {
    fn emit(&mut self, topics: &[TopicIndex]) -> Result<()> {
        let frames = match self.primary_topic.as_deref() {
            Some(primary) => {
                let frames = correlate(topics, primary);
                if frames.is_none() {
                    tracing::warn!(%primary, "primary topic is not exported; skipping frame alignment");
                }
                frames
            }
            None => None,
        };

        let doc = MetadataDocument {
            bag: &self.bag_path,
            topics: topics
                .iter()
                .map(|t| TopicEntry {
                    topic: &t.topic,
                    kind: t.kind,
                    directory: &t.directory,
                    count: t.records.len(),
                    files: &t.records,
                })
                .collect(),
            primary_topic: frames.as_ref().and(self.primary_topic.as_deref()),
            frames,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(&self.path)
            .with_context(|| format!("failed to create metadata file: {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &doc)?;
        writer.flush()?;
        tracing::info!(path = %self.path.display(), "wrote metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str, times: &[(u64, i64)]) -> TopicIndex {
        TopicIndex {
            topic: name.to_string(),
            kind: MessageKind::Image,
            directory: PathBuf::from(name.trim_start_matches('/')),
            records: times
                .iter()
                .map(|&(idx, ns)| IndexRecord {
                    path: PathBuf::from(format!("{}/{}.png", name.trim_start_matches('/'), ns)),
                    capture_time: CaptureTime::from_nanos(ns),
                    local_index: idx,
                })
                .collect(),
        }
    }

    #[test]
    fn test_correlate_nearest() {
        let topics = vec![
            topic("/front", &[(0, 100), (1, 200), (2, 300)]),
            topic("/rear", &[(0, 95), (1, 190), (2, 205), (3, 310)]),
            topic("/empty", &[]),
        ];
        let frames = correlate(&topics, "/front").unwrap();
        assert_eq!(frames.len(), 3);

        let rear: Vec<u64> = frames.iter().map(|f| f.matches["/rear"].local_index).collect();
        assert_eq!(rear, vec![0, 2, 3]);
        assert_eq!(frames[1].matches["/rear"].offset_ns, 5);
        assert!(frames.iter().all(|f| !f.matches.contains_key("/empty")));
    }

    #[test]
    fn test_correlate_tolerates_gaps() {
        // /rear dropped local index 2
        let topics = vec![
            topic("/front", &[(0, 0), (1, 100), (2, 200), (3, 300)]),
            topic("/rear", &[(0, 2), (1, 101), (3, 299)]),
        ];
        let frames = correlate(&topics, "/front").unwrap();
        let rear: Vec<u64> = frames.iter().map(|f| f.matches["/rear"].local_index).collect();
        assert_eq!(rear, vec![0, 1, 1, 3]);
    }

    #[test]
    fn test_correlate_missing_primary() {
        let topics = vec![topic("/front", &[(0, 1)])];
        assert!(correlate(&topics, "/nope").is_none());
    }

    #[test]
    fn test_json_emitter_writes_document() {
        let tmp = tempfile::tempdir().unwrap();
        let topics = vec![
            topic("/front", &[(0, 100), (2, 300)]),
            topic("/rear", &[(0, 110), (1, 290)]),
        ];
        let mut emitter = JsonMetadataEmitter::new(tmp.path(), "run.bag", Some("/front".into()));
        emitter.emit(&topics).unwrap();

        let text = std::fs::read_to_string(emitter.path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["bag"], "run.bag");
        assert_eq!(doc["topics"][0]["count"], 2);
        assert_eq!(doc["topics"][0]["type"], "Image");
        assert_eq!(doc["topics"][0]["files"][1]["local_index"], 2);
        assert_eq!(doc["topics"][0]["files"][1]["capture_time"]["nanosec"], 300);
        assert_eq!(doc["primary_topic"], "/front");
        assert_eq!(doc["frames"][1]["matches"]["/rear"]["local_index"], 1);
    }

    #[test]
    fn test_json_emitter_without_primary() {
        let tmp = tempfile::tempdir().unwrap();
        let mut emitter = JsonMetadataEmitter::new(tmp.path(), "run.bag", None);
        emitter.emit(&[topic("/front", &[(0, 1)])]).unwrap();
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(emitter.path()).unwrap()).unwrap();
        assert!(doc.get("frames").is_none());
    }
}
