//! Export configuration (YAML) and the resolved per-topic settings.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "PointCloud2", alias = "PointCloud")]
    PointCloud,
    Image,
    CompressedImage,
    DepthImage,
    #[serde(rename = "IMU")]
    Imu,
    #[serde(rename = "GPS")]
    Gps,
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// ROS message type this kind decodes.
    pub fn ros_type(&self) -> &'static str {
        match self {
            MessageKind::PointCloud => "sensor_msgs/PointCloud2",
            MessageKind::Image | MessageKind::DepthImage => "sensor_msgs/Image",
            MessageKind::CompressedImage => "sensor_msgs/CompressedImage",
            MessageKind::Imu => "sensor_msgs/Imu",
            MessageKind::Gps => "sensor_msgs/NavSatFix",
            MessageKind::Unknown => "unknown",
        }
    }
}

/// Where a record's capture time comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampSource {
    /// `std_msgs/Header.stamp` of the message itself
    #[default]
    Header,
    /// receive time recorded in the bag
    Record,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataConfig {
    /// Topic the other streams are aligned against in `metadata.json`.
    #[serde(default)]
    pub primary_topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub encoding: String,
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u64,
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_sample_interval() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub bag_path: String,
    #[serde(default)]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub stamp_source: StampSource,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
}

/// Settings for one topic, resolved against the export's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub kind: MessageKind,
    /// Empty means "use the kind's default".
    pub encoding: String,
    pub sample_interval: u64,
    pub output_dir: PathBuf,
}

impl ExportConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Resolve every topic entry, validating names and sampling intervals.
    pub fn topic_configs(&self) -> Result<Vec<TopicConfig>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(self.topics.len());
        for entry in &self.topics {
            if entry.name.trim().is_empty() {
                bail!("topic name must not be empty");
            }
            if !seen.insert(entry.name.as_str()) {
                bail!("topic '{}' is configured more than once", entry.name);
            }
            if entry.sample_interval == 0 {
                bail!("topic '{}': sample_interval must be >= 1", entry.name);
            }
            let dir = match &entry.dir {
                Some(dir) => self.output_dir.join(dir),
                None => self.output_dir.join(topic_dir_name(&entry.name)),
            };
            out.push(TopicConfig {
                name: entry.name.clone(),
                kind: resolve_kind(entry.kind, &entry.encoding),
                encoding: entry.encoding.trim().to_string(),
                sample_interval: entry.sample_interval,
                output_dir: dir,
            });
        }
        Ok(out)
    }
}

/// Raw images carrying depth encodings go through the depth handler.
fn resolve_kind(kind: MessageKind, encoding: &str) -> MessageKind {
    match (kind, encoding.trim()) {
        (MessageKind::Image, "16UC1" | "32FC1") => MessageKind::DepthImage,
        (kind, _) => kind,
    }
}

/// `/sensor/camera/front` → `sensor_camera_front`
pub fn topic_dir_name(topic: &str) -> String {
    topic.trim_start_matches('/').replace('/', "_")
}
