//! bag2export - Export ROS1 .bag topics into per-topic files
//!
//! Every configured topic gets a handler that decodes each message, writes
//! one artifact named after its capture time and records it in the topic's
//! index. At the end of the pass the indexes are written to `metadata.json`,
//! optionally aligned to a primary topic by nearest capture time.
//!
//! # Features
//!
//! - **Images**: `sensor_msgs/Image`, `sensor_msgs/CompressedImage` → PNG
//! - **Depth**: `sensor_msgs/Image` with `16UC1`/`32FC1` → 16-bit PNG
//! - **PointClouds**: `sensor_msgs/PointCloud2` → binary PCD
//! - **IMU**: `sensor_msgs/Imu` → JSON
//! - **GPS**: `sensor_msgs/NavSatFix` → JSON
//! - **Sampling**: keep every n-th message per topic
//!
//! # Example
//!
//! ```rust,no_run
//! use bag2export::{ExportConfig, ExportOptions, export_bag};
//!
//! let options = ExportOptions {
//!     config: ExportConfig::from_path("export.yaml")?,
//!     dry_run: false,
//!     show_progress: true,
//! };
//!
//! export_bag(&options)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod bag;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod handlers;
pub mod index;
pub mod metadata;
pub mod schema;
pub mod time;
pub mod wire;

// Re-export main types for convenience
pub use config::{ExportConfig, MessageKind, StampSource, TopicConfig};
pub use dispatcher::{Dispatch, Dispatcher, LogRecord, TopicSummary};
pub use export::{ExportOptions, export_bag};
pub use index::{IndexRecord, NearestCursor};
pub use metadata::{JsonMetadataEmitter, MetadataEmitter, TopicIndex};
pub use time::CaptureTime;
