//! Per-topic message handlers: decode → normalize → write → index.
//!
//! A handler never fails outward. Whatever goes wrong with one message is
//! logged and leaves a gap in that topic's index; the export carries on.

pub mod depth;
pub mod gps;
pub mod image;
pub mod imu;
pub mod pixels;
pub mod pointcloud;

use crate::config::{MessageKind, TopicConfig};
use crate::error::HandlerError;
use crate::index::IndexRecord;
use crate::time::CaptureTime;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub use depth::DepthImageHandler;
pub use gps::GpsHandler;
pub use image::{ImageHandler, ImageSource};
pub use imu::ImuHandler;
pub use pointcloud::PointCloudHandler;

/// State every handler carries: where artifacts go and what was written.
#[derive(Debug)]
pub struct HandlerCore {
    output_dir: PathBuf,
    records: Vec<IndexRecord>,
    dir_ready: bool,
}

impl HandlerCore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            records: Vec::new(),
            dir_ready: false,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<sec>-<nanosec:09>.<ext>`
    pub fn artifact_path(&self, time: CaptureTime, ext: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", time.file_stem(), ext))
    }

    /// Creates the output directory the first time it is needed. Safe to call
    /// repeatedly and when the directory already exists.
    pub fn ensure_dir(&mut self) -> Result<(), HandlerError> {
        if self.dir_ready {
            return Ok(());
        }
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| HandlerError::write(&self.output_dir, e))?;
        self.dir_ready = true;
        Ok(())
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<IndexRecord> {
        self.records
    }

    fn push(&mut self, path: PathBuf, capture_time: CaptureTime, local_index: u64) {
        self.records.push(IndexRecord {
            path,
            capture_time,
            local_index,
        });
    }
}

/// The capability every handler variant implements.
pub trait MessageHandler {
    fn core(&self) -> &HandlerCore;

    fn core_mut(&mut self) -> &mut HandlerCore;

    /// Decode, normalize and write one message, returning the artifact path.
    fn export(&mut self, payload: &[u8], time: CaptureTime) -> Result<PathBuf, HandlerError>;

    fn process(&mut self, payload: &[u8], topic: &str, time: CaptureTime, local_index: u64) {
        match self.export(payload, time) {
            Ok(path) => {
                tracing::debug!(%topic, index = local_index, path = %path.display(), "wrote artifact");
                self.core_mut().push(path, time, local_index);
            }
            Err(e) => {
                tracing::error!(%topic, index = local_index, stamp = %time, "dropping message: {}", e);
            }
        }
    }
}

/// One variant per supported message kind.
#[derive(Debug)]
pub enum Handler {
    Image(ImageHandler),
    CompressedImage(ImageHandler),
    DepthImage(DepthImageHandler),
    PointCloud(PointCloudHandler),
    Imu(ImuHandler),
    Gps(GpsHandler),
}

impl Handler {
    /// Builds the handler for a topic; `None` for kinds that have no handler.
    pub fn from_config(topic: &TopicConfig) -> Option<Self> {
        let dir = topic.output_dir.clone();
        let handler = match topic.kind {
            MessageKind::Image => {
                Handler::Image(ImageHandler::new(dir, &topic.encoding, ImageSource::Raw))
            }
            MessageKind::CompressedImage => Handler::CompressedImage(ImageHandler::new(
                dir,
                &topic.encoding,
                ImageSource::Compressed,
            )),
            MessageKind::DepthImage => Handler::DepthImage(DepthImageHandler::new(dir, &topic.encoding)),
            MessageKind::PointCloud => Handler::PointCloud(PointCloudHandler::new(dir)),
            MessageKind::Imu => Handler::Imu(ImuHandler::new(dir)),
            MessageKind::Gps => Handler::Gps(GpsHandler::new(dir)),
            MessageKind::Unknown => return None,
        };
        Some(handler)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Handler::Image(_) => MessageKind::Image,
            Handler::CompressedImage(_) => MessageKind::CompressedImage,
            Handler::DepthImage(_) => MessageKind::DepthImage,
            Handler::PointCloud(_) => MessageKind::PointCloud,
            Handler::Imu(_) => MessageKind::Imu,
            Handler::Gps(_) => MessageKind::Gps,
        }
    }

    fn inner(&self) -> &dyn MessageHandler {
        match self {
            Handler::Image(h) | Handler::CompressedImage(h) => h,
            Handler::DepthImage(h) => h,
            Handler::PointCloud(h) => h,
            Handler::Imu(h) => h,
            Handler::Gps(h) => h,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn MessageHandler {
        match self {
            Handler::Image(h) | Handler::CompressedImage(h) => h,
            Handler::DepthImage(h) => h,
            Handler::PointCloud(h) => h,
            Handler::Imu(h) => h,
            Handler::Gps(h) => h,
        }
    }

    pub fn process(&mut self, payload: &[u8], topic: &str, time: CaptureTime, local_index: u64) {
        self.inner_mut().process(payload, topic, time, local_index);
    }

    pub fn output_dir(&self) -> &Path {
        self.inner().core().output_dir()
    }

    pub fn records(&self) -> &[IndexRecord] {
        self.inner().core().records()
    }

    pub fn into_records(self) -> Vec<IndexRecord> {
        match self {
            Handler::Image(h) | Handler::CompressedImage(h) => h.into_core().into_records(),
            Handler::DepthImage(h) => h.into_core().into_records(),
            Handler::PointCloud(h) => h.into_core().into_records(),
            Handler::Imu(h) => h.into_core().into_records(),
            Handler::Gps(h) => h.into_core().into_records(),
        }
    }
}

/// Pretty-printed JSON artifact.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HandlerError> {
    let file = File::create(path).map_err(|e| HandlerError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| HandlerError::write(path, e))?;
    writer.flush().map_err(|e| HandlerError::write(path, e))
}
