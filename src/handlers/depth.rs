//! Depth images (sensor_msgs/Image, usually 16UC1) → 16-bit PNG

use super::image::parse_image;
use super::pixels::{DecodedImage, EncodingPolicy, PixelFormat, write_png};
use super::{HandlerCore, MessageHandler};
use crate::error::HandlerError;
use crate::time::CaptureTime;
use std::path::PathBuf;

pub const DEFAULT_DEPTH_ENCODING: &str = "16UC1";

#[derive(Debug)]
pub struct DepthImageHandler {
    core: HandlerCore,
    policy: EncodingPolicy,
}

impl DepthImageHandler {
    pub fn new(output_dir: impl Into<PathBuf>, encoding: &str) -> Self {
        let core = HandlerCore::new(output_dir);
        let policy = EncodingPolicy::new(encoding, DEFAULT_DEPTH_ENCODING, core.output_dir());
        Self { core, policy }
    }

    pub fn encoding(&self) -> &str {
        self.policy.current()
    }

    pub fn into_core(self) -> HandlerCore {
        self.core
    }

    fn decode(&mut self, payload: &[u8]) -> Result<DecodedImage, HandlerError> {
        let source = parse_image(payload)?.unpack();
        self.policy.decode(|encoding| {
            source
                .as_ref()
                .map_err(Clone::clone)
                .and_then(|img| img.convert(encoding))
        })
    }
}

impl MessageHandler for DepthImageHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn export(&mut self, payload: &[u8], time: CaptureTime) -> Result<PathBuf, HandlerError> {
        let mut decoded = self.decode(payload)?;

        // PNG has no float samples
        if decoded.format == PixelFormat::Depth32F {
            decoded = decoded
                .convert(DEFAULT_DEPTH_ENCODING)
                .map_err(|reason| HandlerError::Decode {
                    encoding: self.policy.current().to_string(),
                    reason,
                })?;
        }

        // raw depth values, no rescaling for visualization
        if self.policy.current() == DEFAULT_DEPTH_ENCODING {
            decoded.format = PixelFormat::Depth16;
        }
        let image = decoded.into_dynamic().map_err(|reason| HandlerError::Decode {
            encoding: self.policy.current().to_string(),
            reason,
        })?;

        let path = self.core.artifact_path(time, "png");
        self.core.ensure_dir()?;
        write_png(&image, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::image::tests::image_payload;
    use crate::handlers::pixels::u16_to_le;

    #[test]
    fn test_depth_values_are_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handler = DepthImageHandler::new(tmp.path(), "");
        assert_eq!(handler.encoding(), "16UC1");

        let data = u16_to_le(&[0, 1234, 65535]);
        handler.process(&image_payload("16UC1", 3, 1, &data), "/depth", CaptureTime::new(7, 8), 0);

        let records = handler.core().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, tmp.path().join("7-000000008.png"));

        let img = image::open(&records[0].path).unwrap();
        assert_eq!(img.color(), image::ColorType::L16);
        assert_eq!(img.to_luma16().into_raw(), vec![0, 1234, 65535]);
    }

    #[test]
    fn test_float_depth_converted_to_16_bit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handler = DepthImageHandler::new(tmp.path(), "16UC1");
        let data: Vec<u8> = [1500.0f32, 2.6].iter().flat_map(|v| v.to_le_bytes()).collect();
        handler.process(&image_payload("32FC1", 2, 1, &data), "/depth", CaptureTime::new(1, 0), 0);

        let img = image::open(&handler.core().records()[0].path).unwrap();
        assert_eq!(img.to_luma16().into_raw(), vec![1500, 3]);
    }

    #[test]
    fn test_float_encoding_written_as_16_bit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handler = DepthImageHandler::new(tmp.path(), "32FC1");
        let data: Vec<u8> = [0.4f32, 812.5, 1.0e6].iter().flat_map(|v| v.to_le_bytes()).collect();
        for sec in 0..3 {
            handler.process(&image_payload("32FC1", 3, 1, &data), "/depth", CaptureTime::new(sec, 0), sec as u64);
        }

        assert_eq!(handler.encoding(), "32FC1");
        let records = handler.core().records();
        assert_eq!(records.len(), 3);
        let img = image::open(&records[2].path).unwrap();
        assert_eq!(img.color(), image::ColorType::L16);
        assert_eq!(img.to_luma16().into_raw(), vec![0, 813, 65535]);
    }

    #[test]
    fn test_fallback_to_16uc1() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handler = DepthImageHandler::new(tmp.path(), "bogus");
        let data = u16_to_le(&[42]);
        handler.process(&image_payload("16UC1", 1, 1, &data), "/depth", CaptureTime::new(1, 0), 0);
        assert_eq!(handler.encoding(), "16UC1");
        assert_eq!(handler.core().records().len(), 1);
    }

    #[test]
    fn test_color_payload_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handler = DepthImageHandler::new(tmp.path(), "");
        handler.process(&image_payload("rgb8", 1, 1, &[1, 2, 3]), "/depth", CaptureTime::new(1, 0), 0);
        assert!(handler.core().records().is_empty());
    }

    #[test]
    fn test_other_encodings_written_as_decoded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handler = DepthImageHandler::new(tmp.path(), "mono8");
        handler.process(&image_payload("mono8", 2, 1, &[3, 4]), "/depth", CaptureTime::new(1, 0), 0);
        let img = image::open(&handler.core().records()[0].path).unwrap();
        assert_eq!(img.color(), image::ColorType::L8);
    }
}
