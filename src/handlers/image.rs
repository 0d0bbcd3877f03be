//! sensor_msgs/Image and sensor_msgs/CompressedImage → PNG

use super::pixels::{DecodedImage, EncodingPolicy, PixelFormat, write_png};
use super::{HandlerCore, MessageHandler};
use crate::error::HandlerError;
use crate::time::CaptureTime;
use crate::wire::{WireError, WireReader};
use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;

pub const DEFAULT_COLOR_ENCODING: &str = "rgb8";

const MAX_DIMENSION: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// sensor_msgs/Image
    Raw,
    /// sensor_msgs/CompressedImage
    Compressed,
}

#[derive(Debug)]
pub struct ImageHandler {
    core: HandlerCore,
    policy: EncodingPolicy,
    source: ImageSource,
}

impl ImageHandler {
    pub fn new(output_dir: impl Into<PathBuf>, encoding: &str, source: ImageSource) -> Self {
        let core = HandlerCore::new(output_dir);
        let policy = EncodingPolicy::new(encoding, DEFAULT_COLOR_ENCODING, core.output_dir());
        Self { core, policy, source }
    }

    /// Encoding messages are currently decoded into.
    pub fn encoding(&self) -> &str {
        self.policy.current()
    }

    pub fn into_core(self) -> HandlerCore {
        self.core
    }

    fn decode(&mut self, payload: &[u8]) -> Result<DecodedImage, HandlerError> {
        let source = match self.source {
            ImageSource::Raw => parse_image(payload)?.unpack(),
            ImageSource::Compressed => parse_compressed(payload)?.decode(),
        };
        self.policy.decode(|encoding| {
            source
                .as_ref()
                .map_err(Clone::clone)
                .and_then(|img| img.convert(encoding))
        })
    }

    /// Hands the PNG encoder RGB-ordered data for the colour encodings it
    /// knows; anything else is written exactly as decoded.
    fn normalize(&self, img: DecodedImage) -> Result<DynamicImage, HandlerError> {
        let encoding = self.policy.current();
        let img = match encoding {
            "rgb8" => img,
            "bgr8" => img.convert("rgb8").map_err(|reason| HandlerError::Decode {
                encoding: encoding.to_string(),
                reason,
            })?,
            "mono8" | "mono16" => img,
            other => {
                tracing::warn!(
                    dir = %self.core.output_dir().display(),
                    "{}; skipping color conversion",
                    HandlerError::UnsupportedEncoding(other.to_string())
                );
                img
            }
        };
        img.into_dynamic().map_err(|reason| HandlerError::Decode {
            encoding: encoding.to_string(),
            reason,
        })
    }
}

impl MessageHandler for ImageHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn export(&mut self, payload: &[u8], time: CaptureTime) -> Result<PathBuf, HandlerError> {
        let decoded = self.decode(payload)?;
        let image = self.normalize(decoded)?;

        let path = self.core.artifact_path(time, "png");
        self.core.ensure_dir()?;
        write_png(&image, &path)?;
        Ok(path)
    }
}

/// sensor_msgs/Image as laid out on the wire.
#[derive(Debug)]
pub(crate) struct RawImage<'a> {
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    pub step: u32,
    pub data: &'a [u8],
}

pub(crate) fn parse_image(payload: &[u8]) -> Result<RawImage<'_>, WireError> {
    let mut r = WireReader::new(payload);
    let header = r.read_header()?;
    let height = r.read_u32("height")?;
    let width = r.read_u32("width")?;
    let encoding = r.read_string("encoding")?;
    let is_bigendian = r.read_bool("is_bigendian")?;
    let step = r.read_u32("step")?;
    let data = r.read_bytes("data")?;

    tracing::trace!(frame = %header.frame_id, width, height, %encoding, len = data.len(), "parsed image");
    Ok(RawImage {
        height,
        width,
        encoding,
        is_bigendian,
        step,
        data,
    })
}

impl RawImage<'_> {
    /// Packs the rows (dropping any per-row padding) into a buffer in the
    /// message's own encoding.
    pub fn unpack(&self) -> Result<DecodedImage, String> {
        let format = PixelFormat::parse(&self.encoding)
            .ok_or_else(|| format!("unsupported source encoding '{}'", self.encoding))?;

        if self.width == 0 || self.height == 0 || self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(format!("invalid image dimensions: {}x{}", self.width, self.height));
        }

        let row = self.width as usize * format.bytes_per_pixel();
        let step = self.step as usize;
        if step < row {
            return Err(format!("step {} shorter than row of {} bytes", step, row));
        }
        let needed = step * (self.height as usize - 1) + row;
        if self.data.len() < needed {
            return Err(format!("image data holds {} bytes, need {}", self.data.len(), needed));
        }

        let mut packed = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            packed.extend_from_slice(&self.data[y * step..y * step + row]);
        }

        if self.is_bigendian {
            match format {
                PixelFormat::Mono16 | PixelFormat::Depth16 => {
                    packed.chunks_exact_mut(2).for_each(|c| c.swap(0, 1));
                }
                PixelFormat::Depth32F => {
                    packed.chunks_exact_mut(4).for_each(|c| c.reverse());
                }
                _ => {}
            }
        }

        DecodedImage::new(self.width, self.height, format, packed)
    }
}

/// sensor_msgs/CompressedImage
#[derive(Debug)]
pub(crate) struct CompressedImage<'a> {
    pub format: String,
    pub data: &'a [u8],
}

pub(crate) fn parse_compressed(payload: &[u8]) -> Result<CompressedImage<'_>, WireError> {
    let mut r = WireReader::new(payload);
    r.read_header()?;
    let format = r.read_string("format")?;
    let data = r.read_bytes("data")?;
    Ok(CompressedImage { format, data })
}

impl CompressedImage<'_> {
    pub fn decode(&self) -> Result<DecodedImage, String> {
        let fmt_lc = self.format.to_ascii_lowercase();
        let decoded = if fmt_lc.contains("png") {
            image::load_from_memory_with_format(self.data, ImageFormat::Png)
        } else if fmt_lc.contains("jpg") || fmt_lc.contains("jpeg") {
            image::load_from_memory_with_format(self.data, ImageFormat::Jpeg)
        } else {
            image::load_from_memory(self.data)
        };
        decoded
            .map(DecodedImage::from_dynamic)
            .map_err(|e| format!("cannot decode '{}' payload: {}", self.format, e))
    }
}
