//! Pixel buffers, encoding conversion and the fallback policy shared by the
//! image handlers.

use crate::error::HandlerError;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, Rgba};
use std::path::Path;

/// Encodings a decoded buffer can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Mono8,
    Mono16,
    Depth16,
    Depth32F,
}

impl PixelFormat {
    pub fn parse(encoding: &str) -> Option<Self> {
        Some(match encoding {
            "rgb8" => PixelFormat::Rgb8,
            "bgr8" => PixelFormat::Bgr8,
            "rgba8" => PixelFormat::Rgba8,
            "bgra8" => PixelFormat::Bgra8,
            "mono8" | "8UC1" => PixelFormat::Mono8,
            "mono16" => PixelFormat::Mono16,
            "16UC1" => PixelFormat::Depth16,
            "32FC1" => PixelFormat::Depth32F,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Bgr8 => "bgr8",
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Bgra8 => "bgra8",
            PixelFormat::Mono8 => "mono8",
            PixelFormat::Mono16 => "mono16",
            PixelFormat::Depth16 => "16UC1",
            PixelFormat::Depth32F => "32FC1",
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono16 | PixelFormat::Depth16 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::Depth32F => 4,
        }
    }

    fn is_color8(&self) -> bool {
        matches!(
            self,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 | PixelFormat::Rgba8 | PixelFormat::Bgra8
        )
    }

    fn is_u16(&self) -> bool {
        matches!(self, PixelFormat::Mono16 | PixelFormat::Depth16)
    }
}

/// Tightly packed pixels; 16-bit and float samples are little-endian.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, String> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(format!(
                "{}x{} {} needs {} bytes, got {}",
                width,
                height,
                format.name(),
                expected,
                data.len()
            ));
        }
        Ok(Self { width, height, format, data })
    }

    pub fn from_dynamic(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let (format, data) = match img {
            DynamicImage::ImageLuma8(buf) => (PixelFormat::Mono8, buf.into_raw()),
            DynamicImage::ImageLuma16(buf) => (PixelFormat::Mono16, u16_to_le(&buf.into_raw())),
            DynamicImage::ImageRgb8(buf) => (PixelFormat::Rgb8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
            other if other.color().has_alpha() => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
            other => (PixelFormat::Rgb8, other.to_rgb8().into_raw()),
        };
        Self { width, height, format, data }
    }

    /// Converts into `target`, the way a bridge between message encodings
    /// and an image library would. Fails for unknown encodings and for
    /// conversions that have no meaningful definition.
    pub fn convert(&self, target: &str) -> Result<DecodedImage, String> {
        let target = PixelFormat::parse(target).ok_or_else(|| format!("unknown encoding '{}'", target))?;
        let src = self.format;
        if src == target {
            return Ok(self.clone());
        }

        let data = if src.is_color8() && target.is_color8() {
            map_color(self, target)
        } else if src.is_color8() && target == PixelFormat::Mono8 {
            self.pixels_rgba()
                .map(|[r, g, b, _]| luma(r, g, b))
                .collect()
        } else if src == PixelFormat::Mono8 && target.is_color8() {
            map_color(self, target)
        } else if src == PixelFormat::Mono16 && (target == PixelFormat::Mono8 || target.is_color8()) {
            // keep the high byte, as a viewer would
            let mono = DecodedImage {
                width: self.width,
                height: self.height,
                format: PixelFormat::Mono8,
                data: le_to_u16(&self.data).into_iter().map(|v| (v >> 8) as u8).collect(),
            };
            return mono.convert(target.name());
        } else if src.is_u16() && target.is_u16() {
            self.data.clone()
        } else if src == PixelFormat::Mono8 && target.is_u16() {
            u16_to_le(&self.data.iter().map(|&v| v as u16).collect::<Vec<_>>())
        } else if src == PixelFormat::Depth32F && target.is_u16() {
            let values: Vec<u16> = self
                .data
                .chunks_exact(4)
                .map(|c| saturate_u16(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect();
            u16_to_le(&values)
        } else {
            return Err(format!("cannot convert {} to {}", src.name(), target.name()));
        };

        DecodedImage::new(self.width, self.height, target, data)
    }

    /// Pixels as RGBA regardless of the source channel order.
    fn pixels_rgba(&self) -> Box<dyn Iterator<Item = [u8; 4]> + '_> {
        let bpp = self.format.bytes_per_pixel();
        let chunks = self.data.chunks_exact(bpp);
        match self.format {
            PixelFormat::Rgb8 => Box::new(chunks.map(|p| [p[0], p[1], p[2], 255])),
            PixelFormat::Bgr8 => Box::new(chunks.map(|p| [p[2], p[1], p[0], 255])),
            PixelFormat::Rgba8 => Box::new(chunks.map(|p| [p[0], p[1], p[2], p[3]])),
            PixelFormat::Bgra8 => Box::new(chunks.map(|p| [p[2], p[1], p[0], p[3]])),
            PixelFormat::Mono8 => Box::new(chunks.map(|p| [p[0], p[0], p[0], 255])),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Lays the buffer out for the PNG encoder without touching the samples.
    pub fn into_dynamic(self) -> Result<DynamicImage, String> {
        let (w, h, format) = (self.width, self.height, self.format);
        let bad = || format!("{}x{} {} buffer has the wrong size", w, h, format.name());
        let data = self.data;
        Ok(match format {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => DynamicImage::ImageRgb8(
                ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data).ok_or_else(bad)?,
            ),
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => DynamicImage::ImageRgba8(
                ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, data).ok_or_else(bad)?,
            ),
            PixelFormat::Mono8 => DynamicImage::ImageLuma8(
                ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data).ok_or_else(bad)?,
            ),
            PixelFormat::Mono16 | PixelFormat::Depth16 => DynamicImage::ImageLuma16(
                ImageBuffer::<Luma<u16>, _>::from_raw(w, h, le_to_u16(&data)).ok_or_else(bad)?,
            ),
            PixelFormat::Depth32F => {
                return Err("32FC1 has no PNG representation".to_string());
            }
        })
    }
}

fn map_color(img: &DecodedImage, target: PixelFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(img.width as usize * img.height as usize * target.bytes_per_pixel());
    for [r, g, b, a] in img.pixels_rgba() {
        match target {
            PixelFormat::Rgb8 => out.extend_from_slice(&[r, g, b]),
            PixelFormat::Bgr8 => out.extend_from_slice(&[b, g, r]),
            PixelFormat::Rgba8 => out.extend_from_slice(&[r, g, b, a]),
            PixelFormat::Bgra8 => out.extend_from_slice(&[b, g, r, a]),
            _ => {}
        }
    }
    out
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

fn saturate_u16(v: f32) -> u16 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

pub(crate) fn u16_to_le(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn le_to_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// The encoding a topic decodes into, plus the kind default it falls back to.
///
/// Once the fallback has been needed the default sticks for the rest of the
/// topic.
#[derive(Debug, Clone)]
pub struct EncodingPolicy {
    current: String,
    default: &'static str,
}

impl EncodingPolicy {
    pub fn new(configured: &str, default: &'static str, output_dir: &Path) -> Self {
        let current = if configured.is_empty() {
            tracing::warn!(dir = %output_dir.display(), "no encoding provided; defaulting to '{}'", default);
            default.to_string()
        } else {
            configured.to_string()
        };
        Self { current, default }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Try the current encoding, then the default once.
    pub fn decode<F>(&mut self, decode: F) -> Result<DecodedImage, HandlerError>
    where
        F: Fn(&str) -> Result<DecodedImage, String>,
    {
        let primary = match decode(&self.current) {
            Ok(img) => return Ok(img),
            Err(reason) => HandlerError::Decode {
                encoding: self.current.clone(),
                reason,
            },
        };
        tracing::error!("{}; using default encoding '{}'", primary, self.default);

        match decode(self.default) {
            Ok(img) => {
                self.current = self.default.to_string();
                Ok(img)
            }
            Err(reason) => Err(HandlerError::FallbackDecode {
                encoding: self.default.to_string(),
                reason,
            }),
        }
    }
}

pub(crate) fn write_png(img: &DynamicImage, path: &Path) -> Result<(), HandlerError> {
    img.save_with_format(path, ImageFormat::Png)
        .map_err(|e| HandlerError::write(path, e))
}
