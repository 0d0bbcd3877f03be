//! PointCloud2 → binary PCD (v0.7)

use super::{HandlerCore, MessageHandler};
use crate::error::HandlerError;
use crate::time::CaptureTime;
use crate::wire::{WireError, WireReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PointCloudHandler {
    core: HandlerCore,
}

impl PointCloudHandler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            core: HandlerCore::new(output_dir),
        }
    }

    pub fn into_core(self) -> HandlerCore {
        self.core
    }
}

impl MessageHandler for PointCloudHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn export(&mut self, payload: &[u8], time: CaptureTime) -> Result<PathBuf, HandlerError> {
        let cloud = parse_pointcloud2(payload)?;
        let pcd = cloud.to_pcd().map_err(|reason| HandlerError::Decode {
            encoding: "PointCloud2".to_string(),
            reason,
        })?;

        let path = self.core.artifact_path(time, "pcd");
        self.core.ensure_dir()?;
        write_pcd(&pcd, &path)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: u8,
    pub count: u32,
}

impl PointField {
    /// PCD `(TYPE, SIZE)` for a sensor_msgs/PointField datatype.
    fn pcd_type(&self) -> Option<(char, usize)> {
        Some(match self.datatype {
            1 => ('I', 1), // INT8
            2 => ('U', 1), // UINT8
            3 => ('I', 2), // INT16
            4 => ('U', 2), // UINT16
            5 => ('I', 4), // INT32
            6 => ('U', 4), // UINT32
            7 => ('F', 4), // FLOAT32
            8 => ('F', 8), // FLOAT64
            _ => return None,
        })
    }
}

#[derive(Debug)]
pub struct PointCloud2<'a> {
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: &'a [u8],
}

pub fn parse_pointcloud2(payload: &[u8]) -> Result<PointCloud2<'_>, WireError> {
    let mut r = WireReader::new(payload);
    r.read_header()?;
    let height = r.read_u32("height")?;
    let width = r.read_u32("width")?;

    let len = r.read_u32("fields length")? as usize;
    let mut fields = Vec::with_capacity(len.min(64));
    for _ in 0..len {
        fields.push(PointField {
            name: r.read_string("field name")?,
            offset: r.read_u32("field offset")?,
            datatype: r.read_u8("field datatype")?,
            count: r.read_u32("field count")?,
        });
    }

    let is_bigendian = r.read_bool("is_bigendian")?;
    let point_step = r.read_u32("point_step")?;
    let row_step = r.read_u32("row_step")?;
    let data = r.read_bytes("data")?;
    // is_dense is not needed

    Ok(PointCloud2 {
        height,
        width,
        fields,
        is_bigendian,
        point_step,
        row_step,
        data,
    })
}

/// In-memory PCD file: header text plus packed binary body.
#[derive(Debug)]
pub struct Pcd {
    pub header: String,
    pub body: Vec<u8>,
}

impl PointCloud2<'_> {
    pub fn num_points(&self) -> usize {
        self.height as usize * self.width as usize
    }

    pub fn to_pcd(&self) -> Result<Pcd, String> {
        if self.is_bigendian {
            return Err("big-endian PointCloud2 not supported".to_string());
        }

        let mut fields: Vec<(&PointField, char, usize)> = Vec::new();
        for f in self.fields.iter().filter(|f| f.count > 0) {
            let (ty, size) = f
                .pcd_type()
                .ok_or_else(|| format!("field '{}' has unknown datatype {}", f.name, f.datatype))?;
            let end = f.offset as usize + size * f.count as usize;
            if end > self.point_step as usize {
                return Err(format!("field '{}' extends past point_step {}", f.name, self.point_step));
            }
            fields.push((f, ty, size));
        }
        if fields.is_empty() {
            return Err("PointCloud2 has no fields".to_string());
        }
        fields.sort_by_key(|(f, _, _)| f.offset);

        let point_step = self.point_step as usize;
        let row_step = (self.row_step as usize).max(self.width as usize * point_step);
        let needed = if self.height == 0 {
            0
        } else {
            row_step * (self.height as usize - 1) + self.width as usize * point_step
        };
        if self.data.len() < needed {
            return Err(format!("cloud data holds {} bytes, need {}", self.data.len(), needed));
        }

        let packed_size: usize = fields.iter().map(|(f, _, size)| size * f.count as usize).sum();
        let mut body = Vec::with_capacity(packed_size * self.num_points());
        for row in 0..self.height as usize {
            for col in 0..self.width as usize {
                let start = row * row_step + col * point_step;
                let point = &self.data[start..start + point_step];
                for (f, _, size) in &fields {
                    let off = f.offset as usize;
                    body.extend_from_slice(&point[off..off + size * f.count as usize]);
                }
            }
        }

        let join = |parts: Vec<String>| parts.join(" ");
        let header = format!(
            "# .PCD v0.7 - Point Cloud Data file format\n\
             VERSION 0.7\n\
             FIELDS {}\n\
             SIZE {}\n\
             TYPE {}\n\
             COUNT {}\n\
             WIDTH {}\n\
             HEIGHT {}\n\
             VIEWPOINT 0 0 0 1 0 0 0\n\
             POINTS {}\n\
             DATA binary\n",
            join(fields.iter().map(|(f, _, _)| f.name.clone()).collect()),
            join(fields.iter().map(|(_, _, s)| s.to_string()).collect()),
            join(fields.iter().map(|(_, t, _)| t.to_string()).collect()),
            join(fields.iter().map(|(f, _, _)| f.count.to_string()).collect()),
            self.width,
            self.height,
            self.num_points(),
        );

        Ok(Pcd { header, body })
    }
}

fn write_pcd(pcd: &Pcd, path: &Path) -> Result<(), HandlerError> {
    let file = File::create(path).map_err(|e| HandlerError::write(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(pcd.header.as_bytes())
        .and_then(|_| writer.write_all(&pcd.body))
        .and_then(|_| writer.flush())
        .map_err(|e| HandlerError::write(path, e))
}
