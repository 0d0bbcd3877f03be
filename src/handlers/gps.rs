//! sensor_msgs/NavSatFix → JSON

use super::{HandlerCore, MessageHandler, write_json};
use crate::error::HandlerError;
use crate::time::CaptureTime;
use crate::wire::{WireError, WireReader};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug)]
pub struct GpsHandler {
    core: HandlerCore,
}

impl GpsHandler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            core: HandlerCore::new(output_dir),
        }
    }

    pub fn into_core(self) -> HandlerCore {
        self.core
    }
}

impl MessageHandler for GpsHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn export(&mut self, payload: &[u8], time: CaptureTime) -> Result<PathBuf, HandlerError> {
        let fix = parse_navsatfix(payload)?;
        if !fix.has_fix() {
            tracing::debug!(status = fix.status, "GPS message without fix; exporting anyway");
        }
        let path = self.core.artifact_path(time, "json");
        self.core.ensure_dir()?;
        write_json(&path, &fix)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub frame_id: String,
    pub stamp: CaptureTime,
    /// NavSatStatus.status: -1 no fix, 0 fix, 1 SBAS, 2 GBAS
    pub status: i8,
    pub service: u16,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub position_covariance: [f64; 9],
    pub position_covariance_type: u8,
}

impl GpsFix {
    pub fn has_fix(&self) -> bool {
        self.status >= 0
    }
}

pub fn parse_navsatfix(payload: &[u8]) -> Result<GpsFix, WireError> {
    let mut r = WireReader::new(payload);
    let header = r.read_header()?;
    let status = r.read_i8("status")?;
    let service = r.read_u16("service")?;
    let latitude = r.read_f64("latitude")?;
    let longitude = r.read_f64("longitude")?;
    let altitude = r.read_f64("altitude")?;
    let position_covariance = r.read_f64_array::<9>("position_covariance")?;
    let position_covariance_type = r.read_u8("position_covariance_type")?;

    Ok(GpsFix {
        frame_id: header.frame_id,
        stamp: header.stamp,
        status,
        service,
        latitude,
        longitude,
        altitude,
        position_covariance,
        position_covariance_type,
    })
}
