//! sensor_msgs/Imu → JSON
use super::{HandlerCore, MessageHandler, write_json};
use crate::error::HandlerError;
use crate::time::CaptureTime;
use crate::wire::{WireError, WireReader};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug)]
pub struct ImuHandler {
    core: HandlerCore,
}

impl ImuHandler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            core: HandlerCore::new(output_dir),
        }
    }

    pub fn into_core(self) -> HandlerCore {
        self.core
    }
}

impl MessageHandler for ImuHandler {
    fn core(&self) -> &HandlerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut HandlerCore {
        &mut self.core
    }

    fn export(&mut self, payload: &[u8], time: CaptureTime) -> Result<PathBuf, HandlerError> {
        let imu = parse_imu(payload)?;
        let path = self.core.artifact_path(time, "json");
        self.core.ensure_dir()?;
        write_json(&path, &imu)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImuSample {
    pub frame_id: String,
    pub stamp: CaptureTime,
    /// x, y, z, w
    pub orientation: [f64; 4],
    pub orientation_valid: bool,
    pub orientation_covariance: [f64; 9],
    pub angular_velocity: [f64; 3],
    pub angular_velocity_covariance: [f64; 9],
    pub linear_acceleration: [f64; 3],
    pub linear_acceleration_covariance: [f64; 9],
}

pub fn parse_imu(payload: &[u8]) -> Result<ImuSample, WireError> {
    let mut r = WireReader::new(payload);
    let header = r.read_header()?;
    let orientation = r.read_f64_array::<4>("orientation")?;
    let orientation_covariance = r.read_f64_array::<9>("orientation_covariance")?;
    let angular_velocity = r.read_f64_array::<3>("angular_velocity")?;
    let angular_velocity_covariance = r.read_f64_array::<9>("angular_velocity_covariance")?;
    let linear_acceleration = r.read_f64_array::<3>("linear_acceleration")?;
    let linear_acceleration_covariance = r.read_f64_array::<9>("linear_acceleration_covariance")?;

    // covariance[0] == -1 flags "no orientation estimate"
    let orientation_valid = orientation_covariance[0] != -1.0 && is_valid_quaternion(&orientation);

    Ok(ImuSample {
        frame_id: header.frame_id,
        stamp: header.stamp,
        orientation,
        orientation_valid,
        orientation_covariance,
        angular_velocity,
        angular_velocity_covariance,
        linear_acceleration,
        linear_acceleration_covariance,
    })
}

// Non-zero and roughly unit length
fn is_valid_quaternion(q: &[f64; 4]) -> bool {
    let norm_sq: f64 = q.iter().map(|v| v * v).sum();
    norm_sq > 0.01 && (norm_sq - 1.0).abs() < 0.1
}
