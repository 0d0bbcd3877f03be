//! Schema command - Print supported ROS message types and their artifacts

use crate::config::MessageKind;
use anyhow::Result;

/// (config `type`, kind, artifact)
pub const MAPPINGS: &[(&str, MessageKind, &str)] = &[
    ("Image", MessageKind::Image, "PNG (rgb8/bgr8/mono8/mono16)"),
    ("CompressedImage", MessageKind::CompressedImage, "PNG (decoded JPEG/PNG)"),
    ("DepthImage", MessageKind::DepthImage, "PNG 16-bit (16UC1/32FC1)"),
    ("PointCloud2", MessageKind::PointCloud, "PCD v0.7 binary"),
    ("IMU", MessageKind::Imu, "JSON"),
    ("GPS", MessageKind::Gps, "JSON"),
];

/// Print all supported ROS message type → artifact mappings
pub fn print_schema() -> Result<()> {
    println!("Supported ROS → artifact mappings:");
    println!("---------------------------------------------------------------------------");

    for (name, kind, artifact) in MAPPINGS {
        println!("{:<16} {:<30} → {}", name, kind.ros_type(), artifact);
    }

    println!("\nFiles are named <topic dir>/<sec>-<nanosec:09>.<ext>; metadata.json indexes them.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_names_parse_as_kinds() {
        for (name, kind, _) in MAPPINGS {
            let parsed: MessageKind = serde_yaml::from_str(name).unwrap();
            assert_eq!(parsed, *kind, "{name}");
        }
    }
}
