//! Capture timestamps shared by the log source, handlers and the index.

use serde::Serialize;
use std::fmt;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A capture time split the way ROS stamps are: whole seconds plus a
/// sub-second nanosecond part (always `< 1_000_000_000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct CaptureTime {
    pub sec: i64,
    pub nanosec: u32,
}

impl CaptureTime {
    pub fn new(sec: i64, nanosec: u32) -> Self {
        // carry an out-of-range nanosecond part into the seconds
        let carry = (nanosec as i64) / NANOS_PER_SEC;
        Self {
            sec: sec + carry,
            nanosec: (nanosec as i64 % NANOS_PER_SEC) as u32,
        }
    }

    pub fn from_nanos(ns: i64) -> Self {
        Self {
            sec: ns.div_euclid(NANOS_PER_SEC),
            nanosec: ns.rem_euclid(NANOS_PER_SEC) as u32,
        }
    }

    pub fn as_nanos(&self) -> i64 {
        self.sec * NANOS_PER_SEC + self.nanosec as i64
    }

    /// Absolute distance to `other` in nanoseconds.
    pub fn abs_diff(&self, other: &CaptureTime) -> u64 {
        self.as_nanos().abs_diff(other.as_nanos())
    }

    /// `<sec>-<nanosec padded to 9 digits>`, the stem of every artifact file.
    pub fn file_stem(&self) -> String {
        format!("{}-{:09}", self.sec, self.nanosec)
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nanosec)
    }
}
