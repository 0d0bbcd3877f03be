//! Little-endian reader for ROS1-serialized message payloads.
//!
//! Every message kind handled here starts with a `std_msgs/Header`, so the
//! reader also knows how to pull one of those off the front.

use crate::time::CaptureTime;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("payload too short for {what}: need {needed} bytes at offset {offset}, have {len}")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        len: usize,
    },
}

/// std_msgs/Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub seq: u32,
    pub stamp: CaptureTime,
    pub frame_id: String,
}

pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                what,
                offset: self.pos,
                needed: n,
                len: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize, what: &'static str) -> Result<(), WireError> {
        self.take(n, what).map(|_| ())
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8, WireError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_i8(&mut self, what: &'static str) -> Result<i8, WireError> {
        Ok(self.read_u8(what)? as i8)
    }

    pub fn read_bool(&mut self, what: &'static str) -> Result<bool, WireError> {
        Ok(self.read_u8(what)? != 0)
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    pub fn read_f64(&mut self, what: &'static str) -> Result<f64, WireError> {
        Ok(f64::from_le_bytes(self.array(what)?))
    }

    pub fn read_f64_array<const N: usize>(&mut self, what: &'static str) -> Result<[f64; N], WireError> {
        let mut out = [0.0; N];
        for v in out.iter_mut() {
            *v = self.read_f64(what)?;
        }
        Ok(out)
    }

    /// uint32 length prefix followed by that many bytes.
    pub fn read_bytes(&mut self, what: &'static str) -> Result<&'a [u8], WireError> {
        let len = self.read_u32(what)? as usize;
        self.take(len, what)
    }

    pub fn read_string(&mut self, what: &'static str) -> Result<String, WireError> {
        Ok(String::from_utf8_lossy(self.read_bytes(what)?).into_owned())
    }

    pub fn read_header(&mut self) -> Result<Header, WireError> {
        let seq = self.read_u32("header seq")?;
        let secs = self.read_u32("header stamp")?;
        let nsecs = self.read_u32("header stamp")?;
        let frame_id = self.read_string("header frame_id")?;
        Ok(Header {
            seq,
            stamp: CaptureTime::new(secs as i64, nsecs),
            frame_id,
        })
    }
}

/// Reads only the header stamp, without touching the rest of the payload.
pub fn peek_stamp(payload: &[u8]) -> Option<CaptureTime> {
    let mut r = WireReader::new(payload);
    r.skip(4, "header seq").ok()?;
    let secs = r.read_u32("header stamp").ok()?;
    let nsecs = r.read_u32("header stamp").ok()?;
    Some(CaptureTime::new(secs as i64, nsecs))
}

/// Builders for ROS1 payloads, shared by the unit tests of every handler.
#[cfg(test)]
pub(crate) mod testing {
    pub struct PayloadBuilder {
        pub buf: Vec<u8>,
    }

    impl PayloadBuilder {
        pub fn new() -> Self {
            Self { buf: Vec::new() }
        }

        pub fn header(mut self, sec: u32, nsec: u32, frame_id: &str) -> Self {
            self = self.u32(7);
            self = self.u32(sec);
            self = self.u32(nsec);
            self.string(frame_id)
        }

        pub fn u8(mut self, v: u8) -> Self {
            self.buf.push(v);
            self
        }

        pub fn u16(mut self, v: u16) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u32(mut self, v: u32) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn f64(mut self, v: f64) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn string(self, s: &str) -> Self {
            self.bytes(s.as_bytes())
        }

        pub fn bytes(mut self, b: &[u8]) -> Self {
            self = self.u32(b.len() as u32);
            self.buf.extend_from_slice(b);
            self
        }

        pub fn raw(mut self, b: &[u8]) -> Self {
            self.buf.extend_from_slice(b);
            self
        }

        pub fn build(self) -> Vec<u8> {
            self.buf
        }
    }
}
