//! Range finders
//!
//! UART ultrasonic module protocol:
//! - Baud: 9600, 8N1, module streams a frame every ~100 ms
//! - Frame: 4 bytes, `0xFF | distance_hi | distance_lo | checksum`
//! - Distance in millimeters, checksum = low byte of the sum of the first three bytes

use crate::io::hardware::{HardwareError, RangeFinder};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{info, trace, warn};

const HEADER: u8 = 0xFF;
const FRAME_LEN: usize = 4;

/// Parse one frame into millimeters
pub fn parse_frame(frame: &[u8; FRAME_LEN]) -> Option<u16> {
    if frame[0] != HEADER {
        return None;
    }
    let sum = frame[..3].iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    if sum != frame[3] {
        trace!(sum, checksum = frame[3], "range_checksum_failed");
        return None;
    }
    Some(u16::from_be_bytes([frame[1], frame[2]]))
}

/// Consume every complete frame in `buf`, returning the newest valid reading.
/// A trailing partial frame stays buffered.
fn drain_latest(buf: &mut Vec<u8>) -> Option<u16> {
    let mut latest = None;
    let mut pos = 0;
    while pos + FRAME_LEN <= buf.len() {
        if buf[pos] != HEADER {
            pos += 1;
            continue;
        }
        let frame = [buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]];
        match parse_frame(&frame) {
            Some(mm) => {
                latest = Some(mm);
                pos += FRAME_LEN;
            }
            None => pos += 1,
        }
    }
    buf.drain(..pos);
    latest
}

pub struct SerialRangeFinder {
    device: String,
    baud: u32,
    port: Option<SerialStream>,
    buffer: Vec<u8>,
}

impl SerialRangeFinder {
    pub fn new(device: impl Into<String>, baud: u32) -> Self {
        Self { device: device.into(), baud, port: None, buffer: Vec::with_capacity(64) }
    }

    fn port(&mut self) -> Result<&mut SerialStream, HardwareError> {
        if self.port.is_none() {
            let port = tokio_serial::new(&self.device, self.baud).open_native_async()?;
            info!(device = %self.device, baud = self.baud, "range_finder_opened");
            self.port = Some(port);
        }
        self.port.as_mut().ok_or(HardwareError::Closed)
    }
}

#[async_trait]
impl RangeFinder for SerialRangeFinder {
    async fn measure(&mut self) -> Result<f64, HardwareError> {
        let mut chunk = [0u8; 64];
        loop {
            let read = self.port()?.read(&mut chunk).await;
            match read {
                Ok(0) => {
                    self.port = None;
                    return Err(HardwareError::Closed);
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    if let Some(mm) = drain_latest(&mut self.buffer) {
                        return Ok(f64::from(mm) / 10.0);
                    }
                }
                Err(e) => {
                    warn!(device = %self.device, error = %e, "range_finder_read_error");
                    self.port = None;
                    return Err(e.into());
                }
            }
        }
    }
}

/// Constant reading, for readers mounted without a proximity sensor.
/// Zero keeps presence permanently asserted.
pub struct FixedRangeFinder {
    distance_cm: f64,
}

impl FixedRangeFinder {
    pub fn new(distance_cm: f64) -> Self {
        Self { distance_cm }
    }
}

#[async_trait]
impl RangeFinder for FixedRangeFinder {
    async fn measure(&mut self) -> Result<f64, HardwareError> {
        Ok(self.distance_cm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        // 0x01A1 = 417 mm
        let sum = 0xFFu8.wrapping_add(0x01).wrapping_add(0xA1);
        assert_eq!(parse_frame(&[0xFF, 0x01, 0xA1, sum]), Some(417));
        assert_eq!(parse_frame(&[0xFF, 0x01, 0xA1, sum.wrapping_add(1)]), None);
        assert_eq!(parse_frame(&[0xFE, 0x01, 0xA1, sum]), None);
    }

    #[test]
    fn test_drain_latest_keeps_partial_frame() {
        let mut buf = vec![0x00, 0xFF, 0x00, 0x64, 0x63, 0xFF, 0x00, 0xC8, 0xC7, 0xFF, 0x01];
        assert_eq!(drain_latest(&mut buf), Some(200));
        assert_eq!(buf, vec![0xFF, 0x01]);
        assert_eq!(drain_latest(&mut buf), None);
    }

    #[tokio::test]
    async fn test_fixed_range_finder() {
        let mut finder = FixedRangeFinder::new(12.5);
        assert_eq!(finder.measure().await.unwrap(), 12.5);
    }
}
