//! Token readers
//!
//! UART 125 kHz reader protocol:
//! - Baud: 9600, 8N1, reader pushes frames unsolicited while a tag is in the field
//! - Frame: 14 bytes, `STX | 10 ASCII hex id | 2 ASCII hex checksum | ETX`
//! - Checksum: XOR of the five id bytes
//!
//! The 40-bit id is reported as its decimal value.

use crate::domain::IdentityId;
use crate::io::hardware::{HardwareError, TokenReader};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader, Lines, Stdin};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const FRAME_LEN: usize = 14;
const ID_BYTES: usize = 5;

/// Decode one complete frame
pub fn decode_frame(frame: &[u8]) -> Result<IdentityId, HardwareError> {
    if frame.len() != FRAME_LEN || frame[0] != STX || frame[FRAME_LEN - 1] != ETX {
        return Err(HardwareError::Frame(format!("bad framing ({} bytes)", frame.len())));
    }

    let payload = hex::decode(&frame[1..13])
        .map_err(|e| HardwareError::Frame(format!("invalid hex: {}", e)))?;
    let (id_bytes, checksum) = payload.split_at(ID_BYTES);

    let expected = id_bytes.iter().fold(0u8, |acc, &b| acc ^ b);
    if checksum[0] != expected {
        return Err(HardwareError::Frame(format!(
            "checksum {:02X} != {:02X}",
            checksum[0], expected
        )));
    }

    let value = id_bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    Ok(IdentityId::new(value.to_string()))
}

/// Accumulates serial bytes across reads; frames may arrive split.
#[derive(Debug, Default)]
struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drop bytes before the next STX
    fn synchronize(&mut self) {
        match self.buf.iter().position(|&b| b == STX) {
            Some(0) => {}
            Some(start) => {
                debug!(discarded = start, "token_sync_discarded_bytes");
                self.buf.drain(..start);
            }
            None if !self.buf.is_empty() => {
                debug!(discarded = self.buf.len(), "token_sync_no_start_byte");
                self.buf.clear();
            }
            None => {}
        }
    }

    fn next_frame(&mut self) -> Option<Result<IdentityId, HardwareError>> {
        self.synchronize();
        if self.buf.len() < FRAME_LEN {
            return None;
        }
        let frame: Vec<u8> = self.buf.drain(..FRAME_LEN).collect();
        Some(decode_frame(&frame))
    }
}

/// UART reader, opened lazily and reopened after a fault
pub struct SerialTokenReader {
    device: String,
    baud: u32,
    port: Option<SerialStream>,
    frames: FrameBuffer,
}

impl SerialTokenReader {
    pub fn new(device: impl Into<String>, baud: u32) -> Self {
        Self { device: device.into(), baud, port: None, frames: FrameBuffer::default() }
    }

    fn port(&mut self) -> Result<&mut SerialStream, HardwareError> {
        if self.port.is_none() {
            let port = tokio_serial::new(&self.device, self.baud).open_native_async()?;
            info!(device = %self.device, baud = self.baud, "token_reader_opened");
            self.port = Some(port);
        }
        self.port.as_mut().ok_or(HardwareError::Closed)
    }
}

#[async_trait]
impl TokenReader for SerialTokenReader {
    async fn next_token(&mut self) -> Result<IdentityId, HardwareError> {
        let mut chunk = [0u8; 64];
        loop {
            if let Some(frame) = self.frames.next_frame() {
                return frame;
            }

            let read = self.port()?.read(&mut chunk).await;
            match read {
                Ok(0) => {
                    self.port = None;
                    return Err(HardwareError::Closed);
                }
                Ok(n) => self.frames.push(&chunk[..n]),
                Err(e) => {
                    warn!(device = %self.device, error = %e, "token_reader_read_error");
                    self.port = None;
                    return Err(e.into());
                }
            }
        }
    }
}

/// Keyboard-wedge style reader: one id per line
pub struct LineTokenReader<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineTokenReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

impl LineTokenReader<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> TokenReader for LineTokenReader<R> {
    async fn next_token(&mut self) -> Result<IdentityId, HardwareError> {
        while let Some(line) = self.lines.next_line().await? {
            let id = IdentityId::new(line);
            if !id.is_empty() {
                return Ok(id);
            }
        }
        Err(HardwareError::Closed)
    }
}
