//! Device hardware boundary
//!
//! The device loops only see these traits. Concrete drivers live next door
//! (`token_reader`, `range_finder`, `rtc`, `buzzer`); tests use fakes.

use crate::domain::{IdentityId, Timestamp};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("device closed")]
    Closed,
}

/// Source of token ids (RFID antenna, keyboard-wedge reader)
#[async_trait]
pub trait TokenReader: Send {
    /// Wait for the next token presentation.
    ///
    /// Must be cancel-safe: a call dropped mid-wait loses no buffered bytes.
    async fn next_token(&mut self) -> Result<IdentityId, HardwareError>;
}

/// Proximity sensor
#[async_trait]
pub trait RangeFinder: Send {
    /// One measurement in centimeters
    async fn measure(&mut self) -> Result<f64, HardwareError>;
}

pub trait HardwareClock: Send {
    fn now(&mut self) -> Result<Timestamp, HardwareError>;
}

/// On/off audible actuator
pub trait Buzzer: Send {
    fn set(&mut self, on: bool) -> Result<(), HardwareError>;
}
