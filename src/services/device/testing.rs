//! Test doubles for the device loops

use crate::domain::wire::{ScanReply, ScanRequest};
use crate::domain::{IdentityId, Mode, ScanStatus, Timestamp};
use crate::io::coordinator_client::{ClientError, CoordinatorApi};
use crate::io::hardware::{Buzzer, HardwareClock, HardwareError, RangeFinder, TokenReader};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Default)]
pub struct FakeCoordinator {
    mode: Mutex<Mode>,
    offline: Mutex<bool>,
    replies: Mutex<VecDeque<ScanReply>>,
    requests: Mutex<Vec<ScanRequest>>,
}

impl FakeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock() = mode;
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    pub fn push_reply(&self, reply: ScanReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn requests(&self) -> Vec<ScanRequest> {
        self.requests.lock().clone()
    }

    fn unavailable() -> ClientError {
        ClientError::Status { status: 503, body: "unavailable".to_string() }
    }
}

#[async_trait]
impl CoordinatorApi for FakeCoordinator {
    async fn fetch_mode(&self) -> Result<Mode, ClientError> {
        if *self.offline.lock() {
            return Err(Self::unavailable());
        }
        Ok(*self.mode.lock())
    }

    async fn scan(&self, req: &ScanRequest) -> Result<ScanReply, ClientError> {
        if *self.offline.lock() {
            return Err(Self::unavailable());
        }
        self.requests.lock().push(req.clone());
        Ok(self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScanReply::new(ScanStatus::Checkin, "Welcome!")))
    }
}

/// Records every on/off transition with the (tokio) time it happened
#[derive(Clone, Default)]
pub struct FakeBuzzer {
    events: Arc<Mutex<Vec<(bool, Instant)>>>,
}

impl FakeBuzzer {
    pub fn events(&self) -> Vec<(bool, Instant)> {
        self.events.lock().clone()
    }
}

impl Buzzer for FakeBuzzer {
    fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        self.events.lock().push((on, Instant::now()));
        Ok(())
    }
}

/// Replays readings in order, then reports the device as closed
pub struct ScriptedRangeFinder {
    readings: VecDeque<Result<f64, HardwareError>>,
}

impl ScriptedRangeFinder {
    pub fn new(readings: Vec<Result<f64, HardwareError>>) -> Self {
        Self { readings: readings.into() }
    }
}

#[async_trait]
impl RangeFinder for ScriptedRangeFinder {
    async fn measure(&mut self) -> Result<f64, HardwareError> {
        self.readings.pop_front().unwrap_or(Err(HardwareError::Closed))
    }
}

/// Token reader fed from a channel held by the test
pub struct ScriptedTokenReader {
    rx: mpsc::UnboundedReceiver<IdentityId>,
}

impl ScriptedTokenReader {
    pub fn new() -> (Self, mpsc::UnboundedSender<IdentityId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, tx)
    }
}

#[async_trait]
impl TokenReader for ScriptedTokenReader {
    async fn next_token(&mut self) -> Result<IdentityId, HardwareError> {
        self.rx.recv().await.ok_or(HardwareError::Closed)
    }
}

pub struct FailingClock;

impl HardwareClock for FailingClock {
    fn now(&mut self) -> Result<Timestamp, HardwareError> {
        Err(HardwareError::Frame("rtc not ticking".to_string()))
    }
}
