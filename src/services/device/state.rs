//! Shared device state
//!
//! Every worker loop writes its latest reading here and the decision loop
//! reads one consistent snapshot per tick. A single mutex guards all scalar
//! fields; no lock is ever held across an await.

use crate::domain::{IdentityId, Mode, Timestamp};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Distance reported before the first measurement; far enough to mean "nobody"
pub const NO_READING_CM: f64 = 999.0;

/// Consistent view of the fused sensor state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub distance_cm: f64,
    pub now: Timestamp,
    pub mode: Mode,
    pub capture_enabled: bool,
}

#[derive(Debug)]
struct Fields {
    distance_cm: f64,
    now: Timestamp,
    mode: Mode,
    capture_enabled: bool,
}

#[derive(Debug)]
pub struct DeviceState {
    fields: Mutex<Fields>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            fields: Mutex::new(Fields {
                distance_cm: NO_READING_CM,
                now: Timestamp::now_local(),
                mode: Mode::Idle,
                capture_enabled: false,
            }),
        }
    }

    pub fn snapshot(&self) -> Observation {
        let f = self.fields.lock();
        Observation {
            distance_cm: f.distance_cm,
            now: f.now,
            mode: f.mode,
            capture_enabled: f.capture_enabled,
        }
    }

    pub fn publish_distance(&self, distance_cm: f64) {
        self.fields.lock().distance_cm = distance_cm;
    }

    pub fn publish_time(&self, now: Timestamp) {
        self.fields.lock().now = now;
    }

    /// Store a new mode. Returns the previous one if it changed.
    pub fn set_mode(&self, mode: Mode) -> Option<Mode> {
        let mut f = self.fields.lock();
        if f.mode == mode {
            return None;
        }
        Some(std::mem::replace(&mut f.mode, mode))
    }

    pub fn capture_enabled(&self) -> bool {
        self.fields.lock().capture_enabled
    }

    pub fn set_capture(&self, enabled: bool) {
        self.fields.lock().capture_enabled = enabled;
    }
}

/// Result of offering a freshly read token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Stored for the decision loop
    Published,
    /// Same token as the previous one, still within the cool-down
    Repeat,
}

#[derive(Debug, Default)]
struct SlotInner {
    pending: Option<IdentityId>,
    previous: Option<(IdentityId, Instant)>,
}

/// Capacity-1 hand-off of scanned ids with take semantics.
///
/// Also remembers the previous token so a tag left on the antenna is not
/// reported again until another tag is seen or the cool-down elapses.
#[derive(Debug, Default)]
pub struct TokenSlot {
    inner: Mutex<SlotInner>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, id: IdentityId, cooldown: Duration) -> Offer {
        self.offer_at(id, cooldown, Instant::now())
    }

    fn offer_at(&self, id: IdentityId, cooldown: Duration, now: Instant) -> Offer {
        let mut inner = self.inner.lock();
        if let Some((previous, seen)) = &inner.previous {
            if *previous == id && now.saturating_duration_since(*seen) < cooldown {
                return Offer::Repeat;
            }
        }
        inner.previous = Some((id.clone(), now));
        inner.pending = Some(id);
        Offer::Published
    }

    /// Read-and-clear the pending id
    pub fn take(&self) -> Option<IdentityId> {
        self.inner.lock().pending.take()
    }

    /// Forget both the pending id and the previous-token marker
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.pending = None;
        inner.previous = None;
    }
}
