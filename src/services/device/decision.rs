//! Presence decision loop
//!
//! One cooperative loop turns fused sensor state into scan events:
//!
//! ```text
//! distance < threshold   rising edge  -> ACK beep, capture on
//!                        while present -> take() pending id -> POST /scan -> feedback
//!                        falling edge -> capture off, token slot reset
//! mode idle              capture off, presence reset
//! ```
//!
//! Coordinator failures become an `error` reply ("Server Offline") and never
//! leave the loop.

use crate::domain::wire::{ScanReply, ScanRequest};
use crate::domain::{Mode, ScanStatus};
use crate::infra::config::Config;
use crate::io::coordinator_client::CoordinatorApi;
use crate::services::device::feedback::{Beep, FeedbackSender};
use crate::services::device::state::{DeviceState, TokenSlot};
use crate::services::device::{shutdown_requested, sleep_or_shutdown};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionConfig {
    pub presence_threshold_cm: f64,
    pub loop_interval: Duration,
    pub idle_interval: Duration,
    pub post_scan_pause: Duration,
}

impl DecisionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            presence_threshold_cm: config.presence_threshold_cm(),
            loop_interval: Duration::from_millis(config.loop_interval_ms()),
            idle_interval: Duration::from_millis(config.idle_interval_ms()),
            post_scan_pause: Duration::from_millis(config.post_scan_pause_ms()),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Idle,
    /// Waiting for presence or for a token
    Waiting,
    /// A scan was forwarded and answered with this status
    Scanned(ScanStatus),
}

/// Tone for an enroll-mode reply; other statuses are only logged
pub fn enroll_feedback(status: ScanStatus) -> Option<Beep> {
    match status {
        ScanStatus::Enrolled => Some(Beep::ENROLLED),
        ScanStatus::Error => Some(Beep::REJECTED),
        _ => None,
    }
}

pub fn attendance_feedback(status: ScanStatus) -> Beep {
    match status {
        ScanStatus::Checkin => Beep::CHECKIN,
        ScanStatus::Checkout => Beep::CHECKOUT,
        ScanStatus::Warning => Beep::WARNING,
        ScanStatus::Unknown => Beep::UNKNOWN,
        _ => Beep::FAILURE,
    }
}

pub struct PresenceDecisionLoop<C: ?Sized> {
    client: Arc<C>,
    state: Arc<DeviceState>,
    slot: Arc<TokenSlot>,
    feedback: FeedbackSender,
    config: DecisionConfig,
    present: bool,
}

impl<C: CoordinatorApi + ?Sized> PresenceDecisionLoop<C> {
    pub fn new(
        client: Arc<C>,
        state: Arc<DeviceState>,
        slot: Arc<TokenSlot>,
        feedback: FeedbackSender,
        config: DecisionConfig,
    ) -> Self {
        Self { client, state, slot, feedback, config, present: false }
    }

    fn reset_presence(&mut self) {
        self.present = false;
        self.state.set_capture(false);
        self.slot.reset();
    }

    /// Run one decision step against the current snapshot
    pub async fn tick(&mut self) -> Tick {
        let obs = self.state.snapshot();
        if obs.mode == Mode::Idle {
            if self.present || obs.capture_enabled {
                self.reset_presence();
            }
            return Tick::Idle;
        }

        let present = obs.distance_cm < self.config.presence_threshold_cm;
        if present && !self.present {
            info!(distance_cm = obs.distance_cm, mode = %obs.mode, "presence_detected");
            self.feedback.beep(Beep::ACK);
            self.state.set_capture(true);
        } else if !present && self.present {
            info!(distance_cm = obs.distance_cm, "presence_lost");
            self.reset_presence();
        }
        self.present = present;

        if !present {
            return Tick::Waiting;
        }
        let Some(id) = self.slot.take() else {
            return Tick::Waiting;
        };

        if obs.mode == Mode::Enroll {
            self.feedback.beep(Beep::SCAN);
        }

        let req = ScanRequest::new(id).at(obs.now).from_device(obs.mode);
        let reply = match self.client.scan(&req).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(identity_id = %req.identity_id, error = %e, "coordinator_unreachable");
                ScanReply::offline()
            }
        };
        info!(
            identity_id = %req.identity_id,
            mode = %obs.mode,
            status = reply.status.as_str(),
            message = %reply.message,
            "scan_reply"
        );

        match obs.mode {
            Mode::Enroll => {
                if let Some(beep) = enroll_feedback(reply.status) {
                    self.feedback.beep(beep);
                }
            }
            _ => {
                if reply.status == ScanStatus::Warning {
                    warn!(identity_id = %req.identity_id, "scan_too_soon");
                }
                self.feedback.beep(attendance_feedback(reply.status));
            }
        }

        Tick::Scanned(reply.status)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            threshold_cm = self.config.presence_threshold_cm,
            loop_interval_ms = self.config.loop_interval.as_millis() as u64,
            "decision_loop_started"
        );

        loop {
            let tick = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                tick = self.tick() => tick,
            };
            let pause = match tick {
                Tick::Idle => self.config.idle_interval,
                Tick::Waiting => self.config.loop_interval,
                Tick::Scanned(_) => self.config.post_scan_pause,
            };
            if sleep_or_shutdown(&mut shutdown, pause).await {
                break;
            }
        }

        self.state.set_capture(false);
        info!("decision_loop_shutdown");
    }
}
