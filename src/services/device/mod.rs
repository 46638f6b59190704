//! Device-side presence engine
//!
//! Independent worker loops share one `DeviceState`:
//! - `sampler` - distance, token and clock polling
//! - `feedback` - serialized buzzer tones fed from a bounded queue
//! - `mode_sync` - mirrors the coordinator mode
//! - `decision` - presence edges, scan forwarding and reply feedback

pub mod decision;
pub mod feedback;
pub mod mode_sync;
pub mod sampler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use decision::{DecisionConfig, PresenceDecisionLoop, Tick};
pub use feedback::{feedback_channel, Beep, FeedbackActuator, FeedbackSender};
pub use mode_sync::ModeSync;
pub use sampler::{ClockSampler, DistanceSampler, IdentitySampler};
pub use state::{DeviceState, Observation, TokenSlot};

use std::time::Duration;
use tokio::sync::watch;

/// Resolves once shutdown has been requested or the sender is gone
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `duration`; returns true if shutdown cut it short
pub async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown_requested(shutdown) => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
