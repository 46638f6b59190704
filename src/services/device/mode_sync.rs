//! Mirrors the coordinator's operating mode into device state

use crate::domain::Mode;
use crate::io::coordinator_client::CoordinatorApi;
use crate::services::device::shutdown_requested;
use crate::services::device::state::DeviceState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

pub struct ModeSync<C: ?Sized> {
    client: Arc<C>,
    state: Arc<DeviceState>,
    poll_interval: Duration,
}

impl<C: CoordinatorApi + ?Sized> ModeSync<C> {
    pub fn new(client: Arc<C>, state: Arc<DeviceState>, poll_interval: Duration) -> Self {
        Self { client, state, poll_interval: poll_interval.max(Duration::from_millis(1)) }
    }

    /// Fetch once; failures leave the current mode in place
    pub async fn poll_once(&self) -> Option<Mode> {
        match self.client.fetch_mode().await {
            Ok(mode) => {
                if let Some(previous) = self.state.set_mode(mode) {
                    info!(from = %previous, to = %mode, "mode_changed");
                }
                Some(mode)
            }
            Err(e) => {
                debug!(error = %e, "mode_poll_failed");
                None
            }
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "mode_sync_started");
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("mode_sync_shutdown");
                    return;
                }
                _ = ticker.tick() => {}
            }
            self.poll_once().await;
        }
    }
}
