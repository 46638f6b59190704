//! Sensor sampling loops
//!
//! Each loop owns one driver and publishes its latest reading into
//! `DeviceState`. Faults never stop a loop: the previous value stays in
//! place and the next tick tries again.

use crate::domain::Timestamp;
use crate::infra::config::Config;
use crate::io::hardware::{HardwareClock, RangeFinder, TokenReader};
use crate::services::device::state::{DeviceState, Offer, TokenSlot};
use crate::services::device::{shutdown_requested, sleep_or_shutdown};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout};
use tracing::{info, trace, warn};

/// Upper bound on a single range measurement
const MEASURE_TIMEOUT: Duration = Duration::from_millis(100);
/// How long one token wait lasts before capture is re-checked
const TOKEN_POLL: Duration = Duration::from_millis(250);
/// Back-off after a reader fault
const FAULT_BACKOFF: Duration = Duration::from_secs(1);
const CLOCK_INTERVAL: Duration = Duration::from_secs(1);

pub struct DistanceSampler {
    finder: Box<dyn RangeFinder>,
    state: Arc<DeviceState>,
    poll_interval: Duration,
}

impl DistanceSampler {
    pub fn new(finder: Box<dyn RangeFinder>, state: Arc<DeviceState>, config: &Config) -> Self {
        Self {
            finder,
            state,
            poll_interval: Duration::from_millis(config.range_poll_interval_ms().max(1)),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "distance_sampler_started");

        let mut ticker = interval(self.poll_interval);
        let mut faulted = false;

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("distance_sampler_shutdown");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match timeout(MEASURE_TIMEOUT, self.finder.measure()).await {
                Ok(Ok(distance_cm)) => {
                    if faulted {
                        info!(distance_cm, "range_finder_recovered");
                        faulted = false;
                    }
                    self.state.publish_distance(distance_cm);
                    trace!(distance_cm, "distance_sample");
                }
                Ok(Err(e)) => {
                    if !faulted {
                        warn!(error = %e, "range_finder_fault");
                        faulted = true;
                    }
                    if sleep_or_shutdown(&mut shutdown, FAULT_BACKOFF).await {
                        info!("distance_sampler_shutdown");
                        return;
                    }
                }
                Err(_) => trace!("distance_sample_timeout"),
            }
        }
    }
}

pub struct IdentitySampler {
    reader: Box<dyn TokenReader>,
    state: Arc<DeviceState>,
    slot: Arc<TokenSlot>,
    cooldown: Duration,
    settle: Duration,
}

impl IdentitySampler {
    pub fn new(
        reader: Box<dyn TokenReader>,
        state: Arc<DeviceState>,
        slot: Arc<TokenSlot>,
        config: &Config,
    ) -> Self {
        Self {
            reader,
            state,
            slot,
            cooldown: Duration::from_millis(config.repeat_cooldown_ms()),
            settle: Duration::from_millis(config.settle_delay_ms()),
        }
    }

    /// Read tokens until shutdown.
    ///
    /// The reader is drained even while capture is off so that tags held up
    /// before anyone stood in front of the device are never reported late.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            cooldown_ms = self.cooldown.as_millis() as u64,
            settle_ms = self.settle.as_millis() as u64,
            "identity_sampler_started"
        );

        loop {
            let read = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                read = timeout(TOKEN_POLL, self.reader.next_token()) => read,
            };

            let pause = match read {
                Err(_) => continue,
                Ok(Ok(id)) if !self.state.capture_enabled() => {
                    trace!(identity_id = %id, "token_ignored_capture_off");
                    continue;
                }
                Ok(Ok(id)) => match self.slot.offer(id.clone(), self.cooldown) {
                    Offer::Published => {
                        info!(identity_id = %id, "token_read");
                        self.settle
                    }
                    Offer::Repeat => {
                        trace!(identity_id = %id, "token_repeat_suppressed");
                        continue;
                    }
                },
                Ok(Err(e)) => {
                    warn!(error = %e, "token_reader_fault");
                    FAULT_BACKOFF
                }
            };

            if sleep_or_shutdown(&mut shutdown, pause).await {
                break;
            }
        }
        info!("identity_sampler_shutdown");
    }
}

pub struct ClockSampler {
    clock: Box<dyn HardwareClock>,
    state: Arc<DeviceState>,
}

impl ClockSampler {
    pub fn new(clock: Box<dyn HardwareClock>, state: Arc<DeviceState>) -> Self {
        Self { clock, state }
    }

    /// One reading; falls back to host time when the clock fails
    pub fn sample(&mut self) -> Timestamp {
        match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                warn!(error = %e, "hardware_clock_fault");
                Timestamp::now_local()
            }
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("clock_sampler_started");
        let mut ticker = interval(CLOCK_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("clock_sampler_shutdown");
                    return;
                }
                _ = ticker.tick() => {}
            }
            let now = self.sample();
            self.state.publish_time(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IdentityId;
    use crate::io::hardware::HardwareError;
    use crate::services::device::testing::{FailingClock, ScriptedRangeFinder, ScriptedTokenReader};

    fn config() -> Config {
        Config::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_fault_keeps_previous_value() {
        let state = Arc::new(DeviceState::new());
        let finder = ScriptedRangeFinder::new(vec![Ok(42.0), Err(HardwareError::Closed)]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sampler = DistanceSampler::new(Box::new(finder), state.clone(), &config());
        let handle = tokio::spawn(sampler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(state.snapshot().distance_cm, 42.0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_published_only_while_capturing() {
        let state = Arc::new(DeviceState::new());
        let slot = Arc::new(TokenSlot::new());
        let (reader, feed) = ScriptedTokenReader::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sampler =
            IdentitySampler::new(Box::new(reader), state.clone(), slot.clone(), &config());
        let handle = tokio::spawn(sampler.run(shutdown_rx));

        feed.send(IdentityId::new("1")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slot.take(), None);

        state.set_capture(true);
        feed.send(IdentityId::new("2")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slot.take(), Some(IdentityId::new("2")));

        // Same tag still on the antenna
        tokio::time::sleep(Duration::from_millis(1000)).await;
        feed.send(IdentityId::new("2")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slot.take(), None);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_clock_falls_back_to_host_time() {
        let state = Arc::new(DeviceState::new());
        let mut sampler = ClockSampler::new(Box::new(FailingClock), state);
        let before = Timestamp::now_local();
        assert!(sampler.sample() >= before);
    }
}
