//! Audible feedback
//!
//! Producers enqueue tones without waiting; one actuator task plays them
//! strictly in order: on for the tone duration, off, then a fixed settle
//! before the next tone. A full queue drops the request.

use crate::io::hardware::Buzzer;
use crate::services::device::{shutdown_requested, sleep_or_shutdown};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// `count` tones of `duration` each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beep {
    pub count: u8,
    pub duration: Duration,
}

impl Beep {
    pub const fn new(count: u8, millis: u64) -> Self {
        Self { count, duration: Duration::from_millis(millis) }
    }

    /// Presence detected, capture armed
    pub const ACK: Beep = Beep::new(1, 200);
    /// Token read in enroll mode
    pub const SCAN: Beep = Beep::new(1, 100);
    pub const ENROLLED: Beep = Beep::new(2, 100);
    pub const REJECTED: Beep = Beep::new(1, 500);
    pub const CHECKIN: Beep = Beep::new(1, 500);
    pub const CHECKOUT: Beep = Beep::new(2, 200);
    pub const WARNING: Beep = Beep::new(2, 100);
    pub const UNKNOWN: Beep = Beep::new(3, 100);
    /// Coordinator error or unreachable
    pub const FAILURE: Beep = Beep::new(1, 1000);
    /// Device started
    pub const READY: Beep = Beep::new(2, 200);
}

#[derive(Debug, Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<Beep>,
}

impl FeedbackSender {
    /// Enqueue without waiting. Returns false if the request was dropped.
    pub fn beep(&self, beep: Beep) -> bool {
        match self.tx.try_send(beep) {
            Ok(()) => true,
            Err(TrySendError::Full(beep)) => {
                warn!(
                    count = beep.count,
                    duration_ms = beep.duration.as_millis() as u64,
                    "feedback_queue_full"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("feedback_actuator_gone");
                false
            }
        }
    }
}

/// Bounded feedback queue
pub fn feedback_channel(capacity: usize) -> (FeedbackSender, mpsc::Receiver<Beep>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FeedbackSender { tx }, rx)
}

pub struct FeedbackActuator {
    buzzer: Box<dyn Buzzer>,
    rx: mpsc::Receiver<Beep>,
    settle: Duration,
}

impl FeedbackActuator {
    pub fn new(buzzer: Box<dyn Buzzer>, rx: mpsc::Receiver<Beep>, settle: Duration) -> Self {
        Self { buzzer, rx, settle }
    }

    fn drive(&mut self, on: bool) {
        if let Err(e) = self.buzzer.set(on) {
            error!(on, error = %e, "buzzer_error");
        }
    }

    /// Play one request. Returns true if shutdown interrupted it.
    async fn play(&mut self, beep: Beep, shutdown: &mut watch::Receiver<bool>) -> bool {
        for _ in 0..beep.count {
            self.drive(true);
            let stop = sleep_or_shutdown(shutdown, beep.duration).await;
            self.drive(false);
            if stop || sleep_or_shutdown(shutdown, self.settle).await {
                return true;
            }
        }
        false
    }

    /// Drain the queue until shutdown or until every sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(settle_ms = self.settle.as_millis() as u64, "feedback_actuator_started");
        loop {
            let beep = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                beep = self.rx.recv() => beep,
            };
            let Some(beep) = beep else { break };
            if self.play(beep, &mut shutdown).await {
                break;
            }
        }
        self.drive(false);
        info!("feedback_actuator_shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::device::testing::FakeBuzzer;

    #[test]
    fn test_full_queue_drops() {
        let (sender, mut rx) = feedback_channel(2);
        assert!(sender.beep(Beep::ACK));
        assert!(sender.beep(Beep::SCAN));
        assert!(!sender.beep(Beep::FAILURE));

        assert_eq!(rx.try_recv().unwrap(), Beep::ACK);
        assert_eq!(rx.try_recv().unwrap(), Beep::SCAN);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tones_are_serialized() {
        let buzzer = FakeBuzzer::default();
        let (sender, rx) = feedback_channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        sender.beep(Beep::CHECKOUT);
        sender.beep(Beep::UNKNOWN);
        drop(sender);

        let actuator =
            FeedbackActuator::new(Box::new(buzzer.clone()), rx, Duration::from_millis(100));
        actuator.run(shutdown_rx).await;

        let events = buzzer.events();
        // 5 tones, each on then off, plus the final off at exit
        assert_eq!(events.len(), 11);
        for pair in events[..10].chunks(2) {
            assert!(pair[0].0);
            assert!(!pair[1].0);
        }
        // First tone of CHECKOUT lasts 200 ms, UNKNOWN tones 100 ms
        assert_eq!(events[1].1 - events[0].1, Duration::from_millis(200));
        assert_eq!(events[5].1 - events[4].1, Duration::from_millis(100));
        // Settle gap between tones
        assert_eq!(events[2].1 - events[1].1, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_switches_off() {
        let buzzer = FakeBuzzer::default();
        let (sender, rx) = feedback_channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        sender.beep(Beep::FAILURE);
        let actuator =
            FeedbackActuator::new(Box::new(buzzer.clone()), rx, Duration::from_millis(100));
        let handle = tokio::spawn(actuator.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let events = buzzer.events();
        assert!(events.first().unwrap().0);
        assert!(!events.last().unwrap().0);
    }
}
