//! Presence device - reader station next to the door
//!
//! Samples the range finder, token reader and clock, mirrors the coordinator
//! mode, and forwards scans when someone stands in front of the reader.

use anyhow::Context;
use clap::Parser;
use presence_gateway::infra::config::{BuzzerKind, ClockKind, RangeFinderKind, TokenReaderKind};
use presence_gateway::infra::logging::init_tracing;
use presence_gateway::infra::Config;
use presence_gateway::io::buzzer::{LogBuzzer, SysfsGpioBuzzer};
use presence_gateway::io::range_finder::{FixedRangeFinder, SerialRangeFinder};
use presence_gateway::io::rtc::{SysfsRtc, SystemClock};
use presence_gateway::io::token_reader::{LineTokenReader, SerialTokenReader};
use presence_gateway::io::{Buzzer, HardwareClock, HttpCoordinatorClient, RangeFinder, TokenReader};
use presence_gateway::services::device::{
    feedback_channel, Beep, ClockSampler, DecisionConfig, DeviceState, DistanceSampler,
    FeedbackActuator, IdentitySampler, ModeSync, PresenceDecisionLoop, TokenSlot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Presence device - sensor fusion and scan forwarding
#[derive(Parser, Debug)]
#[command(name = "presence-device", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/presence.toml")]
    config: String,
}

fn token_reader(config: &Config) -> Box<dyn TokenReader> {
    match config.token_reader() {
        TokenReaderKind::Serial => {
            Box::new(SerialTokenReader::new(config.token_device(), config.token_baud()))
        }
        TokenReaderKind::Stdin => Box::new(LineTokenReader::stdin()),
    }
}

fn range_finder(config: &Config) -> Box<dyn RangeFinder> {
    match config.range_finder() {
        RangeFinderKind::Serial => {
            Box::new(SerialRangeFinder::new(config.range_device(), config.range_baud()))
        }
        RangeFinderKind::Fixed => Box::new(FixedRangeFinder::new(config.fixed_distance_cm())),
    }
}

fn clock(config: &Config) -> Box<dyn HardwareClock> {
    match config.clock() {
        ClockKind::Rtc => Box::new(SysfsRtc::new(config.rtc_path())),
        ClockKind::System => Box::new(SystemClock),
    }
}

fn buzzer(config: &Config) -> Box<dyn Buzzer> {
    match config.buzzer() {
        BuzzerKind::Gpio => Box::new(SysfsGpioBuzzer::new(config.gpio_path())),
        BuzzerKind::Log => Box::new(LogBuzzer::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    info!(git_hash = env!("GIT_HASH"), "presence-device starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        coordinator_url = %config.coordinator_url(),
        token_reader = ?config.token_reader(),
        range_finder = ?config.range_finder(),
        clock = ?config.clock(),
        buzzer = ?config.buzzer(),
        presence_threshold_cm = %config.presence_threshold_cm(),
        "config_loaded"
    );

    let client = Arc::new(
        HttpCoordinatorClient::from_config(&config).context("Failed to build HTTP client")?,
    );
    let state = Arc::new(DeviceState::new());
    let slot = Arc::new(TokenSlot::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Feedback actuator
    let (feedback, feedback_rx) = feedback_channel(config.feedback_queue_capacity());
    let actuator = FeedbackActuator::new(
        buzzer(&config),
        feedback_rx,
        Duration::from_millis(config.feedback_settle_ms()),
    );
    let actuator_handle = tokio::spawn(actuator.run(shutdown_rx.clone()));

    // Sensor samplers
    let distance = DistanceSampler::new(range_finder(&config), state.clone(), &config);
    tokio::spawn(distance.run(shutdown_rx.clone()));

    let identity =
        IdentitySampler::new(token_reader(&config), state.clone(), slot.clone(), &config);
    tokio::spawn(identity.run(shutdown_rx.clone()));

    let clock = ClockSampler::new(clock(&config), state.clone());
    tokio::spawn(clock.run(shutdown_rx.clone()));

    // Mode mirror
    let mode_sync = ModeSync::new(
        client.clone(),
        state.clone(),
        Duration::from_millis(config.mode_poll_interval_ms()),
    );
    tokio::spawn(mode_sync.run(shutdown_rx.clone()));

    info!(coordinator_url = %client.base_url(), "device_ready");
    feedback.beep(Beep::READY);

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let decision = PresenceDecisionLoop::new(
        client,
        state,
        slot,
        feedback,
        DecisionConfig::from_config(&config),
    );
    decision.run(shutdown_rx).await;

    // Buzzer is switched off by the actuator on its way out
    let _ = actuator_handle.await;
    info!("presence-device shutdown complete");
    Ok(())
}
