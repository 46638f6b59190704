//! Configuration loading from TOML files
//!
//! Both the coordinator and the device read the same file layout; each
//! process only looks at the sections it needs. The file is selected with
//! `--config <path>` and missing sections fall back to defaults.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenReaderKind {
    /// UART 125 kHz reader (STX/ETX framed hex ids)
    Serial,
    /// Keyboard-wedge reader typing one id per line on stdin
    Stdin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeFinderKind {
    /// UART ultrasonic module
    Serial,
    /// No proximity sensor; a constant distance is reported
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    Rtc,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuzzerKind {
    Gpio,
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    /// Minimum session age before a toggle scan may check out
    #[serde(default = "default_min_checkout_minutes")]
    pub min_checkout_minutes: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            database: default_database(),
            min_checkout_minutes: default_min_checkout_minutes(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_database() -> String {
    "attendance.db".to_string()
}

fn default_min_checkout_minutes() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_mode_timeout_ms")]
    pub mode_timeout_ms: u64,
    #[serde(default = "default_mode_poll_interval_ms")]
    pub mode_poll_interval_ms: u64,
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Presence holds while distance is below this value
    #[serde(default = "default_presence_threshold_cm")]
    pub presence_threshold_cm: f64,
    /// Pause after a forwarded scan so one tap is not processed twice
    #[serde(default = "default_post_scan_pause_ms")]
    pub post_scan_pause_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            coordinator_url: default_coordinator_url(),
            request_timeout_ms: default_request_timeout_ms(),
            mode_timeout_ms: default_mode_timeout_ms(),
            mode_poll_interval_ms: default_mode_poll_interval_ms(),
            loop_interval_ms: default_loop_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
            presence_threshold_cm: default_presence_threshold_cm(),
            post_scan_pause_ms: default_post_scan_pause_ms(),
        }
    }
}

fn default_coordinator_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_mode_timeout_ms() -> u64 {
    2000
}

fn default_mode_poll_interval_ms() -> u64 {
    2000
}

fn default_loop_interval_ms() -> u64 {
    100
}

fn default_idle_interval_ms() -> u64 {
    500
}

fn default_presence_threshold_cm() -> f64 {
    50.0
}

fn default_post_scan_pause_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    #[serde(default = "default_token_reader")]
    pub token_reader: TokenReaderKind,
    #[serde(default = "default_token_device")]
    pub token_device: String,
    #[serde(default = "default_token_baud")]
    pub token_baud: u32,
    /// Same token is ignored for this long unless another token is seen
    #[serde(default = "default_repeat_cooldown_ms")]
    pub repeat_cooldown_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_range_finder")]
    pub range_finder: RangeFinderKind,
    #[serde(default = "default_range_device")]
    pub range_device: String,
    #[serde(default = "default_range_baud")]
    pub range_baud: u32,
    #[serde(default = "default_range_poll_interval_ms")]
    pub range_poll_interval_ms: u64,
    /// Distance reported by the fixed range finder
    #[serde(default)]
    pub fixed_distance_cm: f64,
    #[serde(default = "default_clock")]
    pub clock: ClockKind,
    #[serde(default = "default_rtc_path")]
    pub rtc_path: String,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            token_reader: default_token_reader(),
            token_device: default_token_device(),
            token_baud: default_token_baud(),
            repeat_cooldown_ms: default_repeat_cooldown_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            range_finder: default_range_finder(),
            range_device: default_range_device(),
            range_baud: default_range_baud(),
            range_poll_interval_ms: default_range_poll_interval_ms(),
            fixed_distance_cm: 0.0,
            clock: default_clock(),
            rtc_path: default_rtc_path(),
        }
    }
}

fn default_token_reader() -> TokenReaderKind {
    TokenReaderKind::Serial
}

fn default_token_device() -> String {
    "/dev/ttyAMA0".to_string()
}

fn default_token_baud() -> u32 {
    9600
}

fn default_repeat_cooldown_ms() -> u64 {
    10_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_range_finder() -> RangeFinderKind {
    RangeFinderKind::Serial
}

fn default_range_device() -> String {
    "/dev/ttyAMA2".to_string()
}

fn default_range_baud() -> u32 {
    9600
}

fn default_range_poll_interval_ms() -> u64 {
    100
}

fn default_clock() -> ClockKind {
    ClockKind::Rtc
}

fn default_rtc_path() -> String {
    "/sys/class/rtc/rtc0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_buzzer")]
    pub buzzer: BuzzerKind,
    /// sysfs value file of an exported GPIO line
    #[serde(default = "default_gpio_path")]
    pub gpio_path: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Rest between consecutive tones
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            buzzer: default_buzzer(),
            gpio_path: default_gpio_path(),
            queue_capacity: default_queue_capacity(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_buzzer() -> BuzzerKind {
    BuzzerKind::Gpio
}

fn default_gpio_path() -> String {
    "/sys/class/gpio/gpio5/value".to_string()
}

fn default_queue_capacity() -> usize {
    32
}

fn default_settle_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    database: String,
    min_checkout_minutes: u64,
    coordinator_url: String,
    request_timeout_ms: u64,
    mode_timeout_ms: u64,
    mode_poll_interval_ms: u64,
    loop_interval_ms: u64,
    idle_interval_ms: u64,
    presence_threshold_cm: f64,
    post_scan_pause_ms: u64,
    token_reader: TokenReaderKind,
    token_device: String,
    token_baud: u32,
    repeat_cooldown_ms: u64,
    settle_delay_ms: u64,
    range_finder: RangeFinderKind,
    range_device: String,
    range_baud: u32,
    range_poll_interval_ms: u64,
    fixed_distance_cm: f64,
    clock: ClockKind,
    rtc_path: String,
    buzzer: BuzzerKind,
    gpio_path: String,
    feedback_queue_capacity: usize,
    feedback_settle_ms: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { coordinator, device, sensors, feedback, metrics } = toml_config;
        Self {
            bind_address: coordinator.bind_address,
            port: coordinator.port,
            database: coordinator.database,
            min_checkout_minutes: coordinator.min_checkout_minutes,
            coordinator_url: device.coordinator_url.trim_end_matches('/').to_string(),
            request_timeout_ms: device.request_timeout_ms,
            mode_timeout_ms: device.mode_timeout_ms,
            mode_poll_interval_ms: device.mode_poll_interval_ms,
            loop_interval_ms: device.loop_interval_ms,
            idle_interval_ms: device.idle_interval_ms,
            presence_threshold_cm: device.presence_threshold_cm,
            post_scan_pause_ms: device.post_scan_pause_ms,
            token_reader: sensors.token_reader,
            token_device: sensors.token_device,
            token_baud: sensors.token_baud,
            repeat_cooldown_ms: sensors.repeat_cooldown_ms,
            settle_delay_ms: sensors.settle_delay_ms,
            range_finder: sensors.range_finder,
            range_device: sensors.range_device,
            range_baud: sensors.range_baud,
            range_poll_interval_ms: sensors.range_poll_interval_ms,
            fixed_distance_cm: sensors.fixed_distance_cm,
            clock: sensors.clock,
            rtc_path: sensors.rtc_path,
            buzzer: feedback.buzzer,
            gpio_path: feedback.gpio_path,
            feedback_queue_capacity: feedback.queue_capacity.max(1),
            feedback_settle_ms: feedback.settle_ms,
            metrics_interval_secs: metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Coordinator
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn min_checkout_minutes(&self) -> u64 {
        self.min_checkout_minutes
    }

    // Device
    pub fn coordinator_url(&self) -> &str {
        &self.coordinator_url
    }

    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    pub fn mode_timeout_ms(&self) -> u64 {
        self.mode_timeout_ms
    }

    pub fn mode_poll_interval_ms(&self) -> u64 {
        self.mode_poll_interval_ms
    }

    pub fn loop_interval_ms(&self) -> u64 {
        self.loop_interval_ms
    }

    pub fn idle_interval_ms(&self) -> u64 {
        self.idle_interval_ms
    }

    pub fn presence_threshold_cm(&self) -> f64 {
        self.presence_threshold_cm
    }

    pub fn post_scan_pause_ms(&self) -> u64 {
        self.post_scan_pause_ms
    }

    // Sensors
    pub fn token_reader(&self) -> TokenReaderKind {
        self.token_reader
    }

    pub fn token_device(&self) -> &str {
        &self.token_device
    }

    pub fn token_baud(&self) -> u32 {
        self.token_baud
    }

    pub fn repeat_cooldown_ms(&self) -> u64 {
        self.repeat_cooldown_ms
    }

    pub fn settle_delay_ms(&self) -> u64 {
        self.settle_delay_ms
    }

    pub fn range_finder(&self) -> RangeFinderKind {
        self.range_finder
    }

    pub fn range_device(&self) -> &str {
        &self.range_device
    }

    pub fn range_baud(&self) -> u32 {
        self.range_baud
    }

    pub fn range_poll_interval_ms(&self) -> u64 {
        self.range_poll_interval_ms
    }

    pub fn fixed_distance_cm(&self) -> f64 {
        self.fixed_distance_cm
    }

    pub fn clock(&self) -> ClockKind {
        self.clock
    }

    pub fn rtc_path(&self) -> &str {
        &self.rtc_path
    }

    // Feedback
    pub fn buzzer(&self) -> BuzzerKind {
        self.buzzer
    }

    pub fn gpio_path(&self) -> &str {
        &self.gpio_path
    }

    pub fn feedback_queue_capacity(&self) -> usize {
        self.feedback_queue_capacity
    }

    pub fn feedback_settle_ms(&self) -> u64 {
        self.feedback_settle_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the checkout threshold
    #[cfg(test)]
    pub fn with_min_checkout_minutes(mut self, minutes: u64) -> Self {
        self.min_checkout_minutes = minutes;
        self
    }

    /// Builder method for tests to shorten device pauses
    #[cfg(test)]
    pub fn with_post_scan_pause_ms(mut self, ms: u64) -> Self {
        self.post_scan_pause_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 5000);
        assert_eq!(config.database(), "attendance.db");
        assert_eq!(config.min_checkout_minutes(), 1);
        assert_eq!(config.presence_threshold_cm(), 50.0);
        assert_eq!(config.mode_poll_interval_ms(), 2000);
        assert_eq!(config.post_scan_pause_ms(), 1000);
        assert_eq!(config.token_reader(), TokenReaderKind::Serial);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[device]
coordinator_url = "http://10.0.0.2:5000/"
presence_threshold_cm = 35.5
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());

        assert_eq!(config.coordinator_url(), "http://10.0.0.2:5000");
        assert_eq!(config.presence_threshold_cm(), 35.5);
        assert_eq!(config.request_timeout_ms(), 5000);
        assert_eq!(config.port(), 5000);
        assert_eq!(config.buzzer(), BuzzerKind::Gpio);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let toml_config: TomlConfig =
            toml::from_str("[feedback]\nqueue_capacity = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.feedback_queue_capacity(), 1);
    }

    #[test]
    fn test_unknown_reader_kind_is_rejected() {
        let parsed = toml::from_str::<TomlConfig>("[sensors]\ntoken_reader = \"bluetooth\"\n");
        assert!(parsed.is_err());
    }
}
