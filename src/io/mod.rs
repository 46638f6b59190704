//! IO modules - external system interfaces
//!
//! - `http_api` - Coordinator HTTP/JSON API (hyper)
//! - `coordinator_client` - Device/operator HTTP client (reqwest)
//! - `prometheus` - Prometheus text rendering for `/metrics`
//! - `hardware` - Driver traits the device loops depend on
//! - `token_reader` - UART 125 kHz and line-based token readers
//! - `range_finder` - UART ultrasonic and fixed range finders
//! - `rtc` - sysfs RTC and host clock
//! - `buzzer` - sysfs GPIO and log-only buzzers

pub mod buzzer;
pub mod coordinator_client;
pub mod hardware;
pub mod http_api;
pub mod prometheus;
pub mod range_finder;
pub mod rtc;
pub mod token_reader;

// Re-export commonly used types
pub use coordinator_client::{ClientError, CoordinatorApi, HttpCoordinatorClient};
pub use hardware::{Buzzer, HardwareClock, HardwareError, RangeFinder, TokenReader};
pub use http_api::{serve, start_api_server};
