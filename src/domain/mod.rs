//! Domain models - core business types and wire payloads
//!
//! This module contains the canonical data types used throughout the system:
//! - `IdentityId` / `Identity` - token holders known to the coordinator
//! - `Session` - one check-in/check-out interval
//! - `Timestamp` - second-resolution wall clock shared by device and coordinator
//! - `Mode` - coordinator-wide operating policy
//! - `wire` - JSON request/reply payloads of the HTTP API

pub mod types;
pub mod wire;

// Re-export commonly used types at module level
pub use types::{IdentityId, Mode, ScanAction, ScanStatus, Timestamp};
