//! Services - business logic and state management
//!
//! Coordinator side:
//! - `ledger` - SQLite session ledger with atomic check-and-write
//! - `coordinator` - Session state machine and scan classification
//! - `mode` - Process-wide operating mode
//! - `error` - Coordinator error taxonomy
//!
//! Device side:
//! - `device` - Sensor sampling, feedback, mode sync and the decision loop

pub mod coordinator;
pub mod device;
pub mod error;
pub mod ledger;
pub mod mode;

// Re-export commonly used types
pub use coordinator::{ScanOutcome, SessionCoordinator};
pub use error::{Conflict, CoordinatorError};
pub use ledger::Ledger;
pub use mode::ModeAuthority;
